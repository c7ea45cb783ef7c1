//! Chunked message writing.
//!
//! A logical message is split into frames of at most the configured frame
//! length. Each frame payload starts with a continuation flag; the first
//! frame of a message additionally carries the internal and application
//! protocol versions ahead of the flag.

use crate::error::ProtocolError;
use crate::frame::encode_frame;
use crate::{CHUNK_LAST, CHUNK_MORE};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes one logical message as a sequence of chunked frames.
///
/// The writer holds the sink exclusively until [`done`](Self::done), so the
/// frames of a message are never interleaved with other writes. An
/// intermediate chunk is only emitted once further data arrives, so a
/// message never ends in a payload-less frame.
pub struct ChunkedWriter<W> {
    io: W,
    buf: BytesMut,
    frame_length: usize,
    internal_version: u8,
    application_version: u8,
    first_chunk: bool,
    finished: bool,
}

impl<W: AsyncWrite + Unpin> ChunkedWriter<W> {
    pub fn new(
        io: W,
        frame_length: usize,
        internal_version: u8,
        application_version: u8,
    ) -> Self {
        Self::with_buffer(
            io,
            BytesMut::new(),
            frame_length,
            internal_version,
            application_version,
        )
    }

    /// Like [`new`](Self::new), but reuses a caller-provided buffer.
    pub fn with_buffer(
        io: W,
        mut buf: BytesMut,
        frame_length: usize,
        internal_version: u8,
        application_version: u8,
    ) -> Self {
        buf.clear();
        Self {
            io,
            buf,
            frame_length,
            internal_version,
            application_version,
            first_chunk: true,
            finished: false,
        }
    }

    /// Room for user data in the current chunk, after the chunk header.
    fn chunk_capacity(&self) -> usize {
        let header = if self.first_chunk { 3 } else { 1 };
        self.frame_length - header
    }

    pub async fn write_bytes(&mut self, mut src: &[u8]) -> Result<(), ProtocolError> {
        if self.finished {
            return Err(ProtocolError::MessageFinished);
        }
        while !src.is_empty() {
            if self.buf.len() == self.chunk_capacity() {
                self.flush_chunk(false).await?;
            }
            let room = self.chunk_capacity() - self.buf.len();
            let take = room.min(src.len());
            self.buf.put_slice(&src[..take]);
            src = &src[take..];
        }
        Ok(())
    }

    pub async fn write_u8(&mut self, v: u8) -> Result<(), ProtocolError> {
        self.write_bytes(&[v]).await
    }

    pub async fn write_i32(&mut self, v: i32) -> Result<(), ProtocolError> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    pub async fn write_u32(&mut self, v: u32) -> Result<(), ProtocolError> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    pub async fn write_i64(&mut self, v: i64) -> Result<(), ProtocolError> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    pub async fn write_u64(&mut self, v: u64) -> Result<(), ProtocolError> {
        self.write_bytes(&v.to_be_bytes()).await
    }

    /// Writes a length-prefixed UTF-8 string (4-byte length, then bytes).
    pub async fn write_string(&mut self, s: &str) -> Result<(), ProtocolError> {
        self.write_u32(s.len() as u32).await?;
        self.write_bytes(s.as_bytes()).await
    }

    /// Emits the final chunk and flushes the sink. Must be called exactly
    /// once; empty messages are rejected.
    pub async fn done(&mut self) -> Result<(), ProtocolError> {
        if self.finished {
            return Err(ProtocolError::MessageFinished);
        }
        if self.first_chunk && self.buf.is_empty() {
            return Err(ProtocolError::EmptyMessage);
        }
        self.flush_chunk(true).await?;
        self.finished = true;
        self.io.flush().await?;
        Ok(())
    }

    async fn flush_chunk(&mut self, last: bool) -> Result<(), ProtocolError> {
        let header_len = if self.first_chunk { 3 } else { 1 };
        let mut payload = BytesMut::with_capacity(header_len + self.buf.len());
        if self.first_chunk {
            payload.put_u8(self.internal_version);
            payload.put_u8(self.application_version);
        }
        payload.put_u8(if last { CHUNK_LAST } else { CHUNK_MORE });
        payload.put_slice(&self.buf);
        let frame = encode_frame(&payload, self.frame_length)?;
        self.io.write_all(&frame).await?;
        self.buf.clear();
        self.first_chunk = false;
        Ok(())
    }

    /// Consumes the writer, returning the sink and the internal buffer for
    /// reuse.
    pub fn into_parts(self) -> (W, BytesMut) {
        (self.io, self.buf)
    }
}

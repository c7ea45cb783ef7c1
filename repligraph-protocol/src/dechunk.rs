//! Chunked message reassembly.
//!
//! Consumes frames off a byte stream and exposes the reassembled logical
//! message as a blocking byte source. The first frame of a message carries
//! the version handshake, which is verified before any payload byte is
//! exposed. Reads pull further frames on demand, each wait bounded by the
//! configured read timeout.

use crate::error::ProtocolError;
use crate::frame::decode_frame;
use crate::{CHUNK_LAST, CHUNK_MORE};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// Reassembles one logical message from successive chunked frames.
///
/// Consumers may set a single mark and rewind to it within the reassembly
/// buffer; the buffer is only compacted while no mark is outstanding.
pub struct ChunkedReader<R> {
    io: R,
    /// Raw bytes read off the stream, not yet framed.
    inbound: BytesMut,
    /// Reassembled message payload.
    buf: BytesMut,
    pos: usize,
    mark: Option<usize>,
    frame_length: usize,
    read_timeout: Duration,
    internal_version: u8,
    application_version: u8,
    first_frame: bool,
    last_chunk: bool,
    received_any: bool,
}

impl<R: AsyncRead + Unpin> ChunkedReader<R> {
    pub fn new(
        io: R,
        frame_length: usize,
        read_timeout: Duration,
        internal_version: u8,
        application_version: u8,
    ) -> Self {
        Self {
            io,
            inbound: BytesMut::with_capacity(8 * 1024),
            buf: BytesMut::new(),
            pos: 0,
            mark: None,
            frame_length,
            read_timeout,
            internal_version,
            application_version,
            first_frame: true,
            last_chunk: false,
            received_any: false,
        }
    }

    fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the last chunk has been received and fully consumed.
    pub fn fully_consumed(&self) -> bool {
        self.last_chunk && self.available() == 0
    }

    /// Remembers the current read position. A later [`reset`](Self::reset)
    /// rewinds to it. Setting a new mark discards the previous one.
    pub fn mark(&mut self) {
        self.mark = Some(self.pos);
    }

    /// Rewinds to the marked position and clears the mark.
    pub fn reset(&mut self) -> Result<(), ProtocolError> {
        match self.mark.take() {
            Some(m) => {
                self.pos = m;
                Ok(())
            }
            None => Err(ProtocolError::Invariant("reset without mark")),
        }
    }

    pub async fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1).await?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub async fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_be_bytes(self.read_array().await?))
    }

    pub async fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.read_array().await?))
    }

    pub async fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_be_bytes(self.read_array().await?))
    }

    pub async fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_be_bytes(self.read_array().await?))
    }

    /// Reads a length-prefixed UTF-8 string (4-byte length, then bytes).
    pub async fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_u32().await? as usize;
        self.ensure(len).await?;
        let s = std::str::from_utf8(&self.buf[self.pos..self.pos + len])
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .to_string();
        self.pos += len;
        Ok(s)
    }

    /// Fills `dst` exactly.
    pub async fn read_exact(&mut self, dst: &mut [u8]) -> Result<(), ProtocolError> {
        self.ensure(dst.len()).await?;
        dst.copy_from_slice(&self.buf[self.pos..self.pos + dst.len()]);
        self.pos += dst.len();
        Ok(())
    }

    /// Skips `n` bytes of the message.
    pub async fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.ensure(n).await?;
        self.pos += n;
        Ok(())
    }

    async fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        self.ensure(N).await?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Blocks until `n` bytes are readable or the message cannot provide
    /// them.
    async fn ensure(&mut self, n: usize) -> Result<(), ProtocolError> {
        if self.mark.is_none() && self.pos > 0 && self.available() == 0 {
            self.buf.clear();
            self.pos = 0;
        }
        while self.available() < n {
            if self.last_chunk {
                return Err(if self.available() == 0 {
                    ProtocolError::EndOfMessage
                } else {
                    ProtocolError::InsufficientData {
                        needed: n,
                        available: self.available(),
                    }
                });
            }
            self.fetch_chunk().await?;
        }
        Ok(())
    }

    /// Waits for the next frame, verifies its chunk header, and appends its
    /// payload to the reassembly buffer.
    async fn fetch_chunk(&mut self) -> Result<(), ProtocolError> {
        let mut payload = timeout(self.read_timeout, self.next_frame())
            .await
            .map_err(|_| ProtocolError::ReadTimeout)??;
        let header_len = if self.first_frame { 3 } else { 1 };
        if payload.len() < header_len {
            return Err(ProtocolError::EmptyFrame);
        }
        if self.first_frame {
            let internal = payload[0];
            if internal != self.internal_version {
                return Err(ProtocolError::InternalVersionMismatch {
                    expected: self.internal_version,
                    actual: internal,
                });
            }
            let application = payload[1];
            if application != self.application_version {
                return Err(ProtocolError::ApplicationVersionMismatch {
                    expected: self.application_version,
                    actual: application,
                });
            }
            self.first_frame = false;
        }
        let flag = payload[header_len - 1];
        match flag {
            CHUNK_MORE => {}
            CHUNK_LAST => self.last_chunk = true,
            other => return Err(ProtocolError::InvalidChunkFlag(other)),
        }
        payload = payload.slice(header_len..);
        if !payload.is_empty() {
            self.received_any = true;
        }
        self.buf.extend_from_slice(&payload);
        if self.last_chunk && !self.received_any {
            return Err(ProtocolError::EmptyMessage);
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Bytes, ProtocolError> {
        loop {
            if let Some(payload) = decode_frame(&mut self.inbound, self.frame_length)? {
                return Ok(payload);
            }
            let n = self.io.read_buf(&mut self.inbound).await?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
        }
    }

    /// Consumes and discards everything up to and including the last chunk,
    /// leaving the stream positioned at the next message boundary.
    pub async fn drain(&mut self) -> Result<(), ProtocolError> {
        self.mark = None;
        while !self.last_chunk {
            self.fetch_chunk().await?;
        }
        self.buf.clear();
        self.pos = 0;
        Ok(())
    }

    /// Consumes the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.io
    }
}

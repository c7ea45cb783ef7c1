//! Block-log encoding for transaction payloads.
//!
//! A payload is a sequence of blocks, each one size byte followed by data.
//! Size 0 marks a full intermediate block of [`DATA_SIZE`] bytes; size
//! 1..=255 marks the terminal block carrying that many valid bytes. Exactly
//! one terminal block ends each payload, so a payload whose length is an
//! exact multiple of [`DATA_SIZE`] ends in a terminal block of size
//! [`DATA_SIZE`].

use crate::chunk::ChunkedWriter;
use crate::dechunk::ChunkedReader;
use crate::error::ProtocolError;
use tokio::io::{AsyncRead, AsyncWrite};

/// Number of data bytes in a full block.
pub const DATA_SIZE: usize = 255;

/// Reads one block-log payload out of a dechunked message.
///
/// Reads are satisfied across block boundaries. Once the terminal block is
/// exhausted the reader returns 0; the underlying message is left
/// positioned right after the payload, so the next record can follow.
pub struct BlockLogReader<'a, R> {
    input: &'a mut ChunkedReader<R>,
    remaining: usize,
    terminal: bool,
    started: bool,
}

impl<'a, R: AsyncRead + Unpin> BlockLogReader<'a, R> {
    pub fn new(input: &'a mut ChunkedReader<R>) -> Self {
        Self {
            input,
            remaining: 0,
            terminal: false,
            started: false,
        }
    }

    /// Reads up to `dst.len()` bytes, returning 0 at the end of the
    /// payload.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut filled = 0;
        while filled < dst.len() {
            if self.remaining == 0 {
                if self.started && self.terminal {
                    break;
                }
                self.next_block().await?;
            }
            let take = self.remaining.min(dst.len() - filled);
            self.input.read_exact(&mut dst[filled..filled + take]).await?;
            self.remaining -= take;
            filled += take;
        }
        Ok(filled)
    }

    /// Appends the remainder of the payload to `out`, returning the number
    /// of bytes read.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, ProtocolError> {
        let mut chunk = [0u8; DATA_SIZE];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }

    async fn next_block(&mut self) -> Result<(), ProtocolError> {
        let size = self.input.read_u8().await? as usize;
        if size == 0 {
            self.remaining = DATA_SIZE;
        } else {
            self.remaining = size;
            self.terminal = true;
        }
        self.started = true;
        Ok(())
    }
}

/// Writes one block-log payload into a chunked message.
///
/// The last full block is held back until [`finish`](Self::finish), so the
/// payload always ends in exactly one terminal block.
pub struct BlockLogWriter<'a, W> {
    out: &'a mut ChunkedWriter<W>,
    buf: [u8; DATA_SIZE],
    len: usize,
}

impl<'a, W: AsyncWrite + Unpin> BlockLogWriter<'a, W> {
    pub fn new(out: &'a mut ChunkedWriter<W>) -> Self {
        Self {
            out,
            buf: [0u8; DATA_SIZE],
            len: 0,
        }
    }

    pub async fn write(&mut self, mut src: &[u8]) -> Result<(), ProtocolError> {
        while !src.is_empty() {
            if self.len == DATA_SIZE {
                // more data is coming, so this block is not terminal
                self.out.write_u8(0).await?;
                self.out.write_bytes(&self.buf).await?;
                self.len = 0;
            }
            let take = (DATA_SIZE - self.len).min(src.len());
            self.buf[self.len..self.len + take].copy_from_slice(&src[..take]);
            self.len += take;
            src = &src[take..];
        }
        Ok(())
    }

    /// Emits the terminal block. Empty payloads cannot be encoded.
    pub async fn finish(self) -> Result<(), ProtocolError> {
        if self.len == 0 {
            return Err(ProtocolError::EmptyBlockPayload);
        }
        self.out.write_u8(self.len as u8).await?;
        self.out.write_bytes(&self.buf[..self.len]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FRAME_LENGTH: usize = 4096;
    const INTERNAL: u8 = 2;
    const APPLICATION: u8 = 9;

    async fn encode_payloads(payloads: &[&[u8]]) -> Vec<u8> {
        let mut writer = ChunkedWriter::new(Vec::new(), FRAME_LENGTH, INTERNAL, APPLICATION);
        for payload in payloads {
            let mut blocks = BlockLogWriter::new(&mut writer);
            blocks.write(payload).await.unwrap();
            blocks.finish().await.unwrap();
        }
        writer.done().await.unwrap();
        writer.into_parts().0
    }

    fn reader(wire: &[u8]) -> ChunkedReader<&[u8]> {
        ChunkedReader::new(
            wire,
            FRAME_LENGTH,
            Duration::from_secs(5),
            INTERNAL,
            APPLICATION,
        )
    }

    /// Raw block bytes as they appear inside the message, for boundary
    /// checks.
    async fn raw_blocks(payload: &[u8]) -> Vec<u8> {
        let wire = encode_payloads(&[payload]).await;
        let mut input = reader(&wire);
        let mut raw = Vec::new();
        loop {
            match input.read_u8().await {
                Ok(b) => raw.push(b),
                Err(ProtocolError::EndOfMessage) => return raw,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[tokio::test]
    async fn test_short_payload_single_terminal_block() {
        let raw = raw_blocks(&[0xAA; 10]).await;
        assert_eq!(raw[0], 10);
        assert_eq!(raw.len(), 11);
    }

    #[tokio::test]
    async fn test_exact_data_size_payload() {
        // L == DATA_SIZE: one terminal block of size DATA_SIZE, no
        // intermediate block
        let raw = raw_blocks(&[1u8; DATA_SIZE]).await;
        assert_eq!(raw[0], DATA_SIZE as u8);
        assert_eq!(raw.len(), 1 + DATA_SIZE);
    }

    #[tokio::test]
    async fn test_multiple_of_data_size_payload() {
        // L == 2 * DATA_SIZE: one full block then a terminal block of size
        // DATA_SIZE
        let raw = raw_blocks(&[1u8; 2 * DATA_SIZE]).await;
        assert_eq!(raw[0], 0);
        assert_eq!(raw[1 + DATA_SIZE], DATA_SIZE as u8);
        assert_eq!(raw.len(), 2 * (1 + DATA_SIZE));
    }

    #[tokio::test]
    async fn test_full_blocks_plus_remainder() {
        // L == 2 * DATA_SIZE + 10: two full blocks then a 10-byte terminal
        let raw = raw_blocks(&[1u8; 2 * DATA_SIZE + 10]).await;
        assert_eq!(raw[0], 0);
        assert_eq!(raw[1 + DATA_SIZE], 0);
        assert_eq!(raw[2 * (1 + DATA_SIZE)], 10);
        assert_eq!(raw.len(), 2 * (1 + DATA_SIZE) + 11);
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let payload: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();
        let wire = encode_payloads(&[&payload]).await;
        let mut input = reader(&wire);

        let mut blocks = BlockLogReader::new(&mut input);
        let mut got = Vec::new();
        blocks.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, payload);
        assert!(input.fully_consumed());
    }

    #[tokio::test]
    async fn test_read_returns_zero_after_end() {
        let wire = encode_payloads(&[b"abc"]).await;
        let mut input = reader(&wire);

        let mut blocks = BlockLogReader::new(&mut input);
        let mut buf = [0u8; 8];
        assert_eq!(blocks.read(&mut buf).await.unwrap(), 3);
        assert_eq!(blocks.read(&mut buf).await.unwrap(), 0);
        assert_eq!(blocks.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pause_between_payloads() {
        // two payloads back to back in the same message; the reader for the
        // first must stop exactly at its terminal block
        let first = vec![7u8; DATA_SIZE + 3];
        let second = b"tail".to_vec();
        let wire = encode_payloads(&[&first, &second]).await;
        let mut input = reader(&wire);

        let mut got = Vec::new();
        BlockLogReader::new(&mut input)
            .read_to_end(&mut got)
            .await
            .unwrap();
        assert_eq!(got, first);

        let mut got = Vec::new();
        BlockLogReader::new(&mut input)
            .read_to_end(&mut got)
            .await
            .unwrap();
        assert_eq!(got, second);
        assert!(input.fully_consumed());
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let mut writer = ChunkedWriter::new(Vec::new(), FRAME_LENGTH, INTERNAL, APPLICATION);
        let blocks = BlockLogWriter::new(&mut writer);
        assert!(matches!(
            blocks.finish().await,
            Err(ProtocolError::EmptyBlockPayload)
        ));
    }
}

//! Length-prefixed binary framing.
//!
//! Frame layout (4 bytes header + payload):
//!
//! ```text
//! +-------------+------------------+
//! | length      | payload          |
//! | 4 bytes BE  | length bytes     |
//! +-------------+------------------+
//! ```
//!
//! The framing layer delivers whole payloads and never splits or merges
//! them; chunk semantics live one layer up.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the frame length field in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Encodes one frame into a fresh buffer.
pub fn encode_frame(payload: &[u8], max_frame_length: usize) -> Result<BytesMut, ProtocolError> {
    if payload.len() > max_frame_length {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: max_frame_length,
        });
    }
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf)
}

/// Attempts to decode the next frame payload from the buffer.
///
/// Returns `Ok(Some(payload))` if a complete frame was buffered,
/// `Ok(None)` if more data is needed, or `Err` on an oversized frame.
pub fn decode_frame(
    buf: &mut BytesMut,
    max_frame_length: usize,
) -> Result<Option<Bytes>, ProtocolError> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > max_frame_length {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: max_frame_length,
        });
    }
    if buf.len() < FRAME_HEADER_SIZE + len {
        return Ok(None);
    }
    buf.advance(FRAME_HEADER_SIZE);
    Ok(Some(buf.split_to(len).freeze()))
}

//! # repligraph-protocol
//!
//! Wire protocol for repligraph master/slave communication.
//!
//! This crate provides:
//! - Length-prefixed binary framing
//! - Chunked message writing and reassembly with a version handshake
//! - Block-log encoding for transaction payloads
//! - Store identity and request-prelude types

pub mod blocklog;
pub mod chunk;
pub mod dechunk;
pub mod error;
pub mod frame;
pub mod message;

pub use blocklog::{BlockLogReader, BlockLogWriter, DATA_SIZE};
pub use chunk::ChunkedWriter;
pub use dechunk::ChunkedReader;
pub use error::ProtocolError;
pub use frame::{decode_frame, encode_frame, FRAME_HEADER_SIZE};
pub use message::{SlaveContext, StoreId};

/// Internal protocol version. Not configurable; both peers must agree.
pub const INTERNAL_PROTOCOL_VERSION: u8 = 2;

/// Default maximum frame payload length (16 MiB).
pub const DEFAULT_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Chunk continuation flag: more chunks of this message follow.
pub const CHUNK_MORE: u8 = 0x00;

/// Chunk continuation flag: last chunk of this message.
pub const CHUNK_LAST: u8 = 0x01;

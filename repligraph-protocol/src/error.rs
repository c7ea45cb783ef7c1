//! Protocol error types.

use thiserror::Error;

/// Errors raised by the wire layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("internal protocol version mismatch: expected {expected}, got {actual}")]
    InternalVersionMismatch { expected: u8, actual: u8 },

    #[error("application protocol version mismatch: expected {expected}, got {actual}")]
    ApplicationVersionMismatch { expected: u8, actual: u8 },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("frame carries no chunk header")]
    EmptyFrame,

    #[error("invalid chunk flag: {0:#04x}")]
    InvalidChunkFlag(u8),

    #[error("empty message")]
    EmptyMessage,

    #[error("message already finished")]
    MessageFinished,

    #[error("insufficient data: needed {needed} bytes, {available} available")]
    InsufficientData { needed: usize, available: usize },

    #[error("end of message")]
    EndOfMessage,

    #[error("empty block-log payload")]
    EmptyBlockPayload,

    #[error("too many datasources: {0} (max 255)")]
    TooManyDatasources(usize),

    #[error("invalid datasource index {index} (stream has {count} datasources)")]
    InvalidDatasourceIndex { index: u8, count: usize },

    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("read timeout")]
    ReadTimeout,

    #[error("invariant violation: {0}")]
    Invariant(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

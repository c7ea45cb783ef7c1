//! Client error taxonomy.
//!
//! Every failure of a request surfaces as a single [`ClientError`]; the
//! variant carries the underlying kind. The channel involved is disposed,
//! never released, so the next acquire gets a fresh one.

use repligraph_protocol::{ProtocolError, StoreId};
use std::net::SocketAddr;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The pool could not establish a new channel.
    #[error("could not connect to {addr}: {reason}")]
    ConnectFailed { addr: SocketAddr, reason: String },

    /// Version mismatch, oversized frame, or malformed chunking.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// No frame arrived within the per-request read timeout.
    #[error("read timeout")]
    Timeout,

    /// The response's store id differs from the expected one.
    #[error("{actual} from response doesn't match expected {expected}")]
    StoreMismatch { expected: StoreId, actual: StoreId },

    /// Underlying socket failure mid-message.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The pool has been shut down.
    #[error("pool closed")]
    PoolClosed,

    /// The client has no store id source configured.
    #[error("store id unavailable")]
    StoreIdUnavailable,

    /// Internal accounting bug.
    #[error("invariant violation: {0}")]
    Invariant(&'static str),
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::ReadTimeout => ClientError::Timeout,
            ProtocolError::Io(e) => ClientError::Transport(e),
            other => ClientError::Protocol(other),
        }
    }
}

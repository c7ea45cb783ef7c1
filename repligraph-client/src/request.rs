//! Request kind descriptors and payload contracts.
//!
//! A request kind is a plain descriptor; kinds are not registered anywhere
//! in the core, peers agree on the numbering out of band. The serializer
//! and deserializer contracts are what concrete request kinds (copy store,
//! incremental update, commit, ...) implement; the core treats them
//! opaquely.

use crate::error::ClientError;
use repligraph_protocol::{ChunkedReader, ChunkedWriter};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Describes one request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestKind {
    /// One-byte tag written ahead of the request body.
    pub id: u8,
    /// Whether the response's store id must match the expected one.
    pub check_store_id: bool,
    /// Per-kind read timeout, overriding the client default.
    pub read_timeout: Option<Duration>,
}

impl RequestKind {
    pub const fn new(id: u8) -> Self {
        Self {
            id,
            check_store_id: true,
            read_timeout: None,
        }
    }

    pub fn without_store_id_check(mut self) -> Self {
        self.check_store_id = false;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

/// Serializes the kind-specific request payload after the prelude.
pub trait Serializer {
    fn write<W: AsyncWrite + Unpin + Send>(
        &mut self,
        out: &mut ChunkedWriter<W>,
        scratch: &mut Vec<u8>,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Deserializes the kind-specific response value.
pub trait Deserializer {
    type Output;

    fn read<R: AsyncRead + Unpin + Send>(
        &mut self,
        input: &mut ChunkedReader<R>,
        scratch: &mut Vec<u8>,
    ) -> impl Future<Output = Result<Self::Output, ClientError>> + Send;
}

/// A request with no payload beyond the prelude.
pub struct EmptySerializer;

impl Serializer for EmptySerializer {
    async fn write<W: AsyncWrite + Unpin + Send>(
        &mut self,
        _out: &mut ChunkedWriter<W>,
        _scratch: &mut Vec<u8>,
    ) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Discards the kind-specific response value.
pub struct VoidDeserializer;

impl Deserializer for VoidDeserializer {
    type Output = ();

    async fn read<R: AsyncRead + Unpin + Send>(
        &mut self,
        _input: &mut ChunkedReader<R>,
        _scratch: &mut Vec<u8>,
    ) -> Result<(), ClientError> {
        Ok(())
    }
}

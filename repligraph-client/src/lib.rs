//! # repligraph-client
//!
//! Pooled client for the repligraph master/slave protocol.
//!
//! This crate provides:
//! - A bounded pool of long-lived TCP channels with liveness checks
//! - The per-request lifecycle: serialize, send, read the response, then
//!   lazily stream the embedded transactions
//! - Request kind descriptors with per-kind timeout and store-id policies

pub mod client;
pub mod config;
pub mod error;
pub mod pool;
pub mod request;
pub mod response;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{Client, NoStoreId, StoreIdSource};
pub use config::ClientConfig;
pub use error::ClientError;
pub use pool::{ChannelContext, ChannelPool, ConnectionLostHandler};
pub use request::{Deserializer, EmptySerializer, RequestKind, Serializer, VoidDeserializer};
pub use response::{Response, StreamedTransaction, TransactionStream};

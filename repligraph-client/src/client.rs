//! Client core: the per-request lifecycle over pooled channels.
//!
//! A request borrows one channel for its whole lifetime: serialize and
//! send, read the response, then hand the channel to the response's
//! transaction stream until it is closed. Any failure along the way
//! disposes the channel so the next acquire opens a fresh one.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::pool::{ChannelContext, ChannelPool, ConnectionLostHandler, SlotGuard};
use crate::request::{Deserializer, RequestKind, Serializer};
use crate::response::{Response, TransactionStream};
use repligraph_protocol::{
    ChunkedReader, ChunkedWriter, SlaveContext, StoreId, INTERNAL_PROTOCOL_VERSION,
};
use std::sync::{Arc, OnceLock};

/// Supplies the local store id for response verification.
///
/// Only consulted when a request kind demands a store-id check and no
/// explicit expectation was passed.
pub trait StoreIdSource: Send + Sync {
    fn store_id(&self) -> Result<StoreId, ClientError>;
}

/// A source for clients that never check store ids.
pub struct NoStoreId;

impl StoreIdSource for NoStoreId {
    fn store_id(&self) -> Result<StoreId, ClientError> {
        Err(ClientError::StoreIdUnavailable)
    }
}

/// A client for the master of a replicated graph database.
///
/// Serializes typed requests, ships them over a pooled channel, and yields
/// the response together with its embedded transaction stream. Any number
/// of tasks may send requests concurrently; the pool serializes them over
/// the configured number of channels.
pub struct Client {
    config: ClientConfig,
    pool: Arc<ChannelPool>,
    store_id_source: Arc<dyn StoreIdSource>,
    my_store_id: OnceLock<StoreId>,
}

impl Client {
    pub fn new(config: ClientConfig, store_id_source: Arc<dyn StoreIdSource>) -> Self {
        Self::with_connection_lost_handler(config, store_id_source, Arc::new(|_| {}))
    }

    pub fn with_connection_lost_handler(
        config: ClientConfig,
        store_id_source: Arc<dyn StoreIdSource>,
        on_connection_lost: ConnectionLostHandler,
    ) -> Self {
        tracing::info!("Client communication bound to {}", config.addr);
        let pool = Arc::new(ChannelPool::new(config.clone(), on_connection_lost));
        Self {
            config,
            pool,
            store_id_source,
            my_store_id: OnceLock::new(),
        }
    }

    /// Sends one request and reads its response.
    ///
    /// The returned [`Response`] keeps the underlying channel until it is
    /// closed; close it (or drop it) to give the channel back to the pool.
    pub async fn send_request<S, D>(
        &self,
        kind: RequestKind,
        context: &SlaveContext,
        serializer: S,
        deserializer: D,
        expected_store_id: Option<&StoreId>,
    ) -> Result<Response<D::Output>, ClientError>
    where
        S: Serializer,
        D: Deserializer,
    {
        let ctx = self.pool.acquire().await?;
        let guard = SlotGuard::new(self.pool.clone());
        // from here on, an early return drops the channel and the guard
        // records the disposal; the context is never released on error
        self.perform(kind, context, serializer, deserializer, expected_store_id, ctx, guard)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn perform<S, D>(
        &self,
        kind: RequestKind,
        context: &SlaveContext,
        mut serializer: S,
        mut deserializer: D,
        expected_store_id: Option<&StoreId>,
        ctx: ChannelContext,
        guard: SlotGuard,
    ) -> Result<Response<D::Output>, ClientError>
    where
        S: Serializer,
        D: Deserializer,
    {
        let ChannelContext {
            mut channel,
            out_buf,
            mut scratch,
        } = ctx;

        tracing::debug!("Sending request kind={:#04x} to {}", kind.id, self.config.addr);
        let mut writer = ChunkedWriter::with_buffer(
            &mut channel,
            out_buf,
            self.config.frame_length,
            INTERNAL_PROTOCOL_VERSION,
            self.config.application_protocol_version,
        );
        writer.write_u8(kind.id).await?;
        context.write_to(&mut writer).await?;
        serializer.write(&mut writer, &mut scratch).await?;
        writer.done().await?;
        let (_, out_buf) = writer.into_parts();

        let read_timeout = kind.read_timeout.unwrap_or(self.config.read_timeout);
        let mut reader = ChunkedReader::new(
            channel,
            self.config.frame_length,
            read_timeout,
            INTERNAL_PROTOCOL_VERSION,
            self.config.application_protocol_version,
        );

        let value = deserializer.read(&mut reader, &mut scratch).await?;
        let store_id = StoreId::read_from(&mut reader).await?;
        tracing::debug!("Response carries {}", store_id);
        if kind.check_store_id {
            let expected = match expected_store_id {
                Some(id) => *id,
                None => self.my_store_id()?,
            };
            if store_id != expected {
                return Err(ClientError::StoreMismatch {
                    expected,
                    actual: store_id,
                });
            }
        }

        let stream =
            TransactionStream::read_header(reader, out_buf, scratch, self.pool.clone(), guard)
                .await?;
        Ok(Response::new(value, store_id, stream))
    }

    fn my_store_id(&self) -> Result<StoreId, ClientError> {
        if let Some(id) = self.my_store_id.get() {
            return Ok(*id);
        }
        let id = self.store_id_source.store_id()?;
        Ok(*self.my_store_id.get_or_init(|| id))
    }

    /// Closes the pool: idle channels are disposed and further acquires
    /// fail. In-flight requests error out as their channels go away.
    pub fn shutdown(&self) {
        self.pool.close();
        tracing::info!("Client[{}] shutdown", self.config.addr);
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &ChannelPool {
        &self.pool
    }
}

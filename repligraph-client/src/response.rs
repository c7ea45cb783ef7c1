//! Response envelope and lazy transaction stream.
//!
//! A response pins its channel until it is closed: the transaction stream
//! reads further frames on demand, and only [`Response::close`] (or
//! dropping the response) lets go of the channel. Closing drains whatever
//! the caller did not consume and returns the channel to the pool; a
//! channel that cannot be drained is disposed instead.

use crate::error::ClientError;
use crate::pool::{ChannelContext, ChannelPool, SlotGuard};
use bytes::{Bytes, BytesMut};
use repligraph_protocol::{BlockLogReader, ChunkedReader, ProtocolError, StoreId, DATA_SIZE};
use std::sync::Arc;
use tokio::net::TcpStream;

/// One transaction pulled off a response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedTransaction {
    pub datasource: String,
    pub tx_id: i64,
    pub payload: Bytes,
}

/// A response: the typed value, the master's store id, and the lazy
/// transaction stream that follows them on the wire.
pub struct Response<T> {
    value: T,
    store_id: StoreId,
    stream: TransactionStream,
}

impl<T> Response<T> {
    pub(crate) fn new(value: T, store_id: StoreId, stream: TransactionStream) -> Self {
        Self {
            value,
            store_id,
            stream,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn transactions(&mut self) -> &mut TransactionStream {
        &mut self.stream
    }

    /// Closes the transaction stream and returns the channel to the pool.
    /// Idempotent; never fails.
    pub async fn close(&mut self) {
        self.stream.close().await;
    }
}

/// Lazy iterator over the transactions embedded in a response.
///
/// Transactions must be consumed in order; each [`next`](Self::next) reads
/// exactly the frames its record needs.
pub struct TransactionStream {
    inner: Option<StreamInner>,
    datasources: Vec<String>,
}

struct StreamInner {
    reader: ChunkedReader<TcpStream>,
    out_buf: BytesMut,
    scratch: Vec<u8>,
    pool: Arc<ChannelPool>,
    guard: SlotGuard,
    finished: bool,
}

impl TransactionStream {
    /// Reads the stream header off the response and takes over the channel.
    pub(crate) async fn read_header(
        mut reader: ChunkedReader<TcpStream>,
        out_buf: BytesMut,
        scratch: Vec<u8>,
        pool: Arc<ChannelPool>,
        guard: SlotGuard,
    ) -> Result<Self, ClientError> {
        let count = reader.read_u8().await?;
        let mut datasources = Vec::with_capacity(count as usize);
        for _ in 0..count {
            datasources.push(reader.read_string().await?);
        }
        let mut inner = StreamInner {
            reader,
            out_buf,
            scratch,
            pool,
            guard,
            finished: false,
        };
        if count == 0 {
            // nothing follows but the terminator; consume it now so the
            // message is fully drained
            let index = inner.reader.read_u8().await?;
            if index != 0 {
                return Err(ProtocolError::InvalidDatasourceIndex { index, count: 0 }.into());
            }
            inner.finished = true;
        }
        Ok(Self {
            inner: Some(inner),
            datasources,
        })
    }

    /// Datasource names announced in the stream header.
    pub fn datasource_names(&self) -> &[String] {
        &self.datasources
    }

    /// Reads the next transaction, or `None` at the end of the stream.
    ///
    /// On error the channel is disposed and the stream is finished.
    pub async fn next(&mut self) -> Result<Option<StreamedTransaction>, ClientError> {
        let inner = match self.inner.as_mut() {
            Some(inner) if !inner.finished => inner,
            _ => return Ok(None),
        };
        match Self::read_record(inner, &self.datasources).await {
            Ok(record) => Ok(record),
            Err(e) => {
                // the channel is no longer in a usable state; dropping the
                // inner state closes it and the guard records the disposal
                self.inner = None;
                Err(e)
            }
        }
    }

    async fn read_record(
        inner: &mut StreamInner,
        datasources: &[String],
    ) -> Result<Option<StreamedTransaction>, ClientError> {
        Self::ensure_record_buffered(&mut inner.reader).await?;
        let index = inner.reader.read_u8().await?;
        if index == 0 {
            inner.finished = true;
            return Ok(None);
        }
        let datasource = datasources
            .get(index as usize - 1)
            .ok_or(ProtocolError::InvalidDatasourceIndex {
                index,
                count: datasources.len(),
            })?
            .clone();
        let tx_id = inner.reader.read_i64().await?;
        inner.scratch.clear();
        BlockLogReader::new(&mut inner.reader)
            .read_to_end(&mut inner.scratch)
            .await?;
        let payload = Bytes::copy_from_slice(&inner.scratch);
        tracing::debug!(
            "Streamed transaction {} from {} ({} bytes)",
            tx_id,
            datasource,
            payload.len()
        );
        Ok(Some(StreamedTransaction {
            datasource,
            tx_id,
            payload,
        }))
    }

    /// Forces the whole next record into the reassembly buffer before any
    /// of it is consumed.
    async fn ensure_record_buffered(
        reader: &mut ChunkedReader<TcpStream>,
    ) -> Result<(), ClientError> {
        reader.mark();
        let probed = async {
            if reader.read_u8().await? > 0 {
                reader.skip(8).await?; // tx id
                loop {
                    let block_size = reader.read_u8().await? as usize;
                    if block_size == 0 {
                        reader.skip(DATA_SIZE).await?;
                    } else {
                        reader.skip(block_size).await?;
                        break;
                    }
                }
            }
            Ok::<_, ClientError>(())
        }
        .await;
        reader.reset().map_err(ClientError::from)?;
        probed
    }

    /// Drains any unconsumed frames and returns the channel to the pool.
    /// Idempotent; a channel that cannot be drained is disposed instead.
    pub async fn close(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let StreamInner {
            mut reader,
            out_buf,
            scratch,
            pool,
            guard,
            finished: _,
        } = inner;
        match reader.drain().await {
            Ok(()) => {
                let ctx = ChannelContext {
                    channel: reader.into_inner(),
                    out_buf,
                    scratch,
                };
                pool.release(ctx);
                guard.disarm();
            }
            Err(e) => {
                tracing::debug!("Disposing channel after failed drain: {}", e);
                // reader (and with it the channel) drops here; the guard
                // records the disposal
            }
        }
    }
}

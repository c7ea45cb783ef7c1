//! Store identity and request-prelude types.

use crate::chunk::ChunkedWriter;
use crate::dechunk::ChunkedReader;
use crate::error::ProtocolError;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Identity triple of a database instance, appended to every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId {
    pub creation_time: i64,
    pub random_id: i64,
    pub store_version: i64,
}

impl StoreId {
    /// Serialized size on the wire.
    pub const WIRE_SIZE: usize = 24;

    pub fn new(creation_time: i64, random_id: i64, store_version: i64) -> Self {
        Self {
            creation_time,
            random_id,
            store_version,
        }
    }

    pub async fn read_from<R: AsyncRead + Unpin>(
        input: &mut ChunkedReader<R>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            creation_time: input.read_i64().await?,
            random_id: input.read_i64().await?,
            store_version: input.read_i64().await?,
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(
        &self,
        out: &mut ChunkedWriter<W>,
    ) -> Result<(), ProtocolError> {
        out.write_i64(self.creation_time).await?;
        out.write_i64(self.random_id).await?;
        out.write_i64(self.store_version).await
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreId[{},{},{}]",
            self.creation_time, self.random_id, self.store_version
        )
    }
}

/// Per-request prelude identifying the calling slave and the transactions
/// it has applied so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveContext {
    pub session_id: u64,
    pub machine_id: i32,
    pub event_identifier: i32,
    /// Last applied transaction per datasource, at most 255 entries.
    pub last_applied_txs: Vec<(String, i64)>,
}

impl SlaveContext {
    pub fn new(
        session_id: u64,
        machine_id: i32,
        event_identifier: i32,
        last_applied_txs: Vec<(String, i64)>,
    ) -> Self {
        Self {
            session_id,
            machine_id,
            event_identifier,
            last_applied_txs,
        }
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(
        &self,
        out: &mut ChunkedWriter<W>,
    ) -> Result<(), ProtocolError> {
        if self.last_applied_txs.len() > u8::MAX as usize {
            return Err(ProtocolError::TooManyDatasources(
                self.last_applied_txs.len(),
            ));
        }
        out.write_u64(self.session_id).await?;
        out.write_i32(self.machine_id).await?;
        out.write_i32(self.event_identifier).await?;
        out.write_u8(self.last_applied_txs.len() as u8).await?;
        for (datasource, tx_id) in &self.last_applied_txs {
            out.write_string(datasource).await?;
            out.write_i64(*tx_id).await?;
        }
        Ok(())
    }

    pub async fn read_from<R: AsyncRead + Unpin>(
        input: &mut ChunkedReader<R>,
    ) -> Result<Self, ProtocolError> {
        let session_id = input.read_u64().await?;
        let machine_id = input.read_i32().await?;
        let event_identifier = input.read_i32().await?;
        let count = input.read_u8().await?;
        let mut last_applied_txs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let datasource = input.read_string().await?;
            let tx_id = input.read_i64().await?;
            last_applied_txs.push((datasource, tx_id));
        }
        Ok(Self {
            session_id,
            machine_id,
            event_identifier,
            last_applied_txs,
        })
    }
}

//! Scripted in-process master for client tests.

use crate::error::ClientError;
use crate::request::{Deserializer, Serializer};
use repligraph_protocol::{
    BlockLogWriter, ChunkedReader, ChunkedWriter, ProtocolError, SlaveContext, StoreId,
    INTERNAL_PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// Application protocol version both ends of the tests agree on.
pub(crate) const APPLICATION_VERSION: u8 = 9;

pub(crate) async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

pub(crate) struct ReceivedRequest {
    pub kind: u8,
    pub context: SlaveContext,
    pub payload: Vec<u8>,
    pub socket: TcpStream,
}

/// Reads one whole request message off the socket. Returns `None` if the
/// peer closed the connection instead of sending another request.
pub(crate) async fn read_request(socket: TcpStream, frame_length: usize) -> Option<ReceivedRequest> {
    let mut reader = ChunkedReader::new(
        socket,
        frame_length,
        Duration::from_secs(5),
        INTERNAL_PROTOCOL_VERSION,
        APPLICATION_VERSION,
    );
    let kind = match reader.read_u8().await {
        Ok(kind) => kind,
        Err(ProtocolError::ConnectionClosed) | Err(ProtocolError::ReadTimeout) => return None,
        Err(e) => panic!("request read failed: {e}"),
    };
    let context = SlaveContext::read_from(&mut reader).await.unwrap();
    let mut payload = Vec::new();
    loop {
        match reader.read_u8().await {
            Ok(b) => payload.push(b),
            Err(ProtocolError::EndOfMessage) => break,
            Err(e) => panic!("request read failed: {e}"),
        }
    }
    Some(ReceivedRequest {
        kind,
        context,
        payload,
        socket: reader.into_inner(),
    })
}

pub(crate) struct Tx {
    pub index: u8,
    pub tx_id: i64,
    pub payload: Vec<u8>,
}

/// Writes one scripted response message and hands the socket back.
pub(crate) async fn write_response(
    socket: TcpStream,
    frame_length: usize,
    body: &[u8],
    store_id: StoreId,
    datasources: &[&str],
    txs: &[Tx],
) -> TcpStream {
    let mut writer = ChunkedWriter::new(
        socket,
        frame_length,
        INTERNAL_PROTOCOL_VERSION,
        APPLICATION_VERSION,
    );
    writer.write_bytes(body).await.unwrap();
    store_id.write_to(&mut writer).await.unwrap();
    writer.write_u8(datasources.len() as u8).await.unwrap();
    for name in datasources {
        writer.write_string(name).await.unwrap();
    }
    for tx in txs {
        writer.write_u8(tx.index).await.unwrap();
        writer.write_i64(tx.tx_id).await.unwrap();
        let mut blocks = BlockLogWriter::new(&mut writer);
        blocks.write(&tx.payload).await.unwrap();
        blocks.finish().await.unwrap();
    }
    writer.write_u8(0).await.unwrap();
    writer.done().await.unwrap();
    writer.into_parts().0
}

/// A raw frame with an arbitrary payload, bypassing the chunk writer.
pub(crate) fn raw_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

pub(crate) fn push_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn push_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Sends a fixed byte payload after the prelude.
pub(crate) struct BytesSerializer(pub Vec<u8>);

impl Serializer for BytesSerializer {
    async fn write<W: AsyncWrite + Unpin + Send>(
        &mut self,
        out: &mut ChunkedWriter<W>,
        _scratch: &mut Vec<u8>,
    ) -> Result<(), ClientError> {
        out.write_bytes(&self.0).await?;
        Ok(())
    }
}

/// Reads a fixed number of body bytes.
pub(crate) struct FixedBytesDeserializer(pub usize);

impl Deserializer for FixedBytesDeserializer {
    type Output = Vec<u8>;

    async fn read<R: AsyncRead + Unpin + Send>(
        &mut self,
        input: &mut ChunkedReader<R>,
        _scratch: &mut Vec<u8>,
    ) -> Result<Vec<u8>, ClientError> {
        let mut out = vec![0u8; self.0];
        input.read_exact(&mut out).await?;
        Ok(out)
    }
}

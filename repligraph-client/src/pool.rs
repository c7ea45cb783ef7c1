//! Bounded channel pool.
//!
//! Channels are opened lazily up to the configured maximum; released
//! channels are kept idle for reuse up to the idle limit. Acquire blocks
//! while the pool is exhausted and fails once the pool is closed. A
//! borrowed context is either in flight for exactly one request or idle in
//! the pool, never both.

use crate::config::ClientConfig;
use crate::error::ClientError;
use bytes::BytesMut;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::timeout;

/// Size of the per-channel scratch buffer (1 MiB).
pub const SCRATCH_BUFFER_SIZE: usize = 1024 * 1024;

/// Sleep after a failed connect, damping reconnect storms. Applies only to
/// connect failures, never to capacity waits.
const RECONNECT_DAMPING: Duration = Duration::from_secs(5);

/// Callback invoked when establishing a channel fails, before the error is
/// surfaced to the caller.
pub type ConnectionLostHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// A pooled connection context: the channel plus its reusable buffers.
///
/// Owned by the pool; borrowed by a caller for exactly one request.
pub struct ChannelContext {
    pub channel: TcpStream,
    pub out_buf: BytesMut,
    pub scratch: Vec<u8>,
}

impl ChannelContext {
    fn new(channel: TcpStream) -> Self {
        Self {
            channel,
            out_buf: BytesMut::new(),
            scratch: Vec::with_capacity(SCRATCH_BUFFER_SIZE),
        }
    }

    /// Whether the channel can still carry a request. An idle channel has
    /// no outstanding response, so any readable byte (or EOF) means the
    /// peer closed or broke protocol.
    pub fn is_alive(&self) -> bool {
        let mut probe = [0u8; 1];
        match self.channel.try_read(&mut probe) {
            Ok(_) => false,
            Err(e) => e.kind() == ErrorKind::WouldBlock,
        }
    }
}

struct PoolState {
    idle: Vec<ChannelContext>,
    /// Borrowed + idle channels.
    live: usize,
    closed: bool,
}

/// Bounded, blocking pool of connection contexts.
pub struct ChannelPool {
    config: ClientConfig,
    state: Mutex<PoolState>,
    available: Notify,
    on_connection_lost: ConnectionLostHandler,
}

enum Acquired {
    Ready(ChannelContext),
    Create,
    Wait,
}

impl ChannelPool {
    pub fn new(config: ClientConfig, on_connection_lost: ConnectionLostHandler) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                live: 0,
                closed: false,
            }),
            available: Notify::new(),
            on_connection_lost,
        }
    }

    /// Borrows a context, opening a new channel if the pool has room.
    /// Blocks while all channels are busy; fails once the pool is closed.
    pub async fn acquire(&self) -> Result<ChannelContext, ClientError> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(ClientError::PoolClosed);
                }
                loop {
                    if let Some(ctx) = state.idle.pop() {
                        if ctx.is_alive() {
                            break Acquired::Ready(ctx);
                        }
                        state.live -= 1;
                        tracing::debug!("Dropping dead idle channel to {}", self.config.addr);
                        continue;
                    }
                    if state.live < self.config.max_concurrent_channels {
                        // reserve the slot before connecting
                        state.live += 1;
                        break Acquired::Create;
                    }
                    break Acquired::Wait;
                }
            };

            match next {
                Acquired::Ready(ctx) => return Ok(ctx),
                Acquired::Create => {
                    return match self.open_channel().await {
                        Ok(ctx) => Ok(ctx),
                        Err(e) => {
                            self.forget();
                            Err(e)
                        }
                    }
                }
                Acquired::Wait => notified.await,
            }
        }
    }

    async fn open_channel(&self) -> Result<ChannelContext, ClientError> {
        let addr = self.config.addr;
        match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(channel)) => {
                channel.set_nodelay(true).ok();
                tracing::info!("Opened a new channel to {}", addr);
                Ok(ChannelContext::new(channel))
            }
            outcome => {
                let reason = match outcome {
                    Ok(Err(e)) => e.to_string(),
                    _ => "connect timed out".to_string(),
                };
                tracing::warn!("Could not connect to {}: {}", addr, reason);
                let error = ClientError::ConnectFailed { addr, reason };
                // damp reconnect storms before surfacing the failure
                tokio::time::sleep(RECONNECT_DAMPING).await;
                (self.on_connection_lost)(&error);
                Err(error)
            }
        }
    }

    /// Returns a borrowed context to the pool, or disposes it if the pool
    /// is full, closed, or the channel is no longer alive.
    pub fn release(&self, ctx: ChannelContext) {
        {
            let mut state = self.state.lock();
            if !state.closed && ctx.is_alive() && state.idle.len() < self.config.max_idle_channels {
                state.idle.push(ctx);
            } else {
                // dropping the context closes the socket
                state.live -= 1;
            }
        }
        self.available.notify_waiters();
    }

    /// Records the disposal of a borrowed context whose channel the caller
    /// closed (or dropped) itself.
    pub fn forget(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.live > 0, "unbalanced forget");
            state.live = state.live.saturating_sub(1);
        }
        self.available.notify_waiters();
    }

    /// Disposes all idle channels and rejects further acquires.
    pub fn close(&self) {
        let idle = {
            let mut state = self.state.lock();
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.live -= idle.len();
            idle
        };
        drop(idle);
        self.available.notify_waiters();
    }

    /// Borrowed + idle channels.
    pub fn live_count(&self) -> usize {
        self.state.lock().live
    }

    /// Channels currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }
}

/// Tracks one borrowed pool slot, recording a disposal on drop unless the
/// context was explicitly released.
pub(crate) struct SlotGuard {
    pool: Arc<ChannelPool>,
    armed: bool,
}

impl SlotGuard {
    pub(crate) fn new(pool: Arc<ChannelPool>) -> Self {
        Self { pool, armed: true }
    }

    /// The context went back to the pool; the slot is no longer this
    /// guard's to account for.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.armed {
            self.pool.forget();
        }
    }
}

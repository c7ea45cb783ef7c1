//! Client configuration.

use repligraph_protocol::DEFAULT_FRAME_LENGTH;
use std::net::SocketAddr;
use std::time::Duration;

/// Default read-response timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum number of concurrently open channels.
///
/// Needs to be generous: an exhausted pool blocks acquirers, which gets
/// disastrous if the blocked task holds locks the rest of the system needs
/// in order to talk to the master.
pub const DEFAULT_MAX_CONCURRENT_CHANNELS: usize = 20;

/// Default number of idle channels kept around for reuse.
pub const DEFAULT_MAX_IDLE_CHANNELS: usize = 5;

/// Minimum frame length (1 KiB).
pub const MIN_FRAME_LENGTH: usize = 1024;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Master address. One client instance binds to one address.
    pub addr: SocketAddr,
    /// Application protocol version, agreed with the peer out of band.
    pub application_protocol_version: u8,
    /// Maximum frame payload length.
    pub frame_length: usize,
    /// Default read-response timeout; request kinds may override it.
    pub read_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Maximum number of concurrently open channels.
    pub max_concurrent_channels: usize,
    /// Maximum number of idle channels kept for reuse.
    pub max_idle_channels: usize,
}

impl ClientConfig {
    pub fn new(addr: SocketAddr, application_protocol_version: u8) -> Self {
        Self {
            addr,
            application_protocol_version,
            frame_length: DEFAULT_FRAME_LENGTH,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_concurrent_channels: DEFAULT_MAX_CONCURRENT_CHANNELS,
            max_idle_channels: DEFAULT_MAX_IDLE_CHANNELS,
        }
    }

    pub fn with_frame_length(mut self, frame_length: usize) -> Self {
        self.frame_length = frame_length.clamp(MIN_FRAME_LENGTH, DEFAULT_FRAME_LENGTH);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_channels(mut self, max: usize) -> Self {
        self.max_concurrent_channels = max.max(1);
        self
    }

    pub fn with_max_idle_channels(mut self, max: usize) -> Self {
        self.max_idle_channels = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("127.0.0.1:6361".parse().unwrap(), 9);
        assert_eq!(config.frame_length, DEFAULT_FRAME_LENGTH);
        assert_eq!(config.read_timeout, Duration::from_secs(20));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_concurrent_channels, 20);
        assert_eq!(config.max_idle_channels, 5);
    }

    #[test]
    fn test_config_frame_length_clamping() {
        let config = ClientConfig::new("127.0.0.1:6361".parse().unwrap(), 9).with_frame_length(16);
        assert_eq!(config.frame_length, MIN_FRAME_LENGTH);

        let config = ClientConfig::new("127.0.0.1:6361".parse().unwrap(), 9)
            .with_frame_length(usize::MAX);
        assert_eq!(config.frame_length, DEFAULT_FRAME_LENGTH);
    }

    #[test]
    fn test_config_at_least_one_channel() {
        let config =
            ClientConfig::new("127.0.0.1:6361".parse().unwrap(), 9).with_max_concurrent_channels(0);
        assert_eq!(config.max_concurrent_channels, 1);
    }
}

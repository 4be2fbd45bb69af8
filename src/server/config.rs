//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default listen port
pub const DEFAULT_PORT: u16 = 9400;

/// Default maximum frame length (64KB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Idle timeout (disconnect if no frame received)
    pub idle_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Maximum length of a single client frame in bytes
    pub max_frame_len: usize,

    /// Number of recent room messages replayed after a join (0 = none)
    pub history_replay: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            idle_timeout: Duration::from_secs(300),
            tcp_nodelay: true,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            history_replay: 0,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set maximum frame length
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len.max(1);
        self
    }

    /// Replay up to `count` recent room messages after each join
    pub fn history_replay(mut self, count: usize) -> Self {
        self.history_replay = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert!(config.tcp_nodelay);
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
        assert_eq!(config.history_replay, 0);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9401".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9401);
    }

    #[test]
    fn test_builder_max_frame_len_min() {
        let config = ServerConfig::default().max_frame_len(0);

        assert_eq!(config.max_frame_len, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9400".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .idle_timeout(Duration::from_secs(30))
            .max_frame_len(1024)
            .history_replay(10);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.max_frame_len, 1024);
        assert_eq!(config.history_replay, 10);
    }
}

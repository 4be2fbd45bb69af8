//! Hub configuration

use std::time::Duration;

/// Default number of messages retained in the history buffer
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Default per-connection delivery timeout
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of a channel-backed mailbox
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default maximum room name length in bytes
pub const DEFAULT_MAX_ROOM_NAME_LEN: usize = 128;

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of messages kept in the history buffer (at least 1)
    pub history_capacity: usize,

    /// How long a single connection may take to accept a message
    pub delivery_timeout: Duration,

    /// Queue size of mailboxes created by `Hub::register_channel`
    pub mailbox_capacity: usize,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Maximum room name length in bytes
    pub max_room_name_len: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            max_connections: 0, // Unlimited
            max_room_name_len: DEFAULT_MAX_ROOM_NAME_LEN,
        }
    }
}

impl HubConfig {
    /// Set the history capacity
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    /// Set the per-connection delivery timeout
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Set the mailbox capacity for channel-backed connections
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        // tokio mpsc channels panic on zero capacity
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set maximum room name length
    pub fn max_room_name_len(mut self, len: usize) -> Self {
        self.max_room_name_len = len.max(1);
        self
    }
}

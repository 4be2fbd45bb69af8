//! Connection identity and the connection registry
//!
//! The registry is the single source of truth for which connections are live.
//! Rooms only refer to connections by [`ConnectionId`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::room::RoomName;
use super::sink::MessageSink;

/// Process-unique identifier of a registered connection
///
/// Ids are allocated from a per-hub counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create an id from its raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Registry entry for a single live connection
pub struct ConnectionEntry {
    /// Connection id
    pub id: ConnectionId,

    /// When the connection was registered
    pub connected_at: DateTime<Utc>,

    /// Send capability, only used by the broadcast engine
    pub(super) sink: Arc<dyn MessageSink>,
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a connection for introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Connection id
    pub id: ConnectionId,
    /// When the connection was registered
    pub connected_at: DateTime<Utc>,
    /// Rooms the connection currently belongs to
    pub rooms: Vec<RoomName>,
}

/// Set of live connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection under a freshly allocated id
    pub fn insert(&mut self, id: ConnectionId, sink: Arc<dyn MessageSink>) -> &ConnectionEntry {
        self.connections.entry(id).or_insert(ConnectionEntry {
            id,
            connected_at: Utc::now(),
            sink,
        })
    }

    /// Remove a connection
    ///
    /// Returns the entry if it was present; removing an absent id is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.connections.remove(&id)
    }

    /// Look up a connection
    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&id)
    }

    /// Check if a connection is live
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of live connections
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Send capability of a live connection
    pub(super) fn sink(&self, id: ConnectionId) -> Option<Arc<dyn MessageSink>> {
        self.connections.get(&id).map(|entry| Arc::clone(&entry.sink))
    }

    /// Send capabilities of every live connection
    pub(super) fn sinks(&self) -> Vec<(ConnectionId, Arc<dyn MessageSink>)> {
        self.connections
            .values()
            .map(|entry| (entry.id, Arc::clone(&entry.sink)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::hub::sink::ChannelSink;

    use super::*;

    fn sink() -> Arc<dyn MessageSink> {
        let (sink, _mailbox) = ChannelSink::channel(1);
        Arc::new(sink)
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(42).to_string(), "conn-42");
        assert_eq!(ConnectionId::new(42).as_u64(), 42);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new(1);

        registry.insert(id, sink());
        assert!(registry.contains(id));
        assert_eq!(registry.count(), 1);
        assert!(registry.get(id).is_some());

        assert!(registry.remove(id).is_some());
        assert!(!registry.contains(id));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new(1);
        registry.insert(id, sink());

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_sinks_snapshot() {
        let mut registry = ConnectionRegistry::new();
        registry.insert(ConnectionId::new(1), sink());
        registry.insert(ConnectionId::new(2), sink());

        let mut ids: Vec<_> = registry.sinks().into_iter().map(|(id, _)| id).collect();
        ids.sort();

        assert_eq!(ids, vec![ConnectionId::new(1), ConnectionId::new(2)]);
        assert!(registry.sink(ConnectionId::new(3)).is_none());
    }
}

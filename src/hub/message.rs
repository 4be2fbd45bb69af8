//! Broadcast message types
//!
//! A [`Message`] is created by the broadcast engine at the moment it accepts a
//! payload, and is shared between every recipient and the history buffer
//! through an `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::connection::ConnectionId;
use super::room::RoomName;

/// An immutable envelope broadcast to one or more connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Hub-wide sequence number, increasing with every accepted broadcast
    pub sequence: u64,
    /// Opaque structured payload
    pub payload: Value,
    /// Room the message was addressed to (`None` = every connection)
    pub target_room: Option<RoomName>,
    /// Time the broadcast was accepted
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub(super) fn new(
        sequence: u64,
        payload: Value,
        target_room: Option<RoomName>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence,
            payload,
            target_room,
            timestamp,
        }
    }

    /// Whether the message was addressed to the given room
    pub fn is_for_room(&self, room: &RoomName) -> bool {
        self.target_room.as_ref() == Some(room)
    }
}

/// Summary of a single broadcast call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Number of connections a delivery was attempted to
    pub attempted: usize,
    /// Number of connections that accepted the message
    pub delivered: usize,
    /// Connections whose delivery failed and that were removed from the hub
    pub pruned: Vec<ConnectionId>,
}

impl DeliveryReport {
    /// Whether every attempted delivery succeeded
    pub fn is_complete(&self) -> bool {
        self.pruned.is_empty() && self.delivered == self.attempted
    }
}

//! Wire frames for the TCP transport
//!
//! Every frame is one JSON object on its own line, tagged by `"type"`:
//!
//! ```text
//! -> {"type":"join","room":"ops"}
//! <- {"type":"joined","room":"ops"}
//! -> {"type":"publish","room":"ops","payload":{"text":"hi"}}
//! <- {"type":"message","sequence":1,"room":"ops","payload":{"text":"hi"},"timestamp":"..."}
//! <- {"type":"published","attempted":1,"delivered":1,"pruned":[]}
//! ```
//!
//! A session is closed after `idle_timeout` without client frames or room
//! traffic; a quiet client keeps it open with `{"type":"ping"}`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::hub::{ConnectionId, DeliveryReport, Message, RoomName};
use crate::stats::HubStatus;

/// Default number of entries returned by a `history` request
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

/// Frame sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Join a room
    Join { room: String },

    /// Leave a room
    Leave { room: String },

    /// Broadcast a payload to a room, or to everyone without a room
    Publish {
        #[serde(default)]
        room: Option<String>,
        payload: Value,
    },

    /// Request recent messages, optionally for a single room
    History {
        #[serde(default)]
        room: Option<String>,
        #[serde(default = "default_history_limit")]
        limit: usize,
    },

    /// Request hub status
    Status,

    /// Liveness check
    Ping,
}

/// A message as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub room: Option<RoomName>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            sequence: message.sequence,
            room: message.target_room.clone(),
            payload: message.payload.clone(),
            timestamp: message.timestamp,
        }
    }
}

/// Frame sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on every accepted connection
    Welcome { connection_id: ConnectionId },

    /// A broadcast delivered to this connection
    Message(WireMessage),

    Joined { room: RoomName },

    Left { room: RoomName },

    /// Outcome of this connection's `publish`
    Published(DeliveryReport),

    History { messages: Vec<WireMessage> },

    Status(HubStatus),

    Pong,

    Error { message: String },
}

impl ServerFrame {
    /// Build an error frame
    pub fn error(message: impl std::fmt::Display) -> Self {
        ServerFrame::Error {
            message: message.to_string(),
        }
    }

    /// Encode as a single newline-terminated line
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = serde_json::to_vec(self)?;
        buf.push(b'\n');
        Ok(Bytes::from(buf))
    }
}

/// Decode one line received from a client
pub fn decode_client_frame(line: &str) -> Result<ClientFrame> {
    Ok(serde_json::from_str(line.trim_end())?)
}

//! Room names and the room membership index
//!
//! Rooms exist only while they have members: the first `join` creates a room
//! and the last `leave` removes it. The index keeps a reverse map from
//! connection to rooms so `leave_all` does not have to scan every room.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::config::DEFAULT_MAX_ROOM_NAME_LEN;
use super::connection::ConnectionId;
use super::error::HubError;

/// Name of a room, validated at construction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    /// Create a room name using the default length limit
    pub fn new(name: impl Into<String>) -> Result<Self, HubError> {
        Self::with_limit(name, DEFAULT_MAX_ROOM_NAME_LEN)
    }

    /// Create a room name with an explicit length limit in bytes
    ///
    /// Names must be non-empty, at most `max_len` bytes and free of control
    /// characters.
    pub fn with_limit(name: impl Into<String>, max_len: usize) -> Result<Self, HubError> {
        let name = name.into();

        let reason = if name.is_empty() {
            Some("must not be empty")
        } else if name.len() > max_len {
            Some("too long")
        } else if name.chars().any(char::is_control) {
            Some("contains control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(HubError::InvalidRoomName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomName {
    type Error = HubError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomName> for String {
    fn from(room: RoomName) -> Self {
        room.0
    }
}

/// Room membership index
#[derive(Debug, Default)]
pub struct RoomIndex {
    /// Room name to member ids; never holds an empty set
    rooms: BTreeMap<RoomName, BTreeSet<ConnectionId>>,

    /// Connection id to the rooms it belongs to
    memberships: HashMap<ConnectionId, BTreeSet<RoomName>>,
}

impl RoomIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed
    ///
    /// Returns `false` if the connection was already a member.
    pub fn join(&mut self, room: RoomName, id: ConnectionId) -> bool {
        let added = self.rooms.entry(room.clone()).or_default().insert(id);
        if added {
            self.memberships.entry(id).or_default().insert(room);
        }
        added
    }

    /// Remove a connection from a room, deleting the room once empty
    ///
    /// Returns `false` if the connection was not a member.
    pub fn leave(&mut self, room: &RoomName, id: ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };

        let removed = members.remove(&id);
        if members.is_empty() {
            self.rooms.remove(room);
        }

        if removed {
            if let Some(joined) = self.memberships.get_mut(&id) {
                joined.remove(room);
                if joined.is_empty() {
                    self.memberships.remove(&id);
                }
            }
        }

        removed
    }

    /// Remove a connection from every room it belongs to
    ///
    /// Returns the rooms that were left.
    pub fn leave_all(&mut self, id: ConnectionId) -> Vec<RoomName> {
        let Some(joined) = self.memberships.remove(&id) else {
            return Vec::new();
        };

        for room in &joined {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }

        joined.into_iter().collect()
    }

    /// Members of a room (empty for unknown rooms)
    pub fn members_of(&self, room: &RoomName) -> BTreeSet<ConnectionId> {
        self.rooms.get(room).cloned().unwrap_or_default()
    }

    /// Rooms a connection belongs to, in name order
    pub fn rooms_of(&self, id: ConnectionId) -> Vec<RoomName> {
        self.memberships
            .get(&id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All rooms with at least one member, in name order
    pub fn rooms(&self) -> Vec<RoomName> {
        self.rooms.keys().cloned().collect()
    }

    /// Number of rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Check if a room currently exists
    pub fn contains_room(&self, room: &RoomName) -> bool {
        self.rooms.contains_key(room)
    }
}

//! Bounded message history
//!
//! Keeps the most recent broadcasts for replay and inspection. Eviction is
//! strictly FIFO: reading entries never refreshes them.

use std::collections::VecDeque;
use std::sync::Arc;

use super::message::Message;
use super::room::RoomName;

/// Bounded, append-only log of recently broadcast messages
#[derive(Debug)]
pub struct HistoryBuffer {
    /// Maximum number of retained entries
    capacity: usize,
    /// Retained entries, oldest first
    entries: VecDeque<Arc<Message>>,
    /// Total entries ever appended
    appended: u64,
}

impl HistoryBuffer {
    /// Create a buffer holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
            appended: 0,
        }
    }

    /// Append an entry, evicting the oldest entries beyond capacity
    pub fn append(&mut self, entry: Arc<Message>) {
        self.entries.push_back(entry);
        self.appended += 1;

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The most recent `limit` entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<Arc<Message>> {
        let limit = limit.min(self.entries.len());
        self.entries
            .iter()
            .skip(self.entries.len() - limit)
            .cloned()
            .collect()
    }

    /// The most recent `limit` entries addressed to `room`, oldest first
    pub fn recent_in_room(&self, room: &RoomName, limit: usize) -> Vec<Arc<Message>> {
        let mut matched: Vec<_> = self
            .entries
            .iter()
            .rev()
            .filter(|msg| msg.is_for_room(room))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries appended since creation, including evicted ones
    pub fn total_appended(&self) -> u64 {
        self.appended
    }
}

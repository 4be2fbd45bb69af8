//! Status and counters for a hub

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Aggregate hub status, suitable for a read-only reporting endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStatus {
    /// Whether the hub accepts broadcasts and registrations
    pub active: bool,
    /// Live connections
    pub connection_count: usize,
    /// Rooms with at least one member
    pub room_count: usize,
    /// Messages recorded to history since the hub was created
    pub messages_recorded: u64,
}

/// Lifetime counters of a hub
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Connections ever registered
    pub connections_total: u64,
    /// Broadcasts accepted
    pub broadcasts_total: u64,
    /// Successful per-connection deliveries
    pub deliveries_total: u64,
    /// Connections pruned after a failed delivery
    pub pruned_total: u64,
    /// Broadcasts and registrations rejected while stopped or at capacity
    pub rejected_total: u64,
    /// Time since the last `start`, zero while stopped
    pub uptime: Duration,
}

impl HubStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of attempted deliveries that succeeded (1.0 with no attempts)
    pub fn delivery_ratio(&self) -> f64 {
        let attempted = self.deliveries_total + self.pruned_total;
        if attempted > 0 {
            self.deliveries_total as f64 / attempted as f64
        } else {
            1.0
        }
    }
}

/// Atomic counters updated by the hub
#[derive(Debug, Default)]
pub struct HubMetrics {
    connections_total: AtomicU64,
    broadcasts_total: AtomicU64,
    deliveries_total: AtomicU64,
    pruned_total: AtomicU64,
    rejected_total: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, delivered: usize, pruned: usize) {
        self.broadcasts_total.fetch_add(1, Ordering::Relaxed);
        self.deliveries_total
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.pruned_total.fetch_add(pruned as u64, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters
    pub fn snapshot(&self, uptime: Duration) -> HubStats {
        HubStats {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            broadcasts_total: self.broadcasts_total.load(Ordering::Relaxed),
            deliveries_total: self.deliveries_total.load(Ordering::Relaxed),
            pruned_total: self.pruned_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            uptime,
        }
    }
}

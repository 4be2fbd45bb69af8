//! Hub implementation
//!
//! The hub owns the connection registry, the room index and the history
//! buffer behind a single `RwLock`. Every mutation takes the write lock, so
//! concurrent broadcasts never interleave their state changes. Delivery itself
//! runs outside the lock: each target gets its own task bounded by
//! `HubConfig::delivery_timeout`.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::stats::{HubMetrics, HubStats, HubStatus};

use super::config::HubConfig;
use super::connection::{ConnectionId, ConnectionInfo, ConnectionRegistry};
use super::error::{DeliveryError, HubError};
use super::history::HistoryBuffer;
use super::message::{DeliveryReport, Message};
use super::room::{RoomIndex, RoomName};
use super::sink::{ChannelSink, Mailbox, MessageSink};

type Target = (ConnectionId, Arc<dyn MessageSink>);

/// State guarded by the hub lock
#[derive(Debug)]
struct HubState {
    /// Whether broadcasts and registrations are accepted
    active: bool,

    /// When the hub was last started
    started_at: Option<Instant>,

    connections: ConnectionRegistry,
    rooms: RoomIndex,
    history: HistoryBuffer,
}

impl HubState {
    /// Add a registered connection to a room
    fn join_room(&mut self, room: RoomName, id: ConnectionId) -> bool {
        if !self.connections.contains(id) {
            tracing::debug!(connection_id = %id, room = %room, "Join ignored: unknown connection");
            return false;
        }

        let joined = self.rooms.join(room.clone(), id);
        if joined {
            tracing::debug!(
                connection_id = %id,
                room = %room,
                members = self.rooms.members_of(&room).len(),
                "Joined room"
            );
        }
        joined
    }

    /// Remove a connection and all of its room memberships
    ///
    /// Returns `true` if the connection was registered.
    fn remove_connection(&mut self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        // Runs even for unknown ids so a stale membership cannot survive
        let left = self.rooms.leave_all(id);

        if removed {
            tracing::debug!(
                connection_id = %id,
                rooms_left = left.len(),
                connections = self.connections.count(),
                "Connection unregistered"
            );
        }

        removed
    }

    /// Members of a room that are still registered
    fn live_members(&self, room: &RoomName) -> BTreeSet<ConnectionId> {
        self.rooms
            .members_of(room)
            .into_iter()
            .filter(|id| self.connections.contains(*id))
            .collect()
    }
}

/// Connection registry and room-based broadcast hub
///
/// Created stopped; call [`Hub::start`] before registering connections or
/// broadcasting. Share it between tasks as `Arc<Hub>`.
pub struct Hub {
    state: RwLock<HubState>,

    config: HubConfig,

    metrics: HubMetrics,

    next_connection_id: AtomicU64,

    next_sequence: AtomicU64,
}

impl Hub {
    /// Create a new hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration
    pub fn with_config(config: HubConfig) -> Self {
        Self {
            state: RwLock::new(HubState {
                active: false,
                started_at: None,
                connections: ConnectionRegistry::new(),
                rooms: RoomIndex::new(),
                history: HistoryBuffer::new(config.history_capacity),
            }),
            config,
            metrics: HubMetrics::new(),
            next_connection_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Activate the hub
    ///
    /// Returns `false` if it was already active.
    pub async fn start(&self) -> bool {
        let mut state = self.state.write().await;
        if state.active {
            return false;
        }

        state.active = true;
        state.started_at = Some(Instant::now());

        tracing::info!(
            connections = state.connections.count(),
            history_capacity = self.config.history_capacity,
            "Hub started"
        );
        true
    }

    /// Deactivate the hub
    ///
    /// Existing connections stay registered. Once this returns, new
    /// broadcasts and registrations fail with [`HubError::HubInactive`];
    /// broadcasts already past admission finish normally.
    /// Returns `false` if it was already stopped.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.write().await;
        if !state.active {
            return false;
        }

        state.active = false;
        state.started_at = None;

        tracing::info!(
            connections = state.connections.count(),
            rooms = state.rooms.room_count(),
            "Hub stopped"
        );
        true
    }

    /// Check if the hub is active
    pub async fn is_active(&self) -> bool {
        self.state.read().await.active
    }

    /// Aggregate status
    pub async fn status(&self) -> HubStatus {
        let state = self.state.read().await;
        HubStatus {
            active: state.active,
            connection_count: state.connections.count(),
            room_count: state.rooms.room_count(),
            messages_recorded: state.history.total_appended(),
        }
    }

    /// Lifetime counters
    pub async fn stats(&self) -> HubStats {
        let uptime = self
            .state
            .read()
            .await
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        self.metrics.snapshot(uptime)
    }

    // ------------------------------------------------------------------
    // Connection registry
    // ------------------------------------------------------------------

    /// Register a connection with its send capability
    pub async fn register(&self, sink: Arc<dyn MessageSink>) -> Result<ConnectionId, HubError> {
        let mut state = self.state.write().await;

        if !state.active {
            self.metrics.record_rejected();
            return Err(HubError::HubInactive);
        }

        let limit = self.config.max_connections;
        if limit > 0 && state.connections.count() >= limit {
            self.metrics.record_rejected();
            tracing::warn!(limit = limit, "Connection rejected: limit reached");
            return Err(HubError::ConnectionLimitReached { limit });
        }

        let id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        state.connections.insert(id, sink);
        self.metrics.record_connection();

        tracing::debug!(
            connection_id = %id,
            connections = state.connections.count(),
            "Connection registered"
        );

        Ok(id)
    }

    /// Register a connection backed by a bounded channel
    ///
    /// Returns the id and the mailbox the transport should drain.
    pub async fn register_channel(&self) -> Result<(ConnectionId, Mailbox), HubError> {
        let (sink, mailbox) = ChannelSink::channel(self.config.mailbox_capacity);
        let id = self.register(Arc::new(sink)).await?;
        Ok((id, mailbox))
    }

    /// Unregister a connection and remove it from every room
    ///
    /// Idempotent. Allowed while the hub is stopped. Returns `false` if the
    /// connection was not registered.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        self.state.write().await.remove_connection(id)
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.count()
    }

    /// Check if a connection is registered
    pub async fn is_registered(&self, id: ConnectionId) -> bool {
        self.state.read().await.connections.contains(id)
    }

    /// Snapshot of a live connection
    pub async fn connection_info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let state = self.state.read().await;
        state.connections.get(id).map(|entry| ConnectionInfo {
            id,
            connected_at: entry.connected_at,
            rooms: state.rooms.rooms_of(id),
        })
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    /// Validate a room name against the configured length limit
    pub fn room_name(&self, name: &str) -> Result<RoomName, HubError> {
        RoomName::with_limit(name, self.config.max_room_name_len)
    }

    /// Add a connection to a room
    ///
    /// Idempotent. Returns `Ok(false)` if the connection was already a member
    /// or is not registered; unregistered ids never create rooms.
    pub async fn join(&self, room: &str, id: ConnectionId) -> Result<bool, HubError> {
        let room = self.room_name(room)?;
        let mut state = self.state.write().await;

        Ok(state.join_room(room, id))
    }

    /// Add a connection to a room and return up to `limit` recent messages
    /// addressed to it
    ///
    /// The membership change and the history snapshot happen under one lock,
    /// so a replayed message is never also delivered live to this connection.
    pub async fn join_with_replay(
        &self,
        room: &str,
        id: ConnectionId,
        limit: usize,
    ) -> Result<(bool, Vec<Arc<Message>>), HubError> {
        let room = self.room_name(room)?;
        let mut state = self.state.write().await;

        let replay = if state.connections.contains(id) {
            state.history.recent_in_room(&room, limit)
        } else {
            Vec::new()
        };
        let joined = state.join_room(room, id);

        Ok((joined, replay))
    }

    /// Remove a connection from a room
    ///
    /// Idempotent. Returns `false` if the connection was not a member.
    pub async fn leave(&self, room: &str, id: ConnectionId) -> bool {
        let Ok(room) = self.room_name(room) else {
            return false;
        };

        let mut state = self.state.write().await;
        let left = state.rooms.leave(&room, id);
        if left {
            tracing::debug!(
                connection_id = %id,
                room = %room,
                room_exists = state.rooms.contains_room(&room),
                "Left room"
            );
        }
        left
    }

    /// Members of a room; unknown or invalid rooms have no members
    pub async fn members_of(&self, room: &str) -> BTreeSet<ConnectionId> {
        let Ok(room) = self.room_name(room) else {
            return BTreeSet::new();
        };
        self.state.read().await.live_members(&room)
    }

    /// Rooms with at least one member, in name order
    pub async fn rooms(&self) -> Vec<RoomName> {
        self.state.read().await.rooms.rooms()
    }

    /// Rooms a connection belongs to
    pub async fn rooms_of(&self, id: ConnectionId) -> Vec<RoomName> {
        self.state.read().await.rooms.rooms_of(id)
    }

    /// Number of rooms
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.room_count()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// The most recent `limit` broadcasts, oldest first
    pub async fn recent(&self, limit: usize) -> Vec<Arc<Message>> {
        self.state.read().await.history.recent(limit)
    }

    /// The most recent `limit` broadcasts addressed to a room, oldest first
    pub async fn recent_in_room(&self, room: &str, limit: usize) -> Vec<Arc<Message>> {
        let Ok(room) = self.room_name(room) else {
            return Vec::new();
        };
        self.state.read().await.history.recent_in_room(&room, limit)
    }

    // ------------------------------------------------------------------
    // Broadcast
    // ------------------------------------------------------------------

    /// Broadcast a payload to a room, or to every connection when
    /// `target_room` is `None`
    ///
    /// Connections whose delivery fails are unregistered and listed in the
    /// report. The message is recorded to history once, after every delivery
    /// attempt has finished. Fails only if the hub is stopped or the room
    /// name is invalid; a stopped hub reports `HubInactive` first.
    pub async fn broadcast(
        &self,
        payload: Value,
        target_room: Option<&str>,
    ) -> Result<DeliveryReport, HubError> {
        let (room, message, targets, stale) = {
            let state = self.state.read().await;

            if !state.active {
                self.metrics.record_rejected();
                return Err(HubError::HubInactive);
            }

            let room = target_room.map(|name| self.room_name(name)).transpose()?;

            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            let message = Arc::new(Message::new(sequence, payload, room.clone(), Utc::now()));

            let mut stale = Vec::new();
            let targets: Vec<Target> = match &room {
                Some(room) => state
                    .rooms
                    .members_of(room)
                    .into_iter()
                    .filter_map(|id| match state.connections.sink(id) {
                        Some(sink) => Some((id, sink)),
                        None => {
                            stale.push(id);
                            None
                        }
                    })
                    .collect(),
                None => state.connections.sinks(),
            };

            (room, message, targets, stale)
        };

        let attempted = targets.len();
        let outcomes = self.deliver_all(&message, targets).await;

        let mut report = DeliveryReport {
            attempted,
            ..DeliveryReport::default()
        };

        let mut state = self.state.write().await;

        if let Some(room) = &room {
            for id in stale {
                state.rooms.leave(room, id);
            }
        }

        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %id,
                        sequence = message.sequence,
                        error = %e,
                        "Delivery failed, pruning connection"
                    );
                    state.remove_connection(id);
                    report.pruned.push(id);
                }
            }
        }
        report.pruned.sort();

        state.history.append(Arc::clone(&message));
        drop(state);

        self.metrics
            .record_broadcast(report.delivered, report.pruned.len());

        tracing::debug!(
            sequence = message.sequence,
            room = ?message.target_room.as_ref().map(RoomName::as_str),
            attempted = report.attempted,
            delivered = report.delivered,
            pruned = report.pruned.len(),
            "Broadcast complete"
        );

        Ok(report)
    }

    /// Deliver a message to every target concurrently
    ///
    /// Each delivery is its own task so a slow connection only costs its own
    /// timeout. A task that panics is reported as a rejected delivery.
    async fn deliver_all(
        &self,
        message: &Arc<Message>,
        targets: Vec<Target>,
    ) -> Vec<(ConnectionId, Result<(), DeliveryError>)> {
        let timeout = self.config.delivery_timeout;
        let mut deliveries = JoinSet::new();
        let mut task_owners = HashMap::with_capacity(targets.len());

        for (id, sink) in targets {
            let message = Arc::clone(message);
            let handle = deliveries.spawn(async move {
                match tokio::time::timeout(timeout, sink.deliver(message)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(DeliveryError::TimedOut(timeout)),
                }
            });
            task_owners.insert(handle.id(), id);
        }

        let mut outcomes = Vec::with_capacity(deliveries.len());
        while let Some(joined) = deliveries.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, outcome)) => (task_id, outcome),
                Err(e) => {
                    tracing::error!(error = %e, "Delivery task failed");
                    (
                        e.id(),
                        Err(DeliveryError::Rejected("sink panicked".to_string())),
                    )
                }
            };
            if let Some(id) = task_owners.remove(&task_id) {
                outcomes.push((id, outcome));
            }
        }

        outcomes
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

//! Connection registry and room-based broadcast hub
//!
//! The hub tracks live connections, groups them into rooms and fans messages
//! out to a room or to every connection. A connection whose delivery fails is
//! pruned on the spot instead of waiting for the transport to report the
//! disconnect.
//!
//! # Architecture
//!
//! ```text
//!                              Arc<Hub>
//!                  ┌──────────────────────────────┐
//!                  │ RwLock<HubState> {           │
//!                  │   connections: id -> sink,   │
//!                  │   rooms: name -> {id},       │
//!                  │   history: VecDeque<Arc<M>>, │
//!                  │ }                            │
//!                  └───────────────┬──────────────┘
//!                                  │ broadcast()
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//!   [deliver task]           [deliver task]           [deliver task]
//!   sink.deliver()           sink.deliver()           sink.deliver()
//!   (timeout)                (timeout)                (timeout)
//!         │                        │                        │
//!         └──────► write lock: prune failures, append history
//! ```
//!
//! State is only mutated under the write lock; deliveries run without any
//! lock held, so a slow connection never blocks registry or room operations.

pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod message;
pub mod room;
pub mod sink;
pub mod store;

pub use config::HubConfig;
pub use connection::{ConnectionId, ConnectionInfo, ConnectionRegistry};
pub use error::{DeliveryError, HubError};
pub use history::HistoryBuffer;
pub use message::{DeliveryReport, Message};
pub use room::{RoomIndex, RoomName};
pub use sink::{ChannelSink, Mailbox, MessageSink};
pub use store::Hub;

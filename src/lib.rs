//! Connection registry and room-based broadcast hub
//!
//! `nexus-hub` tracks live bidirectional connections, groups them into named
//! rooms and fans messages out to a room or to every connection. Delivery
//! failures are isolated per connection: a connection whose send fails is
//! pruned from the hub while the rest of the broadcast proceeds.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nexus_hub::{Hub, HubServer, ServerConfig};
//! use serde_json::json;
//!
//! # async fn example() -> nexus_hub::error::Result<()> {
//! let hub = Arc::new(Hub::new());
//! hub.start().await;
//!
//! let (id, mut mailbox) = hub.register_channel().await?;
//! hub.join("ops", id).await?;
//!
//! let report = hub.broadcast(json!({"text": "hi"}), Some("ops")).await?;
//! assert_eq!(report.delivered, 1);
//! assert!(mailbox.recv().await.is_some());
//!
//! let server = HubServer::new(ServerConfig::default(), Arc::clone(&hub));
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod hub;
pub mod server;
pub mod stats;

pub use hub::{
    ConnectionId, DeliveryReport, Hub, HubConfig, HubError, Mailbox, Message, MessageSink,
    RoomName,
};
pub use server::{HubServer, ServerConfig};
pub use stats::{HubStats, HubStatus};

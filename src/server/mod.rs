//! TCP transport for the hub
//!
//! Exposes a [`Hub`](crate::hub::Hub) over newline-delimited JSON. Each
//! accepted socket becomes a hub connection for as long as it stays open.

pub mod config;
pub mod listener;
pub mod protocol;
mod session;

pub use config::ServerConfig;
pub use listener::HubServer;
pub use protocol::{ClientFrame, ServerFrame, WireMessage};

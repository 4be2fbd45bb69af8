//! Hub error types
//!
//! Error types for hub operations and per-connection delivery.

use std::time::Duration;

use thiserror::Error;

/// Error type for hub operations
///
/// Only hub-level state errors are surfaced to callers. Per-connection
/// delivery failures never fail a broadcast; see [`DeliveryError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The hub is stopped and does not accept broadcasts or registrations
    #[error("Hub is not active")]
    HubInactive,

    /// The configured connection limit has been reached
    #[error("Connection limit reached ({limit})")]
    ConnectionLimitReached { limit: usize },

    /// A room name failed validation
    #[error("Invalid room name {name:?}: {reason}")]
    InvalidRoomName { name: String, reason: &'static str },
}

/// Failure delivering a message to a single connection
///
/// Contained inside the broadcast engine: the failing connection is pruned
/// and reported in `DeliveryReport::pruned`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiving side of the connection is gone
    #[error("Connection closed")]
    Closed,

    /// The connection did not accept the message in time
    #[error("Delivery timed out after {0:?}")]
    TimedOut(Duration),

    /// The sink refused the message
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_error_display() {
        assert_eq!(HubError::HubInactive.to_string(), "Hub is not active");
        assert_eq!(
            HubError::ConnectionLimitReached { limit: 3 }.to_string(),
            "Connection limit reached (3)"
        );
        assert_eq!(
            HubError::InvalidRoomName {
                name: String::new(),
                reason: "empty",
            }
            .to_string(),
            "Invalid room name \"\": empty"
        );
    }

    #[test]
    fn test_delivery_error_display() {
        assert_eq!(DeliveryError::Closed.to_string(), "Connection closed");
        assert_eq!(
            DeliveryError::TimedOut(Duration::from_millis(250)).to_string(),
            "Delivery timed out after 250ms"
        );
        assert_eq!(
            DeliveryError::Rejected("broken pipe".into()).to_string(),
            "Delivery rejected: broken pipe"
        );
    }
}

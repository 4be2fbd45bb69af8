//! Per-connection send capability
//!
//! The hub never touches a transport directly. Each registered connection
//! brings a [`MessageSink`]; the broadcast engine calls it once per message
//! under the configured delivery timeout.
//!
//! [`ChannelSink`] is the default sink: a bounded `mpsc` queue whose receiving
//! side ([`Mailbox`]) is drained by the transport. A full queue suspends the
//! delivery until space frees up or the timeout fires.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::DeliveryError;
use super::message::Message;

/// Send capability for one connection
#[async_trait]
pub trait MessageSink: Send + Sync + 'static {
    /// Deliver a message to the connection
    ///
    /// An error means the connection is unusable; the hub prunes it.
    async fn deliver(&self, message: Arc<Message>) -> Result<(), DeliveryError>;
}

/// Sink backed by a bounded `mpsc` channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<Message>>,
}

impl ChannelSink {
    /// Create a sink and its mailbox
    pub fn channel(capacity: usize) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, Mailbox { rx })
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn deliver(&self, message: Arc<Message>) -> Result<(), DeliveryError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}

/// Receiving side of a [`ChannelSink`]
///
/// `recv` returns `None` once the connection has been unregistered or pruned
/// and every queued message has been drained.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Arc<Message>>,
}

impl Mailbox {
    /// Wait for the next message
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.rx.recv().await
    }

    /// Take a queued message without waiting
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        self.rx.try_recv().ok()
    }

    /// Close the mailbox; further deliveries fail with `DeliveryError::Closed`
    pub fn close(&mut self) {
        self.rx.close();
    }
}

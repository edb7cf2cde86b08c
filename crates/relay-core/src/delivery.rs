//! Outbound delivery to connections.
//!
//! The router hands every outbound envelope to a [`Delivery`]. The server
//! uses [`Outboxes`], which queues envelopes on a bounded per-connection
//! channel drained by that connection's task.

use crate::connection::ConnectionId;
use async_trait::async_trait;
use dashmap::DashMap;
use relay_protocol::Envelope;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

/// Default per-connection outbound queue capacity.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Delivery errors. Always local to one recipient.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// No such connection (never registered, or already gone).
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection's outbound queue is full.
    #[error("Outbound queue full: {0}")]
    QueueFull(ConnectionId),

    /// The connection is closing.
    #[error("Connection closed: {0}")]
    Closed(ConnectionId),
}

/// Hands envelopes to individual connections.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Deliver an envelope to one connection.
    async fn deliver(
        &self,
        target: &ConnectionId,
        envelope: Arc<Envelope>,
    ) -> Result<(), DeliveryError>;
}

/// Per-connection outbound queues.
pub struct Outboxes {
    senders: DashMap<ConnectionId, mpsc::Sender<Arc<Envelope>>>,
    capacity: usize,
}

impl Outboxes {
    /// Create outboxes with the default queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOX_CAPACITY)
    }

    /// Create outboxes with a specific queue capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open an outbox for a connection.
    ///
    /// Returns the receiving end, to be drained by the connection's task.
    pub fn open(&self, connection_id: ConnectionId) -> mpsc::Receiver<Arc<Envelope>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        debug!(connection = %connection_id, "Opened outbox");
        self.senders.insert(connection_id, tx);
        rx
    }

    /// Close a connection's outbox.
    ///
    /// Returns `true` if an outbox was open.
    pub fn close(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.senders.remove(connection_id).is_some();
        if removed {
            debug!(connection = %connection_id, "Closed outbox");
        }
        removed
    }

    /// Number of open outboxes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Check if there are no open outboxes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

}

impl Default for Outboxes {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Delivery for Outboxes {
    async fn deliver(
        &self,
        target: &ConnectionId,
        envelope: Arc<Envelope>,
    ) -> Result<(), DeliveryError> {
        // Clone the sender so the shard lock is released before sending.
        let sender = self
            .senders
            .get(target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DeliveryError::UnknownConnection(target.clone()))?;

        sender.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull(target.clone()),
            TrySendError::Closed(_) => DeliveryError::Closed(target.clone()),
        })?;

        trace!(target = %target, "Queued envelope");
        Ok(())
    }
}

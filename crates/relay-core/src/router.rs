//! Signaling router.
//!
//! The router dispatches decoded signals from a connection: `join` updates
//! the registry, negotiation signals fan out to every other member of the
//! sender's room. Malformed and unknown signals are dropped without
//! affecting the connection.

use crate::connection::ConnectionId;
use crate::delivery::Delivery;
use crate::registry::{JoinOutcome, Registry};
use crate::room::RoomId;
use relay_protocol::{codec, event, Envelope, Signal};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What the router did with a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The sender joined a room.
    Joined {
        room: RoomId,
        outcome: JoinOutcome,
    },
    /// A negotiation signal was fanned out.
    Broadcast {
        event: String,
        delivered: usize,
        failed: usize,
    },
    /// Unknown event, ignored.
    Ignored { event: String },
    /// Malformed frame, dropped.
    Dropped { reason: String },
}

/// The signaling router.
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
    delivery: Arc<dyn Delivery>,
}

impl Router {
    /// Create a router over a registry and a delivery sink.
    #[must_use]
    pub fn new(registry: Arc<Registry>, delivery: Arc<dyn Delivery>) -> Self {
        Self { registry, delivery }
    }

    /// Get the membership registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Decode a raw frame and dispatch it.
    pub async fn handle_frame(&self, connection_id: &ConnectionId, data: &[u8]) -> Dispatch {
        self.dispatch(connection_id, codec::decode(data)).await
    }

    /// Dispatch a decoded signal from `connection_id`.
    pub async fn dispatch(&self, connection_id: &ConnectionId, signal: Signal) -> Dispatch {
        trace!(connection = %connection_id, event = ?signal.event(), "Dispatching");

        match signal {
            Signal::Join { room_id } => {
                let outcome = self.registry.join(connection_id, &room_id);
                Dispatch::Joined {
                    room: room_id,
                    outcome,
                }
            }
            Signal::LocalDescription { description } => {
                let envelope = Envelope::description(event::LOCAL_DESCRIPTION, description);
                self.broadcast(connection_id, envelope).await
            }
            Signal::RemoteDescription { description } => {
                let envelope = Envelope::description(event::REMOTE_DESCRIPTION, description);
                self.broadcast(connection_id, envelope).await
            }
            Signal::IceCandidate { candidate } => {
                let envelope = Envelope::candidate(event::ICE_CANDIDATE, candidate);
                self.broadcast(connection_id, envelope).await
            }
            Signal::IceCandidateReply { candidate } => {
                let envelope = Envelope::candidate(event::ICE_CANDIDATE_REPLY, candidate);
                self.broadcast(connection_id, envelope).await
            }
            Signal::Unknown { event } => {
                debug!(connection = %connection_id, event = %event, "Ignoring unknown event");
                Dispatch::Ignored { event }
            }
            Signal::Malformed { reason } => {
                warn!(connection = %connection_id, reason = %reason, "Dropping malformed message");
                Dispatch::Dropped { reason }
            }
        }
    }

    /// Send an envelope to every other member of the sender's room.
    ///
    /// Delivery is best effort: a failure for one recipient is logged and the
    /// remaining recipients are still served.
    pub async fn broadcast(&self, connection_id: &ConnectionId, envelope: Envelope) -> Dispatch {
        // Snapshot taken under the registry lock; delivery happens outside it.
        let targets = self.registry.broadcast_targets(connection_id);
        let envelope = Arc::new(envelope);

        let mut delivered = 0;
        let mut failed = 0;
        for target in &targets {
            match self.delivery.deliver(target, Arc::clone(&envelope)).await {
                Ok(()) => {
                    trace!(
                        connection = %connection_id,
                        target = %target,
                        event = %envelope.event,
                        "Delivered"
                    );
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        connection = %connection_id,
                        target = %target,
                        error = %e,
                        "Delivery failed"
                    );
                    failed += 1;
                }
            }
        }

        debug!(
            connection = %connection_id,
            event = %envelope.event,
            delivered,
            failed,
            "Broadcast"
        );

        Dispatch::Broadcast {
            event: envelope.event.clone(),
            delivered,
            failed,
        }
    }

    /// Remove a connection whose read loop has ended.
    ///
    /// Safe to call for connections that never joined a room.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> Option<RoomId> {
        let left = self.registry.leave(connection_id);
        debug!(connection = %connection_id, room = ?left, "Disconnected");
        left
    }
}

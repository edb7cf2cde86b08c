//! # relay-core
//!
//! Room membership and signal routing for the signaling relay.
//!
//! This crate provides the building blocks the server wires together:
//!
//! - **Registry** - Which connection is in which room, behind one lock
//! - **Router** - Dispatches decoded signals and fans negotiation out to room peers
//! - **Delivery** - Where outbound envelopes go (per-connection outboxes)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│   Router    │────▶│  Delivery   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │  Registry   │
//!                     └─────────────┘
//! ```

pub mod connection;
pub mod delivery;
pub mod registry;
pub mod room;
pub mod router;

pub use connection::ConnectionId;
pub use delivery::{Delivery, DeliveryError, Outboxes};
pub use registry::{JoinOutcome, Registry, RegistryStats};
pub use room::{Room, RoomId};
pub use router::{Dispatch, Router};

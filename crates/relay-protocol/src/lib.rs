//! # relay-protocol
//!
//! Wire protocol definitions for the signaling relay.
//!
//! Every frame is a JSON envelope carrying an event tag and a data object.
//! Inbound frames decode into a typed [`Signal`]; negotiation signals are
//! relayed to room peers as an [`Envelope`] carrying only their contract
//! field.
//!
//! ## Events
//!
//! - `join` - Enter a room (`roomId`)
//! - `localDescription` / `remoteDescription` - Session descriptions (`description`)
//! - `iceCandidate` / `iceCandidateReply` - Connectivity candidates (`candidate`)
//!
//! ## Example
//!
//! ```rust
//! use relay_protocol::{codec, Signal};
//!
//! let signal = codec::decode(br#"{"event":"join","data":{"roomId":"lobby"}}"#);
//! assert_eq!(signal, Signal::Join { room_id: "lobby".into() });
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{event, Envelope, Signal};

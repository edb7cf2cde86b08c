//! Envelope and signal types for the relay protocol.
//!
//! Every frame on the wire is a JSON envelope `{"event": ..., "data": {...}}`.
//! Inbound envelopes are decoded into a typed [`Signal`]; outbound envelopes
//! are built from the negotiation signals being relayed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Event tags understood by the relay.
pub mod event {
    pub const JOIN: &str = "join";
    pub const LOCAL_DESCRIPTION: &str = "localDescription";
    pub const REMOTE_DESCRIPTION: &str = "remoteDescription";
    pub const ICE_CANDIDATE: &str = "iceCandidate";
    pub const ICE_CANDIDATE_REPLY: &str = "iceCandidateReply";
}

/// A frame as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event tag.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Create a relayed session description envelope.
    ///
    /// Only the `description` field is carried over.
    #[must_use]
    pub fn description(event: &str, description: impl Into<String>) -> Self {
        Self::new(event, json!({ "description": description.into() }))
    }

    /// Create a relayed connectivity candidate envelope.
    ///
    /// Only the `candidate` field is carried over.
    #[must_use]
    pub fn candidate(event: &str, candidate: impl Into<String>) -> Self {
        Self::new(event, json!({ "candidate": candidate.into() }))
    }
}

/// `data` of a `join` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    pub room_id: String,
}

/// `data` of a session description event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionData {
    pub description: String,
}

/// `data` of a connectivity candidate event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateData {
    pub candidate: String,
}

/// A decoded inbound signal.
///
/// Decoding never fails outright: unrecognised events become
/// [`Signal::Unknown`] and anything that cannot be read becomes
/// [`Signal::Malformed`], so the caller decides what to do with both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Join a room.
    Join { room_id: String },
    /// Local session description.
    LocalDescription { description: String },
    /// Remote session description.
    RemoteDescription { description: String },
    /// Connectivity candidate.
    IceCandidate { candidate: String },
    /// Reply carrying a connectivity candidate.
    IceCandidateReply { candidate: String },
    /// Well-formed envelope with an event tag the relay does not know.
    Unknown { event: String },
    /// Frame that could not be decoded.
    Malformed { reason: String },
}

impl Signal {
    /// Decode a signal from a parsed JSON value.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::malformed("frame is not a JSON object");
        };

        let tag = match object.remove("event") {
            Some(Value::String(tag)) => tag,
            Some(_) => return Self::malformed("`event` is not a string"),
            None => return Self::malformed("missing `event`"),
        };

        let data = object.remove("data");

        match tag.as_str() {
            event::JOIN => decode_data::<JoinData>(&tag, data)
                .map_or_else(Self::from_reason, |d| Signal::Join { room_id: d.room_id }),
            event::LOCAL_DESCRIPTION => decode_data::<DescriptionData>(&tag, data)
                .map_or_else(Self::from_reason, |d| Signal::LocalDescription {
                    description: d.description,
                }),
            event::REMOTE_DESCRIPTION => decode_data::<DescriptionData>(&tag, data)
                .map_or_else(Self::from_reason, |d| Signal::RemoteDescription {
                    description: d.description,
                }),
            event::ICE_CANDIDATE => decode_data::<CandidateData>(&tag, data)
                .map_or_else(Self::from_reason, |d| Signal::IceCandidate {
                    candidate: d.candidate,
                }),
            event::ICE_CANDIDATE_REPLY => decode_data::<CandidateData>(&tag, data)
                .map_or_else(Self::from_reason, |d| Signal::IceCandidateReply {
                    candidate: d.candidate,
                }),
            _ => Signal::Unknown { event: tag },
        }
    }

    /// Get the event tag this signal was decoded from, if any.
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        match self {
            Signal::Join { .. } => Some(event::JOIN),
            Signal::LocalDescription { .. } => Some(event::LOCAL_DESCRIPTION),
            Signal::RemoteDescription { .. } => Some(event::REMOTE_DESCRIPTION),
            Signal::IceCandidate { .. } => Some(event::ICE_CANDIDATE),
            Signal::IceCandidateReply { .. } => Some(event::ICE_CANDIDATE_REPLY),
            Signal::Unknown { event } => Some(event.as_str()),
            Signal::Malformed { .. } => None,
        }
    }

    /// Create a malformed signal.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Signal::Malformed {
            reason: reason.into(),
        }
    }

    fn from_reason(reason: String) -> Self {
        Signal::Malformed { reason }
    }
}

fn decode_data<T: serde::de::DeserializeOwned>(
    event: &str,
    data: Option<Value>,
) -> Result<T, String> {
    let data = data.ok_or_else(|| format!("`{event}` is missing `data`"))?;
    serde_json::from_value(data).map_err(|e| format!("invalid `{event}` data: {e}"))
}

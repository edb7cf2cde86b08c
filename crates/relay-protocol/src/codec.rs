//! Codec for encoding and decoding relay frames.
//!
//! Frames are JSON text. Decoding is total: anything that cannot be read
//! yields [`Signal::Malformed`] instead of an error.

use thiserror::Error;

use crate::frames::{Envelope, Signal};

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode an envelope to a JSON text frame.
///
/// # Errors
///
/// Returns an error if encoding fails or the frame is too large.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(envelope)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Parse a raw frame into JSON without interpreting it.
///
/// # Errors
///
/// Returns an error if the frame is too large or is not valid JSON.
pub fn parse(data: &[u8]) -> Result<serde_json::Value, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    Ok(serde_json::from_slice(data)?)
}

/// Decode a raw frame into a signal.
#[must_use]
pub fn decode(data: &[u8]) -> Signal {
    match parse(data) {
        Ok(value) => Signal::from_value(value),
        Err(e) => Signal::malformed(e.to_string()),
    }
}

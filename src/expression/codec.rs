//! Data-channel wire format for [`ExpressionFrame`]: UTF-8 JSON, no envelope.

use super::frame::ExpressionFrame;
use crate::error::{Error, Result};

/// Serializes a frame to its wire text.
pub fn encode(frame: &ExpressionFrame) -> Result<String> {
    serde_json::to_string(frame).map_err(|e| Error::MalformedFrame(e.to_string()))
}

/// Parses wire text (or raw bytes) into a frame.
///
/// Fails with [`Error::MalformedFrame`] on non-JSON input or a missing
/// `headMovement`. Unknown keys survive; intensities are not clamped.
pub fn decode(input: impl AsRef<[u8]>) -> Result<ExpressionFrame> {
    serde_json::from_slice(input.as_ref()).map_err(|e| Error::MalformedFrame(e.to_string()))
}

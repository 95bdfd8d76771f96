//! Push-channel message types and parser.
//!
//! The backend sends JSON text frames of the shape
//! `{"type": "job_update", "job_id": ..., "status": ..., ...}`. Only
//! `job_update` is acted upon; any other `type` is ignored.

use codeflow_core::{JobPatch, UpdateEvent};
use serde::Deserialize;

use crate::error::ParseError;

/// All push messages, tagged by `"type"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    #[serde(rename = "job_update")]
    JobUpdate(UpdateEvent),

    /// Any message type this client does not handle.
    #[serde(other)]
    Unknown,
}

/// Parse a push text frame.
///
/// Returns `Err` for malformed JSON, a missing `type`, or a `job_update`
/// whose payload is not a valid [`UpdateEvent`]. Callers log and drop.
pub fn parse_message(text: &str) -> Result<PushMessage, ParseError> {
    let message: PushMessage = serde_json::from_str(text)?;
    if let PushMessage::JobUpdate(event) = &message {
        JobPatch::from(event.clone()).validate()?;
    }
    Ok(message)
}

//! Error taxonomy of the synchronization layer.
//!
//! None of these are fatal: transport failures surface as recoverable
//! notices, stream failures feed the reconnect loop, and parse failures
//! are logged and dropped.

use codeflow_core::PatchError;
use tokio_tungstenite::tungstenite;

/// A snapshot fetch failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The jobs API returned a non-2xx status code.
    #[error("Jobs API error ({status}): {body}")]
    Status {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl TransportError {
    /// HTTP-equivalent status of the failure, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Request(e) => e.status().map(|s| s.as_u16()),
            TransportError::Status { status, .. } => Some(*status),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// The push connection could not be established or was lost.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("WebSocket receive error: {0}")]
    Receive(#[from] tungstenite::Error),

    #[error("Push stream closed: {0}")]
    Closed(String),
}

/// An inbound push frame is not a valid update.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed push frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid job update: {0}")]
    Invalid(#[from] PatchError),
}

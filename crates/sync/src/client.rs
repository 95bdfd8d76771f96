//! WebSocket client for the job-update push channel.
//!
//! [`PushClient`] holds the endpoint of the backend's event stream.
//! The subscriber only depends on the [`StreamConnector`] trait, which
//! yields a stream of raw frames per connection.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::StreamError;

/// Frames received over one live connection. Dropping it closes the
/// connection.
pub type FrameStream = BoxStream<'static, Result<Message, tungstenite::Error>>;

/// Opens connections to the push channel.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Endpoint description for logging.
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> Result<FrameStream, StreamError>;
}

/// Connector for the backend's WebSocket endpoint.
pub struct PushClient {
    ws_url: String,
}

impl PushClient {
    /// * `ws_url` - full WebSocket URL, e.g. `ws://host:8081/ws`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }
}

#[async_trait]
impl StreamConnector for PushClient {
    fn endpoint(&self) -> &str {
        &self.ws_url
    }

    async fn connect(&self) -> Result<FrameStream, StreamError> {
        let (ws_stream, _response) = connect_async(self.ws_url.as_str()).await.map_err(|e| {
            StreamError::Connect(format!("Failed to connect to {}: {e}", self.ws_url))
        })?;

        tracing::debug!(url = %self.ws_url, "WebSocket handshake complete");
        Ok(ws_stream.boxed())
    }
}

//! Push subscriber: one live connection, parsed updates, reconnects.
//!
//! [`run`] drives the connection state machine
//! `disconnected -> connecting -> connected -> disconnected -> ...`
//! until its [`CancellationToken`] fires. Every transition and every
//! valid `job_update` is reported to the reconciler as a
//! [`SubscriberEvent`], in arrival order, over one channel.
//!
//! A (re)connection does not request a resync by itself; the reconciler
//! does that when it sees [`ConnectionState::Connected`].

use std::sync::Arc;

use codeflow_core::UpdateEvent;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{FrameStream, StreamConnector};
use crate::error::StreamError;
use crate::messages::{parse_message, PushMessage};
use crate::reconnect::{Backoff, ReconnectConfig};

/// Push connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the subscriber reports to the reconciler.
#[derive(Debug, Clone)]
pub enum SubscriberEvent {
    State(ConnectionState),
    Update(UpdateEvent),
}

/// Why a frame-processing session ended without a stream error.
enum SessionEnd {
    Cancelled,
    ReceiverGone,
}

/// Run the subscriber until `cancel` fires or `events` is closed.
pub async fn run(
    connector: Arc<dyn StreamConnector>,
    config: ReconnectConfig,
    events: mpsc::Sender<SubscriberEvent>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(config);

    loop {
        let attempt = backoff.failures() + 1;
        if !emit(&events, SubscriberEvent::State(ConnectionState::Connecting)).await {
            return;
        }
        tracing::info!(endpoint = connector.endpoint(), attempt, "Connecting to push channel");

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connector.connect() => result,
        };

        match connected {
            Ok(stream) => {
                tracing::info!(endpoint = connector.endpoint(), attempt, "Push channel connected");
                backoff.reset();
                if !emit(&events, SubscriberEvent::State(ConnectionState::Connected)).await {
                    return;
                }

                let ended = process_frames(stream, &events, &cancel).await;
                if !emit(&events, SubscriberEvent::State(ConnectionState::Disconnected)).await {
                    return;
                }
                match ended {
                    Ok(SessionEnd::Cancelled) | Ok(SessionEnd::ReceiverGone) => return,
                    Err(e) => {
                        tracing::warn!(error = %e, "Push channel lost, reconnecting");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Push connection attempt failed");
                if !emit(&events, SubscriberEvent::State(ConnectionState::Disconnected)).await {
                    return;
                }
            }
        }

        let wait = backoff.next_wait();
        tracing::debug!(delay_ms = wait.as_millis() as u64, "Waiting before reconnect");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    tracing::info!("Push subscriber cancelled");
    let _ = events
        .send(SubscriberEvent::State(ConnectionState::Disconnected))
        .await;
}

/// Read frames until the stream ends, errors, or is cancelled.
async fn process_frames(
    mut stream: FrameStream,
    events: &mpsc::Sender<SubscriberEvent>,
    cancel: &CancellationToken,
) -> Result<SessionEnd, StreamError> {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if let Some(event) = handle_text(&text) {
                    if !emit(events, SubscriberEvent::Update(event)).await {
                        return Ok(SessionEnd::ReceiverGone);
                    }
                }
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!("Ignoring binary push frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| format!("{} {}", f.code, f.reason))
                    .unwrap_or_else(|| "no close frame".to_string());
                return Err(StreamError::Closed(reason));
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => return Err(StreamError::Receive(e)),
            None => return Err(StreamError::Closed("stream exhausted".to_string())),
        }
    }
}

/// Parse one text frame. Malformed frames are logged and dropped.
fn handle_text(text: &str) -> Option<UpdateEvent> {
    match parse_message(text) {
        Ok(PushMessage::JobUpdate(event)) => {
            tracing::debug!(
                job_id = %event.job_id,
                status = %event.status,
                processed = event.processed_functions,
                total = event.total_functions,
                "Push update received",
            );
            Some(event)
        }
        Ok(PushMessage::Unknown) => {
            tracing::debug!(raw_message = %text, "Ignoring push message of unknown type");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Dropping malformed push frame");
            None
        }
    }
}

/// Send to the reconciler; `false` once it has gone away.
async fn emit(events: &mpsc::Sender<SubscriberEvent>, event: SubscriberEvent) -> bool {
    events.send(event).await.is_ok()
}

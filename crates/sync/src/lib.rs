//! Job-status synchronization for the codeflow dashboard.
//!
//! Merges two unreliable update sources into the canonical
//! [`JobStore`](codeflow_core::JobStore):
//!
//! - [`api`] -- snapshot fetcher over the jobs REST endpoints.
//! - [`client`] / [`subscriber`] -- the push channel: one WebSocket
//!   connection with reconnect backoff ([`reconnect`]).
//! - [`poller`] -- per-job fallback timers.
//! - [`reconciler`] -- decides per job whether push or poll is
//!   authoritative and is the only writer of the store.
//! - [`session`] -- the handle a dashboard view holds.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod messages;
pub mod poller;
pub mod reconciler;
pub mod reconnect;
pub mod session;
pub mod subscriber;

pub use api::{JobsApi, SnapshotSource};
pub use client::{PushClient, StreamConnector};
pub use config::{ResumePolicy, SyncConfig};
pub use error::{ParseError, StreamError, TransportError};
pub use events::SyncNotice;
pub use reconciler::SyncMode;
pub use session::DashboardSession;
pub use subscriber::{ConnectionState, SubscriberEvent};

//! Notices emitted by the reconciler for the view layer.
//!
//! Job state changes travel on the store's own channel
//! ([`JobChange`](codeflow_core::JobChange)); these cover everything else
//! a dashboard may want to show.

use codeflow_core::types::JobId;
use serde::Serialize;

use crate::subscriber::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncNotice {
    /// The push connection changed state.
    ConnectionChanged { state: ConnectionState },

    /// The job list could not be fetched; a retry is scheduled.
    ListUnavailable { error: String },

    /// A list fetch succeeded after an earlier failure.
    ListRecovered,

    /// The backend does not know this job.
    JobNotFound { job_id: JobId },

    /// Push-confirmed jobs went back to polling after a long outage.
    PollingResumed { jobs: usize },
}

//! Update inputs for the job store.
//!
//! Every source of job knowledge (push events, list summaries, detail
//! snapshots, local seeding after submission) is normalised into a
//! [`JobPatch`] before it reaches [`JobStore::upsert`](crate::store::JobStore::upsert).

use serde::{Deserialize, Serialize};

use crate::error::PatchError;
use crate::job::{FunctionResult, JobStatus};
use crate::snapshot::{JobDetail, JobSummary};
use crate::types::{JobId, Timestamp};

/// Progress notification delivered over the push channel.
///
/// Carries counters only; function results and error messages are
/// fetched through a detail snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    #[serde(alias = "jobId")]
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default, alias = "totalFunctions")]
    pub total_functions: u32,
    #[serde(default, alias = "processedFunctions")]
    pub processed_functions: u32,
    #[serde(alias = "updatedAt", with = "crate::timestamp::required")]
    pub updated_at: Timestamp,
}

/// Where a patch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOrigin {
    Push,
    Summary,
    Detail,
    Local,
}

/// Fields only a detail snapshot can supply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatchDetail {
    pub functions: Vec<FunctionResult>,
    pub error_message: Option<String>,
    pub source: Option<String>,
}

/// A partial or full job state to be merged into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPatch {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub total_functions: u32,
    pub processed_functions: u32,
    /// `Some` only for [`PatchOrigin::Detail`].
    pub detail: Option<PatchDetail>,
    pub origin: PatchOrigin,
}

impl JobPatch {
    /// Seed for a job this client just created.
    pub fn seed(id: impl Into<JobId>, status: JobStatus, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            status,
            created_at: Some(created_at),
            updated_at: None,
            total_functions: 0,
            processed_functions: 0,
            detail: None,
            origin: PatchOrigin::Local,
        }
    }

    pub fn validate(&self) -> Result<(), PatchError> {
        if self.id.is_empty() {
            return Err(PatchError::EmptyId);
        }
        if self.total_functions > 0 && self.processed_functions > self.total_functions {
            return Err(PatchError::ProgressOverflow {
                id: self.id.clone(),
                processed: self.processed_functions,
                total: self.total_functions,
            });
        }
        if let Some(detail) = &self.detail {
            if detail.functions.iter().any(|f| f.name.is_empty()) {
                return Err(PatchError::UnnamedFunction(self.id.clone()));
            }
        }
        Ok(())
    }
}

impl From<UpdateEvent> for JobPatch {
    fn from(event: UpdateEvent) -> Self {
        Self {
            id: event.job_id,
            status: event.status,
            created_at: None,
            updated_at: Some(event.updated_at),
            total_functions: event.total_functions,
            processed_functions: event.processed_functions,
            detail: None,
            origin: PatchOrigin::Push,
        }
    }
}

impl From<JobSummary> for JobPatch {
    fn from(summary: JobSummary) -> Self {
        Self {
            id: summary.id,
            status: summary.status,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
            total_functions: summary.total_functions,
            processed_functions: summary.processed_functions,
            detail: None,
            origin: PatchOrigin::Summary,
        }
    }
}

impl From<JobDetail> for JobPatch {
    fn from(detail: JobDetail) -> Self {
        Self {
            id: detail.id,
            status: detail.status,
            created_at: detail.created_at,
            updated_at: detail.updated_at,
            total_functions: detail.total_functions,
            processed_functions: detail.processed_functions,
            detail: Some(PatchDetail {
                functions: detail.functions,
                error_message: detail.error_message,
                source: detail.code,
            }),
            origin: PatchOrigin::Detail,
        }
    }
}

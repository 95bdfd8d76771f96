//! The client-side view of one analysis job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Lifecycle status of an analysis job.
///
/// `queued -> in_progress -> success | failed`, or `queued -> failed`
/// when the backend rejects the job outright. Transitions never go back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    InProgress,
    Success,
    Failed,
}

impl JobStatus {
    /// Ordering used by the merge policy: `queued < in_progress < {success, failed}`.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::InProgress => 1,
            JobStatus::Success | JobStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "in_progress" => Ok(JobStatus::InProgress),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// One analysed function and the flowchart source produced for it.
///
/// `diagram_source` is never interpreted here; it is handed verbatim to
/// the render collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub name: String,
    #[serde(rename = "mermaid_diagram", alias = "diagramSource", alias = "diagram_source")]
    pub diagram_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

/// Latest known state of a job, as held by the [`JobStore`](crate::store::JobStore).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Unknown when the job was first seen through a push event.
    #[serde(with = "crate::timestamp::optional")]
    pub created_at: Option<Timestamp>,
    /// Unknown until a timestamped update arrives (list summaries carry none).
    #[serde(with = "crate::timestamp::optional")]
    pub updated_at: Option<Timestamp>,
    pub total_functions: u32,
    pub processed_functions: u32,
    /// Only ever set while `status` is `failed`.
    pub error_message: Option<String>,
    /// Only ever populated while `status` is `success`.
    pub functions: Vec<FunctionResult>,
    /// Submitted source payload, when a detail snapshot carried it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Set once a detail snapshot has been merged into a terminal job.
    pub detail_loaded: bool,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Completion percentage (0-100); 0 while the function count is unknown.
    pub fn progress_percent(&self) -> u8 {
        if self.total_functions == 0 {
            return 0;
        }
        let ratio = f64::from(self.processed_functions) / f64::from(self.total_functions);
        (ratio * 100.0).round().min(100.0) as u8
    }
}

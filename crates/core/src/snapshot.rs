//! Wire shapes returned by the jobs REST endpoints.

use serde::Deserialize;

use crate::job::{FunctionResult, JobStatus};
use crate::types::{JobId, Timestamp};

/// One row of `GET /jobs`. Carries progress counters but neither the
/// function results nor an `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default, alias = "createdAt", with = "crate::timestamp::optional")]
    pub created_at: Option<Timestamp>,
    #[serde(default, alias = "updatedAt", with = "crate::timestamp::optional")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, alias = "totalFunctions")]
    pub total_functions: u32,
    #[serde(default, alias = "processedFunctions")]
    pub processed_functions: u32,
}

/// Full job detail from `GET /jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobDetail {
    pub id: JobId,
    /// The submitted source payload.
    #[serde(default)]
    pub code: Option<String>,
    pub status: JobStatus,
    #[serde(default, alias = "createdAt", with = "crate::timestamp::optional")]
    pub created_at: Option<Timestamp>,
    #[serde(default, alias = "updatedAt", with = "crate::timestamp::optional")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, alias = "totalFunctions")]
    pub total_functions: u32,
    #[serde(default, alias = "processedFunctions")]
    pub processed_functions: u32,
    #[serde(default)]
    pub functions: Vec<FunctionResult>,
    #[serde(default, alias = "errorMessage")]
    pub error_message: Option<String>,
}

/// Response of `POST /jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmittedJob {
    #[serde(alias = "jobId")]
    pub job_id: JobId,
    pub status: JobStatus,
}

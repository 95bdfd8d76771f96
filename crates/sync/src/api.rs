//! REST client for the jobs HTTP endpoints.
//!
//! Wraps job creation, listing and detail retrieval using [`reqwest`].
//! The reconciler only sees the [`SnapshotSource`] side of it.

use std::time::Duration;

use async_trait::async_trait;
use codeflow_core::{JobDetail, JobSummary, SubmittedJob};

use crate::error::TransportError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// On-demand snapshots of job state.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Summaries of every job the backend knows (no function results).
    async fn fetch_all(&self) -> Result<Vec<JobSummary>, TransportError>;

    /// Full detail of one job, including function results and error message.
    async fn fetch_one(&self, job_id: &str) -> Result<JobDetail, TransportError>;
}

/// HTTP client for the jobs API.
pub struct JobsApi {
    client: reqwest::Client,
    api_url: String,
}

impl JobsApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base URL including the API prefix, e.g. `http://host:8081/api`.
    /// * `timeout` - Per-request timeout.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a source payload for analysis.
    ///
    /// Sends `POST /jobs` and returns the server-assigned job id with its
    /// initial status.
    pub async fn submit_job(&self, code: &str) -> Result<SubmittedJob, TransportError> {
        let body = serde_json::json!({ "code": code });

        let response = self
            .client
            .post(format!("{}/jobs", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// List all jobs via `GET /jobs`.
    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, TransportError> {
        let response = self
            .client
            .get(format!("{}/jobs", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve one job via `GET /jobs/{job_id}`.
    pub async fn get_job(&self, job_id: &str) -> Result<JobDetail, TransportError> {
        let response = self
            .client
            .get(format!("{}/jobs/{}", self.api_url, job_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Turn a non-2xx response into [`TransportError::Status`] carrying
    /// the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SnapshotSource for JobsApi {
    async fn fetch_all(&self) -> Result<Vec<JobSummary>, TransportError> {
        self.list_jobs().await
    }

    async fn fetch_one(&self, job_id: &str) -> Result<JobDetail, TransportError> {
        self.get_job(job_id).await
    }
}

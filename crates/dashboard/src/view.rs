//! Plain-text rendering of jobs and notices for the terminal.

use codeflow_core::{FunctionRender, Job, JobStatus};
use codeflow_sync::{ConnectionState, SyncNotice};

/// One status line per job, e.g. `j1  in_progress  1/2 (50%)`.
pub fn job_line(job: &Job) -> String {
    let mut line = format!("{:<24} {:<12}", job.id, job.status.as_str());
    if job.total_functions > 0 {
        line.push_str(&format!(
            " {}/{} ({}%)",
            job.processed_functions,
            job.total_functions,
            job.progress_percent()
        ));
    }
    match job.status {
        JobStatus::Failed => {
            if let Some(message) = &job.error_message {
                line.push_str(&format!("  error: {message}"));
            }
        }
        JobStatus::Success if job.detail_loaded => {
            line.push_str(&format!("  {} diagram(s)", job.functions.len()));
        }
        _ => {}
    }
    line
}

pub fn job_table<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> String {
    let lines: Vec<String> = jobs.into_iter().map(job_line).collect();
    if lines.is_empty() {
        return "no jobs yet".to_string();
    }
    lines.join("\n")
}

pub fn notice_line(notice: &SyncNotice) -> String {
    match notice {
        SyncNotice::ConnectionChanged { state } => match state {
            ConnectionState::Connected => "live updates connected".to_string(),
            ConnectionState::Connecting => "connecting to live updates...".to_string(),
            ConnectionState::Disconnected => "live updates disconnected".to_string(),
        },
        SyncNotice::ListUnavailable { error } => format!("jobs list unavailable: {error}"),
        SyncNotice::ListRecovered => "jobs list available again".to_string(),
        SyncNotice::JobNotFound { job_id } => format!("job not found: {job_id}"),
        SyncNotice::PollingResumed { jobs } => {
            format!("live updates down, polling {jobs} job(s)")
        }
    }
}

pub fn render_line(job_id: &str, render: &FunctionRender) -> String {
    match &render.outcome {
        Ok(diagram) => format!("{job_id}/{}: {}", render.name, diagram.artifact),
        Err(e) => format!("{job_id}/{}: {e}", render.name),
    }
}

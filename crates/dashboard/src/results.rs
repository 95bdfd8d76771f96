//! When a job's results should be fetched or rendered.

use codeflow_core::{JobChange, JobStatus};

/// The job showed up already finished, so its results were never pushed
/// and have to be requested.
pub fn needs_results(change: &JobChange) -> bool {
    change.previous.is_none() && change.current.is_terminal() && !change.current.detail_loaded
}

/// Diagrams for a successful job were attached by this change.
pub fn results_arrived(change: &JobChange) -> bool {
    let job = &change.current;
    job.status == JobStatus::Success
        && job.detail_loaded
        && !change.previous.as_ref().is_some_and(|p| p.detail_loaded)
}

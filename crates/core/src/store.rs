//! Canonical job store.
//!
//! [`JobStore`] maps each job id to the latest known [`Job`] and is the
//! only place job state is mutated. Every writer goes through
//! [`JobStore::upsert`], which orders knowledge by `updated_at` rather
//! than by arrival, refuses status regressions, and freezes terminal jobs.
//!
//! Subscribers receive a [`JobChange`] only when an upsert alters
//! observable state, so duplicate or stale deliveries never cause a
//! re-render.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::{Job, JobStatus};
use crate::types::JobId;
use crate::update::{JobPatch, PatchOrigin};

/// Broadcast channel capacity for change notifications.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Result of a single [`JobStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting of this job id.
    Inserted,
    /// The stored job changed.
    Applied,
    /// Accepted, but the stored job already reflected it.
    Unchanged,
    /// Older than what is stored (timestamp or status rank).
    Stale,
    /// The stored job is terminal and no longer accepts updates.
    Frozen,
    /// The patch failed validation.
    Rejected,
}

impl UpsertOutcome {
    pub fn changed(self) -> bool {
        matches!(self, UpsertOutcome::Inserted | UpsertOutcome::Applied)
    }
}

/// Notification emitted after a state-changing upsert.
#[derive(Debug, Clone, Serialize)]
pub struct JobChange {
    /// `None` when the job was just inserted.
    pub previous: Option<Job>,
    pub current: Job,
}

/// In-memory mapping of job id to latest known state.
pub struct JobStore {
    jobs: HashMap<JobId, Job>,
    /// Ids in first-seen order, for stable listing.
    order: Vec<JobId>,
    changes: broadcast::Sender<JobChange>,
}

impl JobStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            jobs: HashMap::new(),
            order: Vec::new(),
            changes,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<JobChange> {
        self.changes.subscribe()
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// All jobs in the order they were first observed.
    pub fn list(&self) -> impl Iterator<Item = &Job> + '_ {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    /// Merge `patch` into the store.
    ///
    /// Stale and frozen patches are discarded silently; they are expected
    /// when two channels deliver the same knowledge.
    pub fn upsert(&mut self, patch: JobPatch) -> UpsertOutcome {
        if let Err(e) = patch.validate() {
            tracing::warn!(job_id = %patch.id, error = %e, "Rejected job update");
            return UpsertOutcome::Rejected;
        }

        let Some(existing) = self.jobs.get(&patch.id) else {
            let job = job_from_patch(patch);
            tracing::debug!(job_id = %job.id, status = %job.status, "Job first observed");
            self.order.push(job.id.clone());
            self.jobs.insert(job.id.clone(), job.clone());
            self.notify(None, job);
            return UpsertOutcome::Inserted;
        };

        let merged = match merge(existing, &patch) {
            Ok(merged) => merged,
            Err(outcome) => {
                tracing::trace!(job_id = %patch.id, ?outcome, origin = ?patch.origin, "Discarded job update");
                return outcome;
            }
        };

        if merged == *existing {
            return UpsertOutcome::Unchanged;
        }

        tracing::debug!(
            job_id = %merged.id,
            status = %merged.status,
            processed = merged.processed_functions,
            total = merged.total_functions,
            origin = ?patch.origin,
            "Job state advanced",
        );
        let previous = self.jobs.insert(merged.id.clone(), merged.clone());
        self.notify(previous, merged);
        UpsertOutcome::Applied
    }

    fn notify(&self, previous: Option<Job>, current: Job) {
        // A send error only means nobody is listening.
        let _ = self.changes.send(JobChange { previous, current });
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn job_from_patch(patch: JobPatch) -> Job {
    let status = patch.status;
    let detail = patch.detail.unwrap_or_default();
    let detail_loaded = patch.origin == PatchOrigin::Detail && status.is_terminal();
    Job {
        id: patch.id,
        status,
        created_at: patch.created_at,
        updated_at: patch.updated_at,
        total_functions: patch.total_functions,
        processed_functions: patch.processed_functions,
        error_message: detail.error_message.filter(|_| status == JobStatus::Failed),
        functions: if status == JobStatus::Success {
            detail.functions
        } else {
            Vec::new()
        },
        source: detail.source,
        detail_loaded,
    }
}

/// Compute the merged state, or the reason the patch is discarded.
fn merge(existing: &Job, patch: &JobPatch) -> Result<Job, UpsertOutcome> {
    if existing.is_terminal() {
        return complete_terminal(existing, patch);
    }

    if patch.status.rank() < existing.status.rank() {
        return Err(UpsertOutcome::Stale);
    }

    match (patch.updated_at, existing.updated_at) {
        (Some(incoming), Some(stored)) if incoming < stored => return Err(UpsertOutcome::Stale),
        (None, _) => {
            let advances = patch.status.rank() > existing.status.rank()
                || patch.processed_functions > existing.processed_functions
                || patch.total_functions > existing.total_functions;
            if !advances && patch.detail.is_none() {
                return Err(UpsertOutcome::Stale);
            }
        }
        _ => {}
    }

    let mut job = existing.clone();
    job.status = patch.status;
    fold_progress(&mut job, patch);

    if let Some(detail) = &patch.detail {
        if detail.source.is_some() {
            job.source.clone_from(&detail.source);
        }
        match job.status {
            JobStatus::Success => job.functions.clone_from(&detail.functions),
            JobStatus::Failed => job.error_message.clone_from(&detail.error_message),
            _ => {}
        }
        job.detail_loaded = job.status.is_terminal();
    }

    Ok(job)
}

/// A terminal job only accepts the detail snapshot that completes it.
fn complete_terminal(existing: &Job, patch: &JobPatch) -> Result<Job, UpsertOutcome> {
    let detail = match &patch.detail {
        Some(detail) if !existing.detail_loaded && patch.status == existing.status => detail,
        _ => return Err(UpsertOutcome::Frozen),
    };

    let mut job = existing.clone();
    match job.status {
        JobStatus::Success => job.functions.clone_from(&detail.functions),
        JobStatus::Failed => job.error_message.clone_from(&detail.error_message),
        _ => {}
    }
    if detail.source.is_some() {
        job.source.clone_from(&detail.source);
    }
    fold_progress(&mut job, patch);
    job.detail_loaded = true;
    Ok(job)
}

/// Counters only grow, but processed never exceeds a known total.
/// Server creation times replace a locally seeded one.
fn fold_progress(job: &mut Job, patch: &JobPatch) {
    job.total_functions = job.total_functions.max(patch.total_functions);
    job.processed_functions = job.processed_functions.max(patch.processed_functions);
    if job.total_functions > 0 {
        job.processed_functions = job.processed_functions.min(job.total_functions);
    }
    job.updated_at = job.updated_at.max(patch.updated_at);
    job.created_at = match patch.origin {
        PatchOrigin::Local => job.created_at.or(patch.created_at),
        _ => patch.created_at.or(job.created_at),
    };
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::job::FunctionResult;
    use crate::snapshot::{JobDetail, JobSummary};
    use crate::types::Timestamp;
    use crate::update::UpdateEvent;

    fn at(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn push(status: JobStatus, processed: u32, total: u32, secs: i64) -> JobPatch {
        UpdateEvent {
            job_id: "j1".into(),
            status,
            total_functions: total,
            processed_functions: processed,
            updated_at: at(secs),
        }
        .into()
    }

    fn detail(status: JobStatus, functions: &[&str], error: Option<&str>, secs: i64) -> JobPatch {
        JobDetail {
            id: "j1".into(),
            code: Some("int f(void) { return 1; }".into()),
            status,
            created_at: Some(at(0)),
            updated_at: Some(at(secs)),
            total_functions: functions.len() as u32,
            processed_functions: functions.len() as u32,
            functions: functions
                .iter()
                .map(|name| FunctionResult {
                    name: (*name).into(),
                    diagram_source: format!("flowchart TD\n  A[{name}]"),
                    analysis: None,
                })
                .collect(),
            error_message: error.map(Into::into),
        }
        .into()
    }

    fn summary(status: JobStatus, processed: u32, total: u32) -> JobPatch {
        JobSummary {
            id: "j1".into(),
            status,
            created_at: Some(at(0)),
            updated_at: None,
            total_functions: total,
            processed_functions: processed,
        }
        .into()
    }

    #[test]
    fn first_sighting_inserts() {
        let mut store = JobStore::new();
        assert_eq!(store.upsert(push(JobStatus::Queued, 0, 0, 1)), UpsertOutcome::Inserted);
        assert_eq!(store.list().count(), 1);
        assert_eq!(store.get("j1").unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn applying_same_event_twice_is_idempotent() {
        let mut store = JobStore::new();
        store.upsert(push(JobStatus::InProgress, 1, 2, 5));
        let once = store.get("j1").cloned();

        assert_eq!(store.upsert(push(JobStatus::InProgress, 1, 2, 5)), UpsertOutcome::Unchanged);
        assert_eq!(store.get("j1").cloned(), once);
    }

    #[test]
    fn out_of_order_events_keep_latest() {
        let mut store = JobStore::new();
        store.upsert(push(JobStatus::InProgress, 2, 3, 20));
        assert_eq!(store.upsert(push(JobStatus::InProgress, 1, 3, 10)), UpsertOutcome::Stale);

        let job = store.get("j1").unwrap();
        assert_eq!(job.processed_functions, 2);
        assert_eq!(job.updated_at, Some(at(20)));
    }

    #[test]
    fn status_never_regresses_even_with_newer_timestamp() {
        let mut store = JobStore::new();
        store.upsert(push(JobStatus::InProgress, 1, 3, 10));
        assert_eq!(store.upsert(push(JobStatus::Queued, 0, 0, 30)), UpsertOutcome::Stale);
        assert_eq!(store.get("j1").unwrap().status, JobStatus::InProgress);
    }

    #[test]
    fn terminal_wins_over_non_terminal_at_equal_timestamp() {
        let mut store = JobStore::new();
        store.upsert(push(JobStatus::InProgress, 2, 2, 10));
        assert_eq!(store.upsert(push(JobStatus::Success, 2, 2, 10)), UpsertOutcome::Applied);
        assert_eq!(store.get("j1").unwrap().status, JobStatus::Success);
    }

    #[test]
    fn terminal_job_is_frozen_against_push() {
        let mut store = JobStore::new();
        store.upsert(push(JobStatus::Failed, 0, 0, 10));
        assert_eq!(store.upsert(push(JobStatus::Success, 2, 2, 20)), UpsertOutcome::Frozen);
        assert_eq!(store.upsert(push(JobStatus::Failed, 0, 0, 10)), UpsertOutcome::Frozen);
        assert_eq!(store.get("j1").unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn detail_completes_terminal_job_exactly_once() {
        let mut store = JobStore::new();
        store.upsert(push(JobStatus::Success, 2, 2, 10));
        assert!(store.get("j1").unwrap().functions.is_empty());

        assert_eq!(
            store.upsert(detail(JobStatus::Success, &["a", "b"], None, 10)),
            UpsertOutcome::Applied
        );
        let job = store.get("j1").unwrap();
        assert_eq!(job.functions.len(), 2);
        assert!(job.detail_loaded);
        assert!(job.source.is_some());

        assert_eq!(
            store.upsert(detail(JobStatus::Success, &["c"], None, 30)),
            UpsertOutcome::Frozen
        );
        assert_eq!(store.get("j1").unwrap().functions.len(), 2);
    }

    #[test]
    fn detail_with_other_terminal_status_is_refused() {
        let mut store = JobStore::new();
        store.upsert(push(JobStatus::Success, 1, 1, 10));
        assert_eq!(
            store.upsert(detail(JobStatus::Failed, &[], Some("boom"), 20)),
            UpsertOutcome::Frozen
        );
        assert!(store.get("j1").unwrap().error_message.is_none());
    }

    #[test]
    fn failed_detail_carries_error_message_only() {
        let mut store = JobStore::new();
        store.upsert(push(JobStatus::InProgress, 0, 0, 1));
        store.upsert(detail(JobStatus::Failed, &["ignored"], Some("parse error"), 5));

        let job = store.get("j1").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("parse error"));
        assert!(job.functions.is_empty());
    }

    #[test]
    fn functions_attach_only_on_success() {
        let mut store = JobStore::new();
        store.upsert(detail(JobStatus::InProgress, &["a"], None, 1));
        assert!(store.get("j1").unwrap().functions.is_empty());
    }

    #[test]
    fn summary_without_timestamp_applies_only_when_advancing() {
        let mut store = JobStore::new();
        store.upsert(push(JobStatus::InProgress, 2, 4, 10));

        assert_eq!(store.upsert(summary(JobStatus::InProgress, 1, 4)), UpsertOutcome::Stale);
        assert_eq!(store.upsert(summary(JobStatus::InProgress, 3, 4)), UpsertOutcome::Applied);

        let job = store.get("j1").unwrap();
        assert_eq!(job.processed_functions, 3);
        assert_eq!(job.updated_at, Some(at(10)));
    }

    #[test]
    fn local_seed_does_not_shadow_server_timestamps() {
        let mut store = JobStore::new();
        store.upsert(JobPatch::seed("j1", JobStatus::Queued, Utc::now()));
        assert_eq!(store.upsert(push(JobStatus::InProgress, 0, 2, 1)), UpsertOutcome::Applied);
        assert!(store.get("j1").unwrap().created_at.is_some());
    }

    #[test]
    fn invalid_patch_is_rejected_without_change() {
        let mut store = JobStore::new();
        assert_eq!(store.upsert(push(JobStatus::InProgress, 5, 2, 1)), UpsertOutcome::Rejected);
        assert_eq!(store.list().count(), 0);
    }

    #[test]
    fn accepted_sequence_is_monotonic() {
        let mut store = JobStore::new();
        let sequence = [
            push(JobStatus::Queued, 0, 0, 1),
            push(JobStatus::InProgress, 1, 3, 4),
            push(JobStatus::InProgress, 0, 3, 2),
            summary(JobStatus::Queued, 0, 0),
            push(JobStatus::InProgress, 3, 3, 6),
            push(JobStatus::InProgress, 2, 3, 5),
            push(JobStatus::Success, 3, 3, 7),
            push(JobStatus::Failed, 3, 3, 9),
        ];

        let mut last_rank = 0;
        let mut last_ts = None;
        for patch in sequence {
            store.upsert(patch);
            let job = store.get("j1").unwrap();
            assert!(job.status.rank() >= last_rank);
            assert!(job.updated_at >= last_ts);
            last_rank = job.status.rank();
            last_ts = job.updated_at;
        }
        assert_eq!(store.get("j1").unwrap().status, JobStatus::Success);
    }

    #[tokio::test]
    async fn notifies_only_on_change() {
        let mut store = JobStore::new();
        let mut rx = store.subscribe();

        store.upsert(push(JobStatus::InProgress, 0, 2, 1));
        store.upsert(push(JobStatus::InProgress, 0, 2, 1));
        store.upsert(push(JobStatus::Queued, 0, 0, 0));
        store.upsert(push(JobStatus::Success, 2, 2, 3));

        let first = rx.recv().await.unwrap();
        assert!(first.previous.is_none());
        let second = rx.recv().await.unwrap();
        assert!(!second.previous.unwrap().is_terminal());
        assert!(second.current.is_terminal());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn list_preserves_first_seen_order() {
        let mut store = JobStore::new();
        for id in ["c", "a", "b"] {
            store.upsert(JobPatch::seed(id, JobStatus::Queued, Utc::now()));
        }
        let ids: Vec<_> = store.list().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn server_creation_time_replaces_local_seed() {
        let mut store = JobStore::new();
        let local = at(30);
        store.upsert(JobPatch::seed("j1", JobStatus::Queued, local));
        assert_eq!(store.get("j1").unwrap().created_at, Some(local));

        assert_eq!(store.upsert(summary(JobStatus::InProgress, 0, 2)), UpsertOutcome::Applied);
        assert_eq!(store.get("j1").unwrap().created_at, Some(at(0)));

        // A later seed never overrides the server's value.
        store.upsert(JobPatch::seed("j1", JobStatus::InProgress, at(60)));
        assert_eq!(store.get("j1").unwrap().created_at, Some(at(0)));
    }

    #[test]
    fn processed_is_clamped_once_total_is_known() {
        let mut store = JobStore::new();
        assert_eq!(store.upsert(push(JobStatus::InProgress, 5, 0, 1)), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(push(JobStatus::InProgress, 1, 3, 2)), UpsertOutcome::Applied);

        let job = store.get("j1").unwrap();
        assert_eq!((job.processed_functions, job.total_functions), (3, 3));
        assert_eq!(job.progress_percent(), 100);
    }
}

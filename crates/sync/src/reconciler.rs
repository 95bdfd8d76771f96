//! Reconciler: the single writer of the job store.
//!
//! One task owns every store mutation. It consumes push events from the
//! subscriber, snapshot results from in-flight fetches, per-job poll
//! timers and commands from the session handle, and decides per job
//! whether push or poll is authoritative:
//!
//! - a non-terminal job enters [`SyncMode::PollFallback`] the moment it is
//!   known;
//! - it is promoted to [`SyncMode::PushConfirmed`] once an update for it
//!   arrives while the push channel is connected;
//! - every transition to connected triggers one full list fetch, because
//!   events sent while disconnected are lost;
//! - a terminal job is [`SyncMode::Settled`] and never polled again.
//!
//! Cancellation wins over every other branch, and no fetch result is
//! merged once it has fired; pending timers and in-flight fetches are
//! dropped on the way out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use codeflow_core::types::JobId;
use codeflow_core::{
    JobDetail, JobPatch, JobStore, JobSummary, PatchOrigin, SubmittedJob, UpsertOutcome,
};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::SnapshotSource;
use crate::config::{ResumePolicy, SyncConfig};
use crate::error::TransportError;
use crate::events::SyncNotice;
use crate::poller::PollScheduler;
use crate::subscriber::{ConnectionState, SubscriberEvent};

/// Which channel currently drives a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Re-fetched on a timer until push confirms it or it finishes.
    PollFallback,
    /// Push delivered an update for it while connected; no polling.
    PushConfirmed,
    /// Terminal; no further fetches except the one attaching its results.
    Settled,
}

/// Reconciler state readable through the session handle.
#[derive(Debug)]
pub struct SyncState {
    pub connection: ConnectionState,
    pub modes: HashMap<JobId, SyncMode>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            modes: HashMap::new(),
        }
    }
}

/// Requests from the session handle.
#[derive(Debug)]
pub(crate) enum Command {
    /// Re-fetch the job list (user retry).
    Refresh,
    /// Start tracking a job this client just created.
    Track(SubmittedJob),
    /// Fetch one job's full detail.
    LoadDetail(JobId),
}

/// A completed snapshot fetch.
enum Fetched {
    All(Result<Vec<JobSummary>, TransportError>),
    One {
        job_id: JobId,
        result: Result<JobDetail, TransportError>,
    },
}

pub(crate) struct Reconciler {
    store: Arc<RwLock<JobStore>>,
    state: Arc<RwLock<SyncState>>,
    source: Arc<dyn SnapshotSource>,
    notices: broadcast::Sender<SyncNotice>,
    resume_policy: ResumePolicy,

    modes: HashMap<JobId, SyncMode>,
    poller: PollScheduler,
    /// Terminal jobs whose results have not been attached yet.
    awaiting_detail: HashSet<JobId>,
    /// Retry timers for failed result fetches of terminal jobs.
    detail_retries: PollScheduler,

    fetches: FuturesUnordered<BoxFuture<'static, Fetched>>,
    detail_in_flight: HashSet<JobId>,
    /// Jobs that finished while their detail fetch was already running;
    /// that response may predate the finish, so fetch once more.
    refetch_on_return: HashSet<JobId>,
    list_in_flight: bool,
    /// A resync was requested while a list fetch was already running.
    relist: bool,
    list_failed: bool,
    list_retry_at: Option<Instant>,

    connection: ConnectionState,
    disconnected_since: Option<Instant>,
    resumed: bool,

    cancel: CancellationToken,
}

impl Reconciler {
    pub(crate) fn new(
        store: Arc<RwLock<JobStore>>,
        state: Arc<RwLock<SyncState>>,
        source: Arc<dyn SnapshotSource>,
        notices: broadcast::Sender<SyncNotice>,
        config: &SyncConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            state,
            source,
            notices,
            resume_policy: config.resume_policy,
            modes: HashMap::new(),
            poller: PollScheduler::new(config.poll_interval),
            awaiting_detail: HashSet::new(),
            detail_retries: PollScheduler::new(config.poll_interval),
            fetches: FuturesUnordered::new(),
            detail_in_flight: HashSet::new(),
            refetch_on_return: HashSet::new(),
            list_in_flight: false,
            relist: false,
            list_failed: false,
            list_retry_at: None,
            connection: ConnectionState::Disconnected,
            disconnected_since: Some(Instant::now()),
            resumed: false,
            cancel,
        }
    }

    /// Run until the cancellation token fires.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut subscriber: mpsc::Receiver<SubscriberEvent>,
    ) {
        let cancel = self.cancel.clone();
        tracing::info!("Reconciler started");
        self.request_list();

        loop {
            let resume_at = self.resume_deadline();
            let list_retry_at = self.list_retry_at;

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                Some(command) = commands.recv() => self.handle_command(command).await,
                Some(event) = subscriber.recv() => self.handle_subscriber_event(event).await,
                Some(fetched) = self.fetches.next() => self.handle_fetched(fetched).await,
                Some(job_id) = self.poller.next_due() => self.handle_poll_due(job_id),
                Some(job_id) = self.detail_retries.next_due() => {
                    if self.awaiting_detail.contains(&job_id) {
                        self.request_detail(job_id);
                    }
                }
                _ = sleep_until_opt(resume_at) => self.resume_polling().await,
                _ = sleep_until_opt(list_retry_at) => {
                    self.list_retry_at = None;
                    self.request_list();
                }
            }
        }

        tracing::info!(
            in_flight = self.fetches.len(),
            polling = self.poller.active_count(),
            "Reconciler stopped",
        );
        self.fetches.clear();
        self.poller.clear();
        self.detail_retries.clear();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Refresh => self.request_list(),
            Command::Track(submitted) => {
                tracing::info!(job_id = %submitted.job_id, status = %submitted.status, "Tracking submitted job");
                self.apply(JobPatch::seed(submitted.job_id, submitted.status, Utc::now()))
                    .await;
            }
            Command::LoadDetail(job_id) => {
                self.request_detail(job_id);
            }
        }
    }

    async fn handle_subscriber_event(&mut self, event: SubscriberEvent) {
        match event {
            SubscriberEvent::State(state) => self.set_connection(state).await,
            SubscriberEvent::Update(update) => {
                let job_id = update.job_id.clone();
                self.apply(update.into()).await;
                if self.connection == ConnectionState::Connected {
                    self.confirm_push(&job_id).await;
                }
            }
        }
    }

    async fn set_connection(&mut self, state: ConnectionState) {
        if state == self.connection {
            return;
        }
        self.connection = state;
        self.state.write().await.connection = state;

        match state {
            ConnectionState::Connected => {
                self.disconnected_since = None;
                self.resumed = false;
                tracing::info!("Push channel connected, resynchronizing job list");
                self.request_list();
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                if self.disconnected_since.is_none() {
                    self.disconnected_since = Some(Instant::now());
                }
            }
        }

        let _ = self.notices.send(SyncNotice::ConnectionChanged { state });
    }

    async fn handle_fetched(&mut self, fetched: Fetched) {
        if self.cancel.is_cancelled() {
            return;
        }
        match fetched {
            Fetched::All(Ok(summaries)) => {
                self.list_in_flight = false;
                if self.list_failed {
                    self.list_failed = false;
                    tracing::info!("Job list available again");
                    let _ = self.notices.send(SyncNotice::ListRecovered);
                }

                let count = summaries.len();
                let mut changed = 0usize;
                for summary in summaries {
                    if self.apply(summary.into()).await.changed() {
                        changed += 1;
                    }
                }
                tracing::debug!(count, changed, "Job list merged");

                if std::mem::take(&mut self.relist) {
                    self.request_list();
                }
            }
            Fetched::All(Err(e)) => {
                self.list_in_flight = false;
                self.list_failed = true;
                tracing::warn!(error = %e, "Job list unavailable");
                let _ = self.notices.send(SyncNotice::ListUnavailable {
                    error: e.to_string(),
                });

                if std::mem::take(&mut self.relist) {
                    self.request_list();
                } else {
                    self.list_retry_at = Some(Instant::now() + self.poller.interval());
                }
            }
            Fetched::One { job_id, result } => {
                self.detail_in_flight.remove(&job_id);
                let refetch = self.refetch_on_return.remove(&job_id);
                match result {
                    Ok(detail) => {
                        self.apply(detail.into()).await;
                        if self.awaiting_detail.contains(&job_id) {
                            if refetch {
                                tracing::debug!(job_id = %job_id, "Detail predates finish, fetching again");
                                self.request_detail(job_id);
                            } else {
                                self.detail_retries.start(&job_id);
                            }
                        }
                    }
                    Err(e) if e.is_not_found() => {
                        tracing::warn!(job_id = %job_id, "Job not found, no longer polling it");
                        self.poller.stop(&job_id);
                        self.detail_retries.stop(&job_id);
                        self.awaiting_detail.remove(&job_id);
                        self.forget_mode(&job_id).await;
                        let _ = self.notices.send(SyncNotice::JobNotFound { job_id });
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Job detail fetch failed, will retry");
                        if self.awaiting_detail.contains(&job_id) {
                            self.detail_retries.start(&job_id);
                        }
                    }
                }
            }
        }
    }

    fn handle_poll_due(&mut self, job_id: JobId) {
        if self.modes.get(&job_id) != Some(&SyncMode::PollFallback) {
            return;
        }
        tracing::trace!(job_id = %job_id, "Poll timer fired");
        self.poller.start(&job_id);
        self.request_detail(job_id);
    }

    /// Merge one patch and update the job's mode accordingly.
    async fn apply(&mut self, patch: JobPatch) -> UpsertOutcome {
        let job_id = patch.id.clone();
        let origin = patch.origin;

        let (outcome, before, after) = {
            let mut store = self.store.write().await;
            if self.cancel.is_cancelled() {
                return UpsertOutcome::Unchanged;
            }
            let before = store.get(&job_id).map(|job| job.status);
            let outcome = store.upsert(patch);
            let after = store
                .get(&job_id)
                .map(|job| (job.status, job.detail_loaded));
            (outcome, before, after)
        };

        let Some((status, detail_loaded)) = after else {
            return outcome;
        };

        if status.is_terminal() {
            self.settle(&job_id).await;
            // Jobs first seen terminal in a list are loaded on demand only.
            let transitioned = before.map_or(
                matches!(origin, PatchOrigin::Push | PatchOrigin::Local),
                |s| !s.is_terminal(),
            );
            if detail_loaded {
                self.awaiting_detail.remove(&job_id);
                self.detail_retries.stop(&job_id);
            } else if outcome.changed() && transitioned {
                tracing::info!(job_id = %job_id, status = %status, "Job finished, fetching results");
                self.awaiting_detail.insert(job_id.clone());
                if !self.request_detail(job_id.clone()) {
                    self.refetch_on_return.insert(job_id);
                }
            }
        } else if !self.modes.contains_key(&job_id) {
            self.enter_poll_fallback(&job_id).await;
        }

        outcome
    }

    async fn confirm_push(&mut self, job_id: &str) {
        if self.modes.get(job_id) != Some(&SyncMode::PollFallback) {
            return;
        }
        self.poller.stop(job_id);
        self.set_mode(job_id, SyncMode::PushConfirmed).await;
        tracing::debug!(job_id, "Job confirmed on push channel, polling stopped");
    }

    async fn enter_poll_fallback(&mut self, job_id: &str) {
        self.set_mode(job_id, SyncMode::PollFallback).await;
        self.poller.start(job_id);
        tracing::debug!(job_id, "Job polling started");
    }

    async fn settle(&mut self, job_id: &str) {
        self.poller.stop(job_id);
        if self.modes.get(job_id) != Some(&SyncMode::Settled) {
            self.set_mode(job_id, SyncMode::Settled).await;
        }
    }

    async fn set_mode(&mut self, job_id: &str, mode: SyncMode) {
        self.modes.insert(job_id.to_string(), mode);
        self.state.write().await.modes.insert(job_id.to_string(), mode);
    }

    async fn forget_mode(&mut self, job_id: &str) {
        self.modes.remove(job_id);
        self.state.write().await.modes.remove(job_id);
    }

    fn request_list(&mut self) {
        if self.list_in_flight {
            self.relist = true;
            return;
        }
        self.list_in_flight = true;
        self.list_retry_at = None;

        let source = Arc::clone(&self.source);
        self.fetches
            .push(async move { Fetched::All(source.fetch_all().await) }.boxed());
    }

    /// Fetch one job's detail unless a fetch for it is already running.
    ///
    /// Returns `false` when an earlier fetch was still in flight.
    fn request_detail(&mut self, job_id: JobId) -> bool {
        if !self.detail_in_flight.insert(job_id.clone()) {
            tracing::trace!(job_id = %job_id, "Detail fetch already in flight");
            return false;
        }

        let source = Arc::clone(&self.source);
        self.fetches.push(
            async move {
                let result = source.fetch_one(&job_id).await;
                Fetched::One { job_id, result }
            }
            .boxed(),
        );
        true
    }

    /// When push-confirmed jobs should go back to polling, if ever.
    fn resume_deadline(&self) -> Option<Instant> {
        match self.resume_policy {
            ResumePolicy::After(after) if !self.resumed => {
                self.disconnected_since.map(|since| since + after)
            }
            _ => None,
        }
    }

    async fn resume_polling(&mut self) {
        self.resumed = true;

        let confirmed: Vec<JobId> = self
            .modes
            .iter()
            .filter(|(_, mode)| **mode == SyncMode::PushConfirmed)
            .map(|(job_id, _)| job_id.clone())
            .collect();
        if confirmed.is_empty() {
            return;
        }

        tracing::info!(jobs = confirmed.len(), "Push channel still down, resuming polling");
        for job_id in &confirmed {
            self.enter_poll_fallback(job_id).await;
        }
        let _ = self.notices.send(SyncNotice::PollingResumed {
            jobs: confirmed.len(),
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

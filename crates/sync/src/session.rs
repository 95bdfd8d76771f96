//! Dashboard session: the public handle over subscriber and reconciler.

use std::sync::Arc;
use std::time::Duration;

use codeflow_core::{Job, JobChange, JobStore, SubmittedJob};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::api::SnapshotSource;
use crate::client::StreamConnector;
use crate::config::SyncConfig;
use crate::events::SyncNotice;
use crate::reconciler::{Command, Reconciler, SyncMode, SyncState};
use crate::subscriber::{self, ConnectionState};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;
const NOTICE_CHANNEL_CAPACITY: usize = 64;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running synchronization session.
///
/// Reads go straight to the shared store; everything that mutates it is
/// sent to the reconciler task. Dropping the session cancels both tasks;
/// [`DashboardSession::shutdown`] also waits for them to finish.
pub struct DashboardSession {
    store: Arc<RwLock<JobStore>>,
    state: Arc<RwLock<SyncState>>,
    commands: mpsc::Sender<Command>,
    notices: broadcast::Sender<SyncNotice>,
    cancel: CancellationToken,
    reconciler_task: JoinHandle<()>,
    subscriber_task: JoinHandle<()>,
    _drop_guard: DropGuard,
}

impl DashboardSession {
    /// Spawn the subscriber and reconciler tasks. Must be called from
    /// within a Tokio runtime.
    pub fn start(
        source: Arc<dyn SnapshotSource>,
        connector: Arc<dyn StreamConnector>,
        config: SyncConfig,
    ) -> Self {
        let store = Arc::new(RwLock::new(JobStore::new()));
        let state = Arc::new(RwLock::new(SyncState::default()));
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        tracing::info!(
            push_endpoint = connector.endpoint(),
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            resume_policy = ?config.resume_policy,
            "Starting dashboard session",
        );

        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&state),
            source,
            notices.clone(),
            &config,
            cancel.clone(),
        );
        let subscriber_task = tokio::spawn(subscriber::run(
            connector,
            config.reconnect.clone(),
            event_tx,
            cancel.child_token(),
        ));
        let reconciler_task = tokio::spawn(reconciler.run(command_rx, event_rx));

        Self {
            store,
            state,
            commands: command_tx,
            notices,
            _drop_guard: cancel.clone().drop_guard(),
            cancel,
            reconciler_task,
            subscriber_task,
        }
    }

    /// All known jobs in first-seen order.
    pub async fn jobs(&self) -> Vec<Job> {
        self.store.read().await.list().cloned().collect()
    }

    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.store.read().await.get(job_id).cloned()
    }

    pub async fn mode(&self, job_id: &str) -> Option<SyncMode> {
        self.state.read().await.modes.get(job_id).copied()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    /// Receive one [`JobChange`] per job that actually changed.
    pub async fn subscribe(&self) -> broadcast::Receiver<JobChange> {
        self.store.read().await.subscribe()
    }

    /// Receive connection and degradation notices.
    pub fn notices(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Re-fetch the job list.
    pub async fn refresh(&self) {
        self.send(Command::Refresh).await;
    }

    /// Track a job this client just created, e.g. from
    /// [`JobsApi::submit_job`](crate::api::JobsApi::submit_job).
    pub async fn track(&self, submitted: SubmittedJob) {
        self.send(Command::Track(submitted)).await;
    }

    /// Fetch full results for a job, e.g. one that was already finished
    /// when it first appeared in the list.
    pub async fn load_detail(&self, job_id: impl Into<String>) {
        self.send(Command::LoadDetail(job_id.into())).await;
    }

    /// Cancel both tasks and wait for them to stop.
    ///
    /// Nothing is written to the store after this returns.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down dashboard session");
        self.cancel.cancel();

        for (task, handle) in [
            ("reconciler", self.reconciler_task),
            ("subscriber", self.subscriber_task),
        ] {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(task, error = %e, "Session task panicked"),
                Err(_) => tracing::warn!(task, "Session task did not stop within timeout"),
            }
        }
        tracing::info!("Dashboard session stopped");
    }

    async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            tracing::debug!("Reconciler has stopped, command dropped");
        }
    }
}

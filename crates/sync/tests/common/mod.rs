//! Shared fakes for the sync integration tests.
//!
//! [`FakeBackend`] is an in-memory [`SnapshotSource`] whose jobs the test
//! mutates while the session runs; [`LiveConnector`] hands out push
//! connections whose frames the test sends by hand.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use codeflow_core::{FunctionResult, Job, JobDetail, JobStatus, JobSummary};
use codeflow_sync::client::FrameStream;
use codeflow_sync::reconnect::ReconnectConfig;
use codeflow_sync::{
    ConnectionState, DashboardSession, ResumePolicy, SnapshotSource, StreamConnector, StreamError,
    SyncConfig, SyncMode, SyncNotice, TransportError,
};
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;

// ---------------------------------------------------------------------------
// Snapshot source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBackend {
    jobs: Mutex<Vec<JobDetail>>,
    list_failures: AtomicUsize,
    detail_delay: Mutex<Duration>,
    detail_gate: Mutex<Option<Arc<Notify>>>,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or replace a job.
    pub fn put(&self, detail: JobDetail) {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == detail.id) {
            Some(existing) => *existing = detail,
            None => jobs.push(detail),
        }
    }

    /// Fail the next `n` list requests with a 503.
    pub fn fail_next_lists(&self, n: usize) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    pub fn delay_details(&self, delay: Duration) {
        *self.detail_delay.lock().unwrap() = delay;
    }

    /// Hold every detail response until the returned gate is notified
    /// once per response.
    pub fn gate_details(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.detail_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for FakeBackend {
    async fn fetch_all(&self) -> Result<Vec<JobSummary>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Status {
                status: 503,
                body: "backend warming up".into(),
            });
        }

        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().map(summary_of).collect())
    }

    /// Answers with the job as it was when the request arrived, however
    /// long the response is held back.
    async fn fetch_one(&self, job_id: &str) -> Result<JobDetail, TransportError> {
        let snapshot = self.jobs.lock().unwrap().iter().find(|j| j.id == job_id).cloned();
        self.detail_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.detail_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let gate = self.detail_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        snapshot.ok_or_else(|| TransportError::Status {
            status: 404,
            body: format!("job {job_id} not found"),
        })
    }
}

fn summary_of(detail: &JobDetail) -> JobSummary {
    JobSummary {
        id: detail.id.clone(),
        status: detail.status,
        created_at: detail.created_at,
        updated_at: None,
        total_functions: detail.total_functions,
        processed_functions: detail.processed_functions,
    }
}

pub fn detail(id: &str, status: JobStatus, processed: u32, total: u32) -> JobDetail {
    JobDetail {
        id: id.to_string(),
        code: Some("def main():\n    pass\n".into()),
        status,
        created_at: None,
        updated_at: None,
        total_functions: total,
        processed_functions: processed,
        functions: Vec::new(),
        error_message: None,
    }
}

/// A successful detail carrying one diagram per name.
pub fn finished(id: &str, names: &[&str]) -> JobDetail {
    let total = names.len() as u32;
    JobDetail {
        functions: names
            .iter()
            .map(|name| FunctionResult {
                name: name.to_string(),
                diagram_source: format!("flowchart TD\n  A[{name}] --> B[end]"),
                analysis: None,
            })
            .collect(),
        ..detail(id, JobStatus::Success, total, total)
    }
}

// ---------------------------------------------------------------------------
// Push connector
// ---------------------------------------------------------------------------

enum Script {
    Refuse,
    Live(mpsc::UnboundedReceiver<Message>),
}

/// Each `connect` consumes the next queued script. With none left, the
/// connection attempt never completes.
#[derive(Default)]
pub struct LiveConnector {
    scripts: Mutex<VecDeque<Script>>,
}

impl LiveConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a connection that succeeds. Frames sent on the returned
    /// sender are delivered on it; dropping the sender closes it.
    pub fn open(&self) -> mpsc::UnboundedSender<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(Script::Live(rx));
        tx
    }

    pub fn refuse(&self) {
        self.scripts.lock().unwrap().push_back(Script::Refuse);
    }
}

#[async_trait]
impl StreamConnector for LiveConnector {
    fn endpoint(&self) -> &str {
        "live-test"
    }

    async fn connect(&self) -> Result<FrameStream, StreamError> {
        let next = self.scripts.lock().unwrap().pop_front();
        match next {
            Some(Script::Live(rx)) => Ok(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (Ok(frame), rx))
            })
            .boxed()),
            Some(Script::Refuse) => Err(StreamError::Connect("connection refused".into())),
            None => futures::future::pending().await,
        }
    }
}

/// A `job_update` frame stamped `seconds` past a fixed base time.
pub fn push_update(job_id: &str, status: &str, processed: u32, total: u32, seconds: u32) -> Message {
    Message::Text(format!(
        r#"{{"type":"job_update","job_id":"{job_id}","status":"{status}","total_functions":{total},"processed_functions":{processed},"updated_at":"2024-05-01T10:00:{seconds:02}Z"}}"#
    ))
}

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

/// Fast timers; push-confirmed jobs never resume polling unless a test
/// asks for it.
pub fn fast_config(poll_interval: Duration) -> SyncConfig {
    SyncConfig {
        poll_interval,
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            multiplier: 2.0,
            jitter: 0.0,
        },
        resume_policy: ResumePolicy::Never,
    }
}

pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Poll the session until `job_id` satisfies `check`.
pub async fn wait_for_job(
    session: &DashboardSession,
    job_id: &str,
    check: impl Fn(&Job) -> bool,
) -> Job {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        if let Some(job) = session.job(job_id).await {
            if check(&job) {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} did not reach the expected state: {:?}",
            session.job(job_id).await
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll the session until `job_id` is driven by `mode`.
pub async fn wait_for_mode(session: &DashboardSession, job_id: &str, mode: SyncMode) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while session.mode(job_id).await != Some(mode) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} never entered {mode:?}, now {:?}",
            session.mode(job_id).await
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_connection(session: &DashboardSession, state: ConnectionState) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while session.connection_state().await != state {
        assert!(tokio::time::Instant::now() < deadline, "push channel never became {state:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Skip notices until one matches `check`.
pub async fn wait_for_notice(
    notices: &mut broadcast::Receiver<SyncNotice>,
    check: impl Fn(&SyncNotice) -> bool,
) -> SyncNotice {
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            match notices.recv().await {
                Ok(notice) if check(&notice) => return notice,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("notice channel closed"),
            }
        }
    })
    .await
    .expect("expected notice in time")
}

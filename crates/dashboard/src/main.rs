//! `codeflow-dashboard` -- terminal view of code-analysis jobs.
//!
//! Keeps a live job table in sync with the analysis backend over its
//! REST and WebSocket endpoints, prints every change, and writes the
//! flowchart sources of finished jobs to disk, including jobs that had
//! already finished before it started. Optionally submits a source file
//! as a new job first.
//!
//! Configuration comes from the environment (see
//! [`DashboardConfig::from_env`]); `LOG_FORMAT=json` switches log output
//! to JSON.

use std::sync::Arc;

use anyhow::Context;
use codeflow_core::{render_job, JobChange};
use codeflow_dashboard::config::DashboardConfig;
use codeflow_dashboard::render::FileRenderer;
use codeflow_dashboard::results;
use codeflow_dashboard::view;
use codeflow_sync::{DashboardSession, JobsApi, PushClient};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "codeflow_dashboard=info,codeflow_sync=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = DashboardConfig::from_env().context("invalid configuration")?;
    let api = Arc::new(
        JobsApi::new(config.api_url.as_str(), config.request_timeout)
            .context("failed to build HTTP client")?,
    );
    tracing::info!(
        api_url = api.api_url(),
        ws_url = %config.ws_url,
        diagram_dir = %config.diagram_dir.display(),
        "Starting codeflow-dashboard",
    );
    let push = Arc::new(PushClient::new(config.ws_url.as_str()));
    let session = DashboardSession::start(api.clone(), push, config.sync.clone());
    let mut changes = session.subscribe().await;
    let mut notices = session.notices();

    if let Some(path) = &config.submit_source {
        let code = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        match api.submit_job(&code).await {
            Ok(submitted) => {
                tracing::info!(job_id = %submitted.job_id, file = %path.display(), "Job submitted");
                session.track(submitted).await;
            }
            Err(e) => tracing::error!(error = %e, file = %path.display(), "Job submission failed"),
        }
    }

    let renderer = FileRenderer::new(&config.diagram_dir);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Interrupt received");
                break;
            }
            change = changes.recv() => match change {
                Ok(change) => on_change(&session, &change, &renderer).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Job changes lagged, reprinting table");
                    let jobs = session.jobs().await;
                    println!("{}", view::job_table(&jobs));
                    for job in jobs.iter().filter(|j| j.is_terminal() && !j.detail_loaded) {
                        session.load_detail(job.id.clone()).await;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            notice = notices.recv() => {
                if let Ok(notice) = notice {
                    println!("{}", view::notice_line(&notice));
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

async fn on_change(session: &DashboardSession, change: &JobChange, renderer: &FileRenderer) {
    let job = &change.current;
    println!("{}", view::job_line(job));

    if results::needs_results(change) {
        tracing::debug!(job_id = %job.id, "Loading results of finished job");
        session.load_detail(job.id.clone()).await;
    }
    if results::results_arrived(change) {
        for rendered in render_job(job, renderer).await {
            println!("  {}", view::render_line(&job.id, &rendered));
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

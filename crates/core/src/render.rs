//! Diagram-render collaborator boundary.
//!
//! The renderer receives each function's `diagram_source` verbatim and
//! either produces an artifact or reports a [`RenderError`]. Neither the
//! source nor the error is interpreted on this side.

use async_trait::async_trait;

use crate::error::RenderError;
use crate::job::{Job, JobStatus};

/// What the renderer is asked to draw.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub job_id: &'a str,
    pub function_name: &'a str,
    pub diagram_source: &'a str,
}

/// A successfully rendered diagram. `artifact` is whatever the renderer
/// hands back (a file path, markup, a URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDiagram {
    pub artifact: String,
}

#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, request: RenderRequest<'_>) -> Result<RenderedDiagram, RenderError>;
}

/// Per-function render outcome as surfaced to the view.
#[derive(Debug, Clone)]
pub struct FunctionRender {
    pub name: String,
    pub outcome: Result<RenderedDiagram, RenderError>,
}

/// Forward every function of a successful job to `renderer`.
///
/// Returns an empty list for jobs that have not succeeded or whose
/// functions are not loaded yet.
pub async fn render_job(job: &Job, renderer: &dyn DiagramRenderer) -> Vec<FunctionRender> {
    if job.status != JobStatus::Success {
        return Vec::new();
    }

    let mut rendered = Vec::with_capacity(job.functions.len());
    for function in &job.functions {
        let outcome = renderer
            .render(RenderRequest {
                job_id: &job.id,
                function_name: &function.name,
                diagram_source: &function.diagram_source,
            })
            .await;
        if let Err(e) = &outcome {
            tracing::warn!(job_id = %job.id, function = %function.name, error = %e, "Diagram render failed");
        }
        rendered.push(FunctionRender {
            name: function.name.clone(),
            outcome,
        });
    }
    rendered
}

//! Diagram renderer that writes each flowchart source to disk.
//!
//! Files land at `<output_dir>/<job_id>/<function>.mmd`, ready for any
//! Mermaid tool. The source is written verbatim.

use std::path::PathBuf;

use async_trait::async_trait;
use codeflow_core::{DiagramRenderer, RenderError, RenderRequest, RenderedDiagram};

pub struct FileRenderer {
    output_dir: PathBuf,
}

impl FileRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl DiagramRenderer for FileRenderer {
    async fn render(&self, request: RenderRequest<'_>) -> Result<RenderedDiagram, RenderError> {
        let dir = self.output_dir.join(file_stem(request.job_id));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RenderError(format!("cannot create {}: {e}", dir.display())))?;

        let path = dir.join(format!("{}.mmd", file_stem(request.function_name)));
        tokio::fs::write(&path, request.diagram_source)
            .await
            .map_err(|e| RenderError(format!("cannot write {}: {e}", path.display())))?;

        tracing::debug!(job_id = request.job_id, path = %path.display(), "Diagram written");
        Ok(RenderedDiagram {
            artifact: path.display().to_string(),
        })
    }
}

/// Make `name` safe as a single path component.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match stem.trim_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}

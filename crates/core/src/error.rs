use crate::types::JobId;

/// Reasons a [`JobPatch`](crate::update::JobPatch) is refused before merging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("Job id must not be empty")]
    EmptyId,

    #[error("Job {id}: processed_functions ({processed}) exceeds total_functions ({total})")]
    ProgressOverflow {
        id: JobId,
        processed: u32,
        total: u32,
    },

    #[error("Job {0}: function result without a name")]
    UnnamedFunction(JobId),
}

/// Failure reported by the diagram-render collaborator.
///
/// The message is passed through to the view untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Render failed: {0}")]
pub struct RenderError(pub String);

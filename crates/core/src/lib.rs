//! Domain types and the canonical job store for the codeflow dashboard.
//!
//! - [`job`] -- [`Job`], [`JobStatus`] and [`FunctionResult`].
//! - [`snapshot`] -- wire shapes returned by the jobs REST endpoints.
//! - [`update`] -- the push-channel [`UpdateEvent`] and the [`JobPatch`]
//!   every update source is normalised into.
//! - [`store`] -- [`JobStore`], the single mutation entry point with its
//!   timestamp-ordered merge policy.
//! - [`render`] -- the diagram-render collaborator boundary.

pub mod error;
pub mod job;
pub mod render;
pub mod snapshot;
pub mod store;
pub mod timestamp;
pub mod types;
pub mod update;

pub use error::{PatchError, RenderError};
pub use job::{FunctionResult, Job, JobStatus};
pub use render::{render_job, DiagramRenderer, FunctionRender, RenderRequest, RenderedDiagram};
pub use snapshot::{JobDetail, JobSummary, SubmittedJob};
pub use store::{JobChange, JobStore, UpsertOutcome};
pub use update::{JobPatch, PatchOrigin, UpdateEvent};

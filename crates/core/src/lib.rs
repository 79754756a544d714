//! `jobagent-core`: execution model for the job agent.
//!
//! This crate contains **pure model** types (no IO): identifiers, the status
//! vocabulary, catalog rows and the per-run execution context.

pub mod context;
pub mod error;
pub mod id;
pub mod model;
pub mod status;

pub use context::JobContext;
pub use error::{ModelError, ModelResult};
pub use id::{AgentId, JobId, JobLogId, StepId, StepLogId};
pub use model::{Dependency, Job, JobLog, OnError, SqlTarget, Step, StepKind, StepLog, sort_steps};
pub use status::RunStatus;

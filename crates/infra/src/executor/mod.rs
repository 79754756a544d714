//! Step executor.
//!
//! Runs one step and converts whatever happens into a [`StepOutcome`]. Nothing
//! raised while running a step crosses this boundary as an error; the only
//! non-outcome answer is [`Dispatch::UnknownKind`], which the job runner turns
//! into an internal error for the whole job.

pub mod batch;
pub mod process;
pub mod sql;

use std::path::PathBuf;

use jobagent_core::{JobContext, RunStatus, Step, StepKind};

use crate::db::StepDatabases;

pub use batch::BatchExecutor;
pub use process::{ProcessOutput, ScriptProcess};

/// Result of running a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Rows affected for SQL steps, exit code for batch steps, `-1` when the
    /// step never got to run.
    pub result: i32,
    pub succeeded: bool,
    pub output: String,
}

impl StepOutcome {
    pub fn success(result: i32, output: impl Into<String>) -> Self {
        Self {
            result,
            succeeded: true,
            output: output.into(),
        }
    }

    pub fn failure(result: i32, output: impl Into<String>) -> Self {
        Self {
            result,
            succeeded: false,
            output: output.into(),
        }
    }

    /// Step log status for this outcome.
    pub fn status(&self) -> RunStatus {
        if self.succeeded {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }
}

/// What dispatching a step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Completed(StepOutcome),
    /// The step's kind code is not one this agent can run.
    UnknownKind(String),
}

/// Dispatches steps to the SQL or batch runner by kind.
#[derive(Debug)]
pub struct StepExecutor<D> {
    databases: D,
    batch: BatchExecutor,
}

impl<D: StepDatabases> StepExecutor<D> {
    pub fn new(databases: D) -> Self {
        Self {
            databases,
            batch: BatchExecutor::default(),
        }
    }

    /// Create batch step directories under `root` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.batch = BatchExecutor::new(root);
        self
    }

    pub fn databases(&self) -> &D {
        &self.databases
    }

    pub fn run(&self, ctx: &JobContext, step: &Step) -> Dispatch {
        match &step.kind {
            StepKind::Sql => Dispatch::Completed(sql::run_sql(&self.databases, step)),
            StepKind::Batch => Dispatch::Completed(self.batch.run(ctx, step)),
            StepKind::Unknown(code) => Dispatch::UnknownKind(code.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStepDatabases;
    use jobagent_core::{AgentId, JobId, OnError, SqlTarget, StepId};

    fn step(kind: StepKind) -> Step {
        Step {
            id: StepId::new(1),
            job_id: JobId::new(1),
            name: "only".to_string(),
            enabled: true,
            kind,
            code: "SELECT 1".to_string(),
            target: SqlTarget::database("app"),
            on_error: OnError::Fail,
        }
    }

    #[test]
    fn outcome_status_follows_success_flag() {
        assert_eq!(StepOutcome::success(0, "").status(), RunStatus::Success);
        assert_eq!(StepOutcome::failure(7, "boom").status(), RunStatus::Failed);
    }

    #[test]
    fn sql_steps_go_to_the_step_database() {
        let executor = StepExecutor::new(InMemoryStepDatabases::new());
        let ctx = JobContext::new(AgentId::new(1), JobId::new(1));

        let dispatch = executor.run(&ctx, &step(StepKind::Sql));

        assert_eq!(dispatch, Dispatch::Completed(StepOutcome::success(1, "")));
        assert_eq!(executor.databases().executed().len(), 1);
    }

    #[test]
    fn unknown_kind_is_reported_not_run() {
        let executor = StepExecutor::new(InMemoryStepDatabases::new());
        let ctx = JobContext::new(AgentId::new(1), JobId::new(1));

        let dispatch = executor.run(&ctx, &step(StepKind::Unknown("x".to_string())));

        assert_eq!(dispatch, Dispatch::UnknownKind("x".to_string()));
        assert!(executor.databases().executed().is_empty());
    }
}

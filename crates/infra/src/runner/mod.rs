//! Job execution: dependency checks, the job runner and the job thread.
//!
//! ```text
//! scheduler ─▶ JobThread::run
//!                 ├─ acquire catalog connection ──(none)──▶ launch failure log
//!                 └─ JobRunner::start   (claim + open job log)
//!                       ├─ check_dependencies   (fail-fast)
//!                       ├─ execute              (steps in (name, id) order, fail-fast)
//!                       └─ finish               (always: audit, close log, release claim)
//! ```

pub mod dependencies;
pub mod job_runner;
pub mod job_thread;

use std::path::PathBuf;

use thiserror::Error;

use jobagent_core::{AgentId, JobId, OnError, RunStatus, StepId};
use jobagent_events::{EventBus, StatusEvent};

use crate::db::{CatalogPool, StepDatabases, StoreError};
use crate::executor::StepExecutor;
use crate::notify::{EmailHook, Notifier, NoopEmailHook};

pub use dependencies::check_dependencies;
pub use job_runner::JobRunner;
pub use job_thread::JobThread;

/// Why a run did not reach success.
#[derive(Debug, Error, PartialEq)]
pub enum RunError {
    #[error("job is not claimed by this agent")]
    NotClaimed,

    #[error("{}", dependency_message(.prerequisite, .status))]
    DependencyNotMet {
        prerequisite: JobId,
        status: Option<RunStatus>,
    },

    #[error("No steps found")]
    NoSteps,

    #[error("Invalid step type {kind:?} at step {step}")]
    UnknownStepKind { step: StepId, kind: String },

    #[error("Failed at step {step}: {output} (on error: {})", .on_error.as_code())]
    StepFailed {
        step: StepId,
        output: String,
        on_error: OnError,
    },

    #[error("could not open a log for step {0}")]
    StepLogNotOpened(StepId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RunError {
    /// Job status a run ending with this error is recorded with.
    pub fn status(&self) -> RunStatus {
        match self {
            RunError::NotClaimed | RunError::DependencyNotMet { .. } => RunStatus::Blocked,
            RunError::StepFailed { .. } => RunStatus::Failed,
            RunError::NoSteps
            | RunError::UnknownStepKind { .. }
            | RunError::StepLogNotOpened(_)
            | RunError::Store(_) => RunStatus::InternalError,
        }
    }
}

fn dependency_message(prerequisite: &JobId, status: &Option<RunStatus>) -> String {
    match status {
        None => format!("Dependency job {prerequisite} has no execution logs."),
        Some(status) => format!(
            "Dependency job {prerequisite} did not complete successfully. Status: {status}"
        ),
    }
}

/// Everything a job thread needs, shared by all job threads of an agent.
pub struct AgentServices<P, D, B> {
    pub agent_id: AgentId,
    pub pool: P,
    pub executor: StepExecutor<D>,
    pub notifier: Notifier<B>,
    pub email: Box<dyn EmailHook>,
}

impl<P, D, B> AgentServices<P, D, B>
where
    P: CatalogPool,
    D: StepDatabases,
    B: EventBus<StatusEvent>,
{
    pub fn new(agent_id: AgentId, pool: P, databases: D, bus: B) -> Self {
        Self {
            agent_id,
            pool,
            executor: StepExecutor::new(databases),
            notifier: Notifier::new(bus),
            email: Box::new(NoopEmailHook),
        }
    }

    pub fn with_email_hook(mut self, hook: impl EmailHook + 'static) -> Self {
        self.email = Box::new(hook);
        self
    }

    pub fn with_scratch_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.executor = self.executor.with_scratch_dir(root);
        self
    }
}

impl<P, D, B> std::fmt::Debug for AgentServices<P, D, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentServices")
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        assert_eq!(RunError::NoSteps.status(), RunStatus::InternalError);
        assert_eq!(
            RunError::DependencyNotMet {
                prerequisite: JobId::new(1),
                status: None
            }
            .status(),
            RunStatus::Blocked
        );
        assert_eq!(
            RunError::StepFailed {
                step: StepId::new(2),
                output: "boom".to_string(),
                on_error: OnError::Fail
            }
            .status(),
            RunStatus::Failed
        );
    }

    #[test]
    fn messages_name_the_offender() {
        let missing = RunError::DependencyNotMet {
            prerequisite: JobId::new(7),
            status: None,
        };
        assert_eq!(missing.to_string(), "Dependency job 7 has no execution logs.");

        let failed = RunError::DependencyNotMet {
            prerequisite: JobId::new(7),
            status: Some(RunStatus::Failed),
        };
        assert_eq!(
            failed.to_string(),
            "Dependency job 7 did not complete successfully. Status: failed"
        );

        let step = RunError::StepFailed {
            step: StepId::new(12),
            output: "exit \"7\"".to_string(),
            on_error: OnError::Ignore,
        };
        assert_eq!(step.to_string(), "Failed at step 12: exit \"7\" (on error: i)");
    }
}

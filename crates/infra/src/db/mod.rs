//! Catalog store boundary.
//!
//! The execution core never talks to a database driver directly. It sees:
//!
//! - a [`CatalogPool`] handing out pooled [`Catalog`] connections for the
//!   job's own bookkeeping (claim, job/step logs, audit, dependencies)
//! - a [`StepDatabases`] factory handing out [`StepSession`]s scoped to the
//!   target database of a SQL step
//!
//! Connections go back to their pool when dropped, so every exit path of a
//! run releases them.
//!
//! All operations take their arguments as bind parameters; no query text is
//! ever assembled from catalog values.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use jobagent_core::{JobContext, JobId, JobLogId, RunStatus, SqlTarget, Step, StepId, StepLogId};

pub use in_memory::{InMemoryCatalog, InMemoryConnection, InMemoryStepDatabases};
pub use postgres::{PostgresCatalog, PostgresConnection, PostgresStepDatabases};

/// Catalog operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No connection could be handed out (pool exhausted, closed, unreachable).
    #[error("connection unavailable: {0}")]
    Unavailable(String),

    #[error("query failed in {operation}: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },

    #[error("row not found in {0}")]
    NotFound(&'static str),

    /// A row was read but could not be turned into a model value.
    #[error("failed to decode row: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn query(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Query {
            operation,
            message: message.into(),
        }
    }
}

/// Audit trail entry written at claim and at finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub job_id: JobId,
    pub operation: String,
    pub user: String,
    pub old_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
    pub message: String,
}

impl AuditEntry {
    pub const EXECUTE: &'static str = "EXECUTE";

    pub fn execute(
        job_id: JobId,
        user: impl Into<String>,
        old_state: Option<serde_json::Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            operation: Self::EXECUTE.to_string(),
            user: user.into(),
            old_state,
            new_state: None,
            message: message.into(),
        }
    }
}

/// Values written when a step log is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLogUpdate<'a> {
    pub status: RunStatus,
    pub result: i32,
    pub output: &'a str,
}

/// A held catalog connection.
///
/// Methods returning `u64` report the affected row count; callers use it as
/// the success signal (the claim in particular relies on it).
pub trait Catalog: Send {
    /// Set the claim owner if, and only if, the job is currently unclaimed.
    fn claim_job(&mut self, ctx: &JobContext) -> Result<u64, StoreError>;

    /// Clear the claim owner and next-run time of the job.
    fn release_claim(&mut self, ctx: &JobContext) -> Result<u64, StoreError>;

    fn allocate_job_log_id(&mut self) -> Result<JobLogId, StoreError>;

    fn insert_job_log(
        &mut self,
        ctx: &JobContext,
        id: JobLogId,
        status: RunStatus,
    ) -> Result<u64, StoreError>;

    /// Write the terminal status and set duration to `now - start`.
    fn finish_job_log(&mut self, id: JobLogId, status: RunStatus) -> Result<u64, StoreError>;

    /// Identity the catalog attributes writes to.
    fn current_user(&mut self) -> Result<String, StoreError>;

    /// JSON snapshot of the job row, if it exists.
    fn job_snapshot(&mut self, ctx: &JobContext) -> Result<Option<serde_json::Value>, StoreError>;

    fn record_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Prerequisite job ids of the job.
    fn prerequisites(&mut self, ctx: &JobContext) -> Result<Vec<JobId>, StoreError>;

    /// Status of the most recent job log of `job_id`, if it ever ran.
    fn latest_status(&mut self, job_id: JobId) -> Result<Option<RunStatus>, StoreError>;

    /// Enabled steps of the job, ordered by `(name, id)`.
    fn enabled_steps(&mut self, ctx: &JobContext) -> Result<Vec<Step>, StoreError>;

    fn allocate_step_log_id(&mut self) -> Result<StepLogId, StoreError>;

    /// Insert a running step log; affects zero rows if the step no longer exists.
    fn insert_step_log(
        &mut self,
        id: StepLogId,
        job_log_id: JobLogId,
        step_id: StepId,
    ) -> Result<u64, StoreError>;

    fn finish_step_log(
        &mut self,
        id: StepLogId,
        update: &StepLogUpdate<'_>,
    ) -> Result<u64, StoreError>;
}

/// Source of catalog connections.
pub trait CatalogPool: Send + Sync {
    type Conn: Catalog;

    fn acquire(&self) -> Result<Self::Conn, StoreError>;

    /// Leave an internal-error job log for a job that could not even be
    /// launched. Must not depend on [`CatalogPool::acquire`] succeeding.
    fn record_launch_failure(&self, job_id: JobId) -> Result<(), StoreError>;
}

impl<P> CatalogPool for Arc<P>
where
    P: CatalogPool + ?Sized,
{
    type Conn = P::Conn;

    fn acquire(&self) -> Result<Self::Conn, StoreError> {
        (**self).acquire()
    }

    fn record_launch_failure(&self, job_id: JobId) -> Result<(), StoreError> {
        (**self).record_launch_failure(job_id)
    }
}

/// A connection scoped to one SQL step's target database.
pub trait StepSession {
    /// Run `sql` as one command. On failure the error text is returned as-is.
    fn execute(&mut self, sql: &str) -> Result<u64, String>;
}

/// Factory for SQL step connections.
pub trait StepDatabases: Send + Sync {
    fn connect(&self, target: &SqlTarget) -> Result<Box<dyn StepSession + '_>, StoreError>;
}

impl<D> StepDatabases for Arc<D>
where
    D: StepDatabases + ?Sized,
{
    fn connect(&self, target: &SqlTarget) -> Result<Box<dyn StepSession + '_>, StoreError> {
        (**self).connect(target)
    }
}

//! Job runner: one claimed run of one job.

use tracing::{debug, info, warn};

use jobagent_core::{JobContext, JobLogId, RunStatus, Step, sort_steps};
use jobagent_events::{EventBus, NotifyTarget, Phase, StatusEvent};

use super::RunError;
use super::dependencies;
use crate::db::{AuditEntry, Catalog, StepDatabases, StepLogUpdate};
use crate::executor::{Dispatch, StepExecutor};
use crate::notify::Notifier;

const INVALID_STEP_TYPE: &str = "Invalid step type";

/// Drives one run of a job over a held catalog connection.
///
/// [`JobRunner::start`] claims the job and opens its job log. Whenever a log
/// was opened, finalization (completion audit, closing the log, releasing the
/// claim) happens exactly once: in [`JobRunner::finish`], or on drop if the
/// runner goes away some other way. The catalog connection is released at
/// that point as well.
pub struct JobRunner<'a, C, D, B>
where
    C: Catalog,
    D: StepDatabases,
    B: EventBus<StatusEvent>,
{
    ctx: JobContext,
    conn: Option<C>,
    executor: &'a StepExecutor<D>,
    notifier: &'a Notifier<B>,
    log_id: Option<JobLogId>,
    status: Option<RunStatus>,
    finalized: bool,
}

impl<'a, C, D, B> JobRunner<'a, C, D, B>
where
    C: Catalog,
    D: StepDatabases,
    B: EventBus<StatusEvent>,
{
    /// Claim the job and open a running job log.
    ///
    /// If the claim is not won the runner is not runnable and no log exists.
    pub fn start(
        ctx: JobContext,
        mut conn: C,
        executor: &'a StepExecutor<D>,
        notifier: &'a Notifier<B>,
    ) -> Self {
        let job = NotifyTarget::Job(ctx.job_id);
        notifier.notify(job, Phase::Starting, format!("Job {} starting", ctx.job_id));

        let log_id = match conn.claim_job(&ctx) {
            Ok(1) => open_log(&mut conn, &ctx),
            Ok(_) => {
                debug!(job_id = %ctx.job_id, "job already claimed, skipping");
                None
            }
            Err(e) => {
                warn!(job_id = %ctx.job_id, error = %e, "failed to claim job");
                None
            }
        };

        let status = log_id.map(|log_id| {
            info!(job_id = %ctx.job_id, job_log_id = %log_id, "job running");
            notifier.notify(job, Phase::Running, format!("Job {} running", ctx.job_id));
            RunStatus::Running
        });

        Self {
            ctx,
            conn: Some(conn),
            executor,
            notifier,
            log_id,
            status,
            finalized: false,
        }
    }

    /// `None` until a log is opened.
    pub fn status(&self) -> Option<RunStatus> {
        self.status
    }

    /// The claim was won and a job log is open.
    pub fn is_runnable(&self) -> bool {
        !self.finalized && self.log_id.is_some() && self.status == Some(RunStatus::Running)
    }

    /// Verify every prerequisite's latest run succeeded.
    ///
    /// An unmet prerequisite blocks the job; a catalog error is an internal
    /// error. Both are notified as failures.
    pub fn check_dependencies(&mut self) -> Result<(), RunError> {
        let conn = match self.conn.as_mut() {
            Some(conn) if self.log_id.is_some() => conn,
            _ => return Err(RunError::NotClaimed),
        };

        let result = dependencies::check_dependencies(conn, &self.ctx);
        if let Err(e) = &result {
            warn!(job_id = %self.ctx.job_id, error = %e, "dependency check failed");
            self.fail(e);
        }
        result
    }

    /// Run the job's enabled steps in `(name, id)` order, stopping at the
    /// first one that does not succeed.
    pub fn execute(&mut self) -> Result<(), RunError> {
        if !self.is_runnable() {
            return Err(RunError::NotClaimed);
        }

        match self.execute_steps() {
            Ok(()) => {
                self.status = Some(RunStatus::Success);
                self.notifier.notify(
                    NotifyTarget::Job(self.ctx.job_id),
                    Phase::Success,
                    format!("Job {} completed successfully", self.ctx.job_id),
                );
                Ok(())
            }
            Err(e) => {
                warn!(job_id = %self.ctx.job_id, error = %e, "job execution failed");
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Finalize now and return the recorded status (`None` if no log was opened).
    pub fn finish(mut self) -> Option<RunStatus> {
        self.finalize();
        self.status
    }

    fn fail(&mut self, err: &RunError) {
        self.status = Some(err.status());
        self.notifier.notify(
            NotifyTarget::Job(self.ctx.job_id),
            Phase::Failed,
            err.to_string(),
        );
    }

    fn execute_steps(&mut self) -> Result<(), RunError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(RunError::NotClaimed);
        };
        let mut steps = conn.enabled_steps(&self.ctx)?;
        if steps.is_empty() {
            return Err(RunError::NoSteps);
        }
        sort_steps(&mut steps);

        for step in &steps {
            self.run_step(step)?;
        }
        Ok(())
    }

    fn run_step(&mut self, step: &Step) -> Result<(), RunError> {
        let ctx = self.ctx;
        let (Some(conn), Some(log_id)) = (self.conn.as_mut(), self.log_id) else {
            return Err(RunError::NotClaimed);
        };

        let step_log_id = conn.allocate_step_log_id()?;
        if conn.insert_step_log(step_log_id, log_id, step.id)? != 1 {
            return Err(RunError::StepLogNotOpened(step.id));
        }
        self.notifier.notify(
            NotifyTarget::Step(ctx.job_id, step.id),
            Phase::Started,
            format!("JobStep {} started for Job {}", step.id, ctx.job_id),
        );

        let outcome = match self.executor.run(&ctx, step) {
            Dispatch::Completed(outcome) => outcome,
            Dispatch::UnknownKind(kind) => {
                let update = StepLogUpdate {
                    status: RunStatus::Failed,
                    result: -1,
                    output: INVALID_STEP_TYPE,
                };
                if let Err(e) = conn.finish_step_log(step_log_id, &update) {
                    warn!(step_id = %step.id, error = %e, "failed to close step log");
                }
                return Err(RunError::UnknownStepKind {
                    step: step.id,
                    kind,
                });
            }
        };

        debug!(
            job_id = %ctx.job_id,
            step_id = %step.id,
            result = outcome.result,
            succeeded = outcome.succeeded,
            "step finished"
        );

        let update = StepLogUpdate {
            status: outcome.status(),
            result: outcome.result,
            output: &outcome.output,
        };
        let recorded = match conn.finish_step_log(step_log_id, &update) {
            Ok(1) => None,
            Ok(rows) => Some(format!("step log update affected {rows} rows")),
            Err(e) => Some(e.to_string()),
        };

        match recorded {
            Some(reason) => Err(RunError::StepFailed {
                step: step.id,
                output: format!("could not record step outcome: {reason}"),
                on_error: step.on_error,
            }),
            None if !outcome.succeeded => Err(RunError::StepFailed {
                step: step.id,
                output: outcome.output.trim().to_string(),
                on_error: step.on_error,
            }),
            None => Ok(()),
        }
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let Some(log_id) = self.log_id else {
            return;
        };

        let status = match self.status {
            Some(status) if status.is_terminal() => status,
            _ => RunStatus::InternalError,
        };
        self.status = Some(status);

        let ctx = self.ctx;
        let user = conn.current_user().unwrap_or_else(|e| {
            warn!(job_id = %ctx.job_id, error = %e, "failed to read acting user");
            String::new()
        });
        let snapshot = conn.job_snapshot(&ctx).unwrap_or_else(|e| {
            warn!(job_id = %ctx.job_id, error = %e, "failed to snapshot job");
            None
        });
        let audit = AuditEntry::execute(
            ctx.job_id,
            user,
            snapshot,
            format!("Job execution completed with status: {}", status.as_code()),
        );
        if let Err(e) = conn.record_audit(&audit) {
            warn!(job_id = %ctx.job_id, error = %e, "failed to record completion audit");
        }

        match conn.finish_job_log(log_id, status) {
            Ok(1) => {}
            Ok(rows) => warn!(job_log_id = %log_id, rows, "job log update matched no single row"),
            Err(e) => warn!(job_log_id = %log_id, error = %e, "failed to close job log"),
        }
        match conn.release_claim(&ctx) {
            Ok(1) => {}
            Ok(rows) => warn!(job_id = %ctx.job_id, rows, "claim was not held at release"),
            Err(e) => warn!(job_id = %ctx.job_id, error = %e, "failed to release claim"),
        }
        drop(conn);

        info!(job_id = %ctx.job_id, job_log_id = %log_id, status = %status, "job completed");
        self.notifier.notify(
            NotifyTarget::Job(ctx.job_id),
            Phase::Completed,
            format!("Job {} completed with status {}", ctx.job_id, status),
        );
    }
}

impl<C, D, B> Drop for JobRunner<'_, C, D, B>
where
    C: Catalog,
    D: StepDatabases,
    B: EventBus<StatusEvent>,
{
    fn drop(&mut self) {
        self.finalize();
    }
}

/// Allocate and insert a running job log, with the start audit entry.
///
/// Gives up the claim again if the log cannot be opened.
fn open_log<C: Catalog>(conn: &mut C, ctx: &JobContext) -> Option<JobLogId> {
    let opened = conn
        .allocate_job_log_id()
        .and_then(|id| Ok((id, conn.insert_job_log(ctx, id, RunStatus::Running)?)));
    match opened {
        Ok((id, 1)) => {
            record_start(conn, ctx);
            Some(id)
        }
        Ok((id, rows)) => {
            warn!(job_id = %ctx.job_id, job_log_id = %id, rows, "job log insert matched no single row");
            release(conn, ctx);
            None
        }
        Err(e) => {
            warn!(job_id = %ctx.job_id, error = %e, "failed to open job log");
            release(conn, ctx);
            None
        }
    }
}

fn record_start<C: Catalog>(conn: &mut C, ctx: &JobContext) {
    let user = conn.current_user().unwrap_or_else(|e| {
        warn!(job_id = %ctx.job_id, error = %e, "failed to read acting user");
        String::new()
    });
    let snapshot = conn.job_snapshot(ctx).unwrap_or_else(|e| {
        warn!(job_id = %ctx.job_id, error = %e, "failed to snapshot job");
        None
    });
    let audit = AuditEntry::execute(ctx.job_id, user, snapshot, "Job execution started");
    if let Err(e) = conn.record_audit(&audit) {
        warn!(job_id = %ctx.job_id, error = %e, "failed to record start audit");
    }
}

fn release<C: Catalog>(conn: &mut C, ctx: &JobContext) {
    if let Err(e) = conn.release_claim(ctx) {
        warn!(job_id = %ctx.job_id, error = %e, "failed to release claim");
    }
}

//! Job thread: the per-job entry point used by the scheduler.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use jobagent_core::{JobContext, JobId, RunStatus};
use jobagent_events::{EventBus, NotifyTarget, Phase, StatusEvent};

use super::{AgentServices, JobRunner};
use crate::db::{CatalogPool, StepDatabases};

/// Runs one job once, on the calling thread or on a thread of its own.
///
/// Every outcome, including panics inside the run, resolves to a
/// [`RunStatus`]; nothing propagates to the caller.
pub struct JobThread<P, D, B> {
    job_id: JobId,
    services: Arc<AgentServices<P, D, B>>,
}

impl<P, D, B> JobThread<P, D, B>
where
    P: CatalogPool + 'static,
    D: StepDatabases + 'static,
    B: EventBus<StatusEvent> + 'static,
{
    pub fn new(job_id: JobId, services: Arc<AgentServices<P, D, B>>) -> Self {
        Self { job_id, services }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Run the job on a new named thread.
    pub fn spawn(self) -> io::Result<JoinHandle<RunStatus>> {
        thread::Builder::new()
            .name(format!("job-{}", self.job_id))
            .spawn(move || self.run())
    }

    /// Run the job to a terminal status.
    ///
    /// `Blocked` is returned both for unmet prerequisites and when another
    /// agent holds the claim; in the latter case nothing was recorded.
    pub fn run(&self) -> RunStatus {
        self.services.email.flush_pending();

        let status = match panic::catch_unwind(AssertUnwindSafe(|| self.drive())) {
            Ok(status) => status,
            Err(_) => {
                error!(job_id = %self.job_id, "job thread panicked");
                self.services.notifier.notify(
                    NotifyTarget::Job(self.job_id),
                    Phase::Failed,
                    format!("Job {} aborted unexpectedly", self.job_id),
                );
                RunStatus::InternalError
            }
        };

        self.services.email.flush_pending();
        status
    }

    fn drive(&self) -> RunStatus {
        let services = &*self.services;
        let ctx = JobContext::new(services.agent_id, self.job_id);

        let conn = match services.pool.acquire() {
            Ok(conn) => conn,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "no catalog connection, job not launched");
                if let Err(e) = services.pool.record_launch_failure(self.job_id) {
                    error!(job_id = %self.job_id, error = %e, "failed to record launch failure");
                }
                services.notifier.notify(
                    NotifyTarget::Job(self.job_id),
                    Phase::Failed,
                    format!("Failed to launch job {}: {e}", self.job_id),
                );
                return RunStatus::InternalError;
            }
        };

        let mut runner = JobRunner::start(ctx, conn, &services.executor, &services.notifier);
        if runner.is_runnable() {
            let outcome = runner
                .check_dependencies()
                .and_then(|()| runner.execute());
            if let Err(e) = outcome {
                info!(job_id = %self.job_id, error = %e, "job did not succeed");
            }
        } else {
            debug!(job_id = %self.job_id, "job not runnable this cycle");
        }

        runner.finish().unwrap_or(RunStatus::Blocked)
    }
}

impl<P, D, B> std::fmt::Debug for JobThread<P, D, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobThread")
            .field("job_id", &self.job_id)
            .field("services", &self.services)
            .finish()
    }
}

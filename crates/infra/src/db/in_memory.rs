//! In-memory catalog for tests/dev.
//!
//! Mirrors the row-count semantics of the relational catalog: the claim is a
//! compare-and-set under one lock, so exactly one concurrent claimer sees an
//! affected row count of 1.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use jobagent_core::{
    Dependency, Job, JobContext, JobId, JobLog, JobLogId, RunStatus, SqlTarget, Step, StepId,
    StepLog, StepLogId, sort_steps,
};

use super::{
    AuditEntry, Catalog, CatalogPool, StepDatabases, StepLogUpdate, StepSession, StoreError,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct CatalogState {
    jobs: BTreeMap<JobId, Job>,
    steps: Vec<Step>,
    dependencies: Vec<Dependency>,
    job_logs: BTreeMap<JobLogId, JobLog>,
    step_logs: BTreeMap<StepLogId, StepLog>,
    audit: Vec<AuditEntry>,
    next_job_log_id: i64,
    next_step_log_id: i64,
}

impl CatalogState {
    fn next_job_log_id(&mut self) -> JobLogId {
        self.next_job_log_id += 1;
        JobLogId::new(self.next_job_log_id)
    }

    fn next_step_log_id(&mut self) -> StepLogId {
        self.next_step_log_id += 1;
        StepLogId::new(self.next_step_log_id)
    }
}

#[derive(Debug)]
struct Inner {
    state: Mutex<CatalogState>,
    capacity: Option<usize>,
    in_use: AtomicUsize,
    user: String,
    faults: Mutex<HashSet<&'static str>>,
}

/// In-memory catalog and connection pool.
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone)]
pub struct InMemoryCatalog {
    inner: Arc<Inner>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Pool that hands out at most `capacity` concurrent connections.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(Some(capacity))
    }

    fn build(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CatalogState::default()),
                capacity,
                in_use: AtomicUsize::new(0),
                user: "jobagent".to_string(),
                faults: Mutex::new(HashSet::new()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        lock(&self.inner.state)
    }

    pub fn add_job(&self, job: Job) {
        self.state().jobs.insert(job.id, job);
    }

    pub fn add_step(&self, step: Step) {
        self.state().steps.push(step);
    }

    pub fn add_dependency(&self, job_id: JobId, prerequisite: JobId) {
        self.state().dependencies.push(Dependency {
            job_id,
            prerequisite,
        });
    }

    /// Record a finished past run of `job_id` (e.g. a prerequisite's history).
    pub fn add_job_log(&self, job_id: JobId, status: RunStatus) -> JobLogId {
        let mut state = self.state();
        let id = state.next_job_log_id();
        state.job_logs.insert(
            id,
            JobLog {
                id,
                job_id,
                status,
                started_at: Utc::now(),
                duration: Some(chrono::Duration::zero()),
            },
        );
        id
    }

    /// Make every subsequent call of the named operation fail.
    pub fn fail_operation(&self, operation: &'static str) {
        lock(&self.inner.faults).insert(operation);
    }

    pub fn job(&self, job_id: JobId) -> Option<Job> {
        self.state().jobs.get(&job_id).cloned()
    }

    pub fn job_logs(&self, job_id: JobId) -> Vec<JobLog> {
        self.state()
            .job_logs
            .values()
            .filter(|l| l.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn step_logs(&self, job_log_id: JobLogId) -> Vec<StepLog> {
        self.state()
            .step_logs
            .values()
            .filter(|l| l.job_log_id == job_log_id)
            .cloned()
            .collect()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state().audit.clone()
    }

    /// Connections currently handed out.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::SeqCst)
    }

    fn check_fault(&self, operation: &'static str) -> Result<(), StoreError> {
        if lock(&self.inner.faults).contains(operation) {
            return Err(StoreError::query(operation, "injected failure"));
        }
        Ok(())
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogPool for InMemoryCatalog {
    type Conn = InMemoryConnection;

    fn acquire(&self) -> Result<Self::Conn, StoreError> {
        self.check_fault("acquire")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let capacity = self.inner.capacity;
        self.inner
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match capacity {
                Some(max) if n >= max => None,
                _ => Some(n + 1),
            })
            .map_err(|n| StoreError::Unavailable(format!("pool exhausted ({n} connections in use)")))?;

        Ok(InMemoryConnection {
            catalog: self.clone(),
        })
    }

    fn record_launch_failure(&self, job_id: JobId) -> Result<(), StoreError> {
        self.check_fault("record_launch_failure")?;
        self.add_job_log(job_id, RunStatus::InternalError);
        Ok(())
    }
}

/// A pooled in-memory connection; returns its slot on drop.
#[derive(Debug)]
pub struct InMemoryConnection {
    catalog: InMemoryCatalog,
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.catalog.inner.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Catalog for InMemoryConnection {
    fn claim_job(&mut self, ctx: &JobContext) -> Result<u64, StoreError> {
        self.catalog.check_fault("claim_job")?;
        let mut state = self.catalog.state();
        match state.jobs.get_mut(&ctx.job_id) {
            Some(job) if job.agent_id.is_none() => {
                job.agent_id = Some(ctx.agent_id);
                job.last_run = Some(Utc::now());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn release_claim(&mut self, ctx: &JobContext) -> Result<u64, StoreError> {
        self.catalog.check_fault("release_claim")?;
        let mut state = self.catalog.state();
        match state.jobs.get_mut(&ctx.job_id) {
            Some(job) if job.agent_id == Some(ctx.agent_id) => {
                job.agent_id = None;
                job.next_run = None;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn allocate_job_log_id(&mut self) -> Result<JobLogId, StoreError> {
        self.catalog.check_fault("allocate_job_log_id")?;
        Ok(self.catalog.state().next_job_log_id())
    }

    fn insert_job_log(
        &mut self,
        ctx: &JobContext,
        id: JobLogId,
        status: RunStatus,
    ) -> Result<u64, StoreError> {
        self.catalog.check_fault("insert_job_log")?;
        let mut state = self.catalog.state();
        if state.job_logs.contains_key(&id) {
            return Err(StoreError::query("insert_job_log", format!("duplicate job log id {id}")));
        }
        state.job_logs.insert(
            id,
            JobLog {
                id,
                job_id: ctx.job_id,
                status,
                started_at: Utc::now(),
                duration: None,
            },
        );
        Ok(1)
    }

    fn finish_job_log(&mut self, id: JobLogId, status: RunStatus) -> Result<u64, StoreError> {
        self.catalog.check_fault("finish_job_log")?;
        let mut state = self.catalog.state();
        match state.job_logs.get_mut(&id) {
            Some(log) => {
                log.status = status;
                log.duration = Some(Utc::now() - log.started_at);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn current_user(&mut self) -> Result<String, StoreError> {
        self.catalog.check_fault("current_user")?;
        Ok(self.catalog.inner.user.clone())
    }

    fn job_snapshot(&mut self, ctx: &JobContext) -> Result<Option<serde_json::Value>, StoreError> {
        self.catalog.check_fault("job_snapshot")?;
        let state = self.catalog.state();
        state
            .jobs
            .get(&ctx.job_id)
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn record_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.catalog.check_fault("record_audit")?;
        self.catalog.state().audit.push(entry.clone());
        Ok(())
    }

    fn prerequisites(&mut self, ctx: &JobContext) -> Result<Vec<JobId>, StoreError> {
        self.catalog.check_fault("prerequisites")?;
        Ok(self
            .catalog
            .state()
            .dependencies
            .iter()
            .filter(|d| d.job_id == ctx.job_id)
            .map(|d| d.prerequisite)
            .collect())
    }

    fn latest_status(&mut self, job_id: JobId) -> Result<Option<RunStatus>, StoreError> {
        self.catalog.check_fault("latest_status")?;
        Ok(self
            .catalog
            .state()
            .job_logs
            .values()
            .filter(|l| l.job_id == job_id)
            .max_by_key(|l| (l.started_at, l.id))
            .map(|l| l.status))
    }

    fn enabled_steps(&mut self, ctx: &JobContext) -> Result<Vec<Step>, StoreError> {
        self.catalog.check_fault("enabled_steps")?;
        let mut steps: Vec<Step> = self
            .catalog
            .state()
            .steps
            .iter()
            .filter(|s| s.job_id == ctx.job_id && s.enabled)
            .cloned()
            .collect();
        sort_steps(&mut steps);
        Ok(steps)
    }

    fn allocate_step_log_id(&mut self) -> Result<StepLogId, StoreError> {
        self.catalog.check_fault("allocate_step_log_id")?;
        Ok(self.catalog.state().next_step_log_id())
    }

    fn insert_step_log(
        &mut self,
        id: StepLogId,
        job_log_id: JobLogId,
        step_id: StepId,
    ) -> Result<u64, StoreError> {
        self.catalog.check_fault("insert_step_log")?;
        let mut state = self.catalog.state();
        if !state.steps.iter().any(|s| s.id == step_id) {
            return Ok(0);
        }
        state.step_logs.insert(
            id,
            StepLog {
                id,
                job_log_id,
                step_id,
                status: RunStatus::Running,
                started_at: Utc::now(),
                result: None,
                duration: None,
                output: None,
            },
        );
        Ok(1)
    }

    fn finish_step_log(
        &mut self,
        id: StepLogId,
        update: &StepLogUpdate<'_>,
    ) -> Result<u64, StoreError> {
        self.catalog.check_fault("finish_step_log")?;
        let mut state = self.catalog.state();
        match state.step_logs.get_mut(&id) {
            Some(log) => {
                log.status = update.status;
                log.result = Some(update.result);
                log.output = Some(update.output.to_string());
                log.duration = Some(Utc::now() - log.started_at);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

/// In-memory stand-in for SQL step target databases.
///
/// Every statement succeeds (affecting one row) unless registered with
/// [`InMemoryStepDatabases::fail_statement`].
#[derive(Debug, Default)]
pub struct InMemoryStepDatabases {
    failures: Mutex<HashMap<String, String>>,
    unreachable: Mutex<HashSet<String>>,
    executed: Mutex<Vec<(String, String)>>,
    open_sessions: AtomicUsize,
}

impl InMemoryStepDatabases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executing `sql` (trimmed) reports `error` as the database error text.
    pub fn fail_statement(&self, sql: impl Into<String>, error: impl Into<String>) {
        lock(&self.failures).insert(sql.into().trim().to_string(), error.into());
    }

    /// Connecting to `target` fails.
    pub fn make_unreachable(&self, target: &SqlTarget) {
        lock(&self.unreachable).insert(target.key());
    }

    /// `(target key, statement)` pairs in execution order.
    pub fn executed(&self) -> Vec<(String, String)> {
        lock(&self.executed).clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

impl StepDatabases for InMemoryStepDatabases {
    fn connect(&self, target: &SqlTarget) -> Result<Box<dyn StepSession + '_>, StoreError> {
        let key = target.key();
        if lock(&self.unreachable).contains(&key) {
            return Err(StoreError::Unavailable(format!("cannot reach {key}")));
        }
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryStepSession {
            databases: self,
            target: key,
        }))
    }
}

struct InMemoryStepSession<'a> {
    databases: &'a InMemoryStepDatabases,
    target: String,
}

impl StepSession for InMemoryStepSession<'_> {
    fn execute(&mut self, sql: &str) -> Result<u64, String> {
        lock(&self.databases.executed).push((self.target.clone(), sql.to_string()));
        match lock(&self.databases.failures).get(sql.trim()) {
            Some(error) => Err(error.clone()),
            None => Ok(1),
        }
    }
}

impl Drop for InMemoryStepSession<'_> {
    fn drop(&mut self) {
        self.databases.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobagent_core::AgentId;

    fn ctx(agent: i64, job: i64) -> JobContext {
        JobContext::new(AgentId::new(agent), JobId::new(job))
    }

    #[test]
    fn claim_only_succeeds_when_unclaimed() {
        let catalog = InMemoryCatalog::new();
        catalog.add_job(Job::new(JobId::new(1), "nightly"));

        let mut conn = catalog.acquire().unwrap();
        assert_eq!(conn.claim_job(&ctx(10, 1)).unwrap(), 1);
        assert_eq!(conn.claim_job(&ctx(11, 1)).unwrap(), 0);
        assert_eq!(catalog.job(JobId::new(1)).unwrap().agent_id, Some(AgentId::new(10)));

        assert_eq!(conn.release_claim(&ctx(10, 1)).unwrap(), 1);
        assert!(!catalog.job(JobId::new(1)).unwrap().is_claimed());
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let catalog = InMemoryCatalog::new();
        catalog.add_job(Job::new(JobId::new(7), "contended"));

        let handles: Vec<_> = (0..8)
            .map(|agent| {
                let catalog = catalog.clone();
                std::thread::spawn(move || {
                    let mut conn = catalog.acquire().unwrap();
                    conn.claim_job(&ctx(agent, 7)).unwrap()
                })
            })
            .collect();

        let won: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(won, 1);
    }

    #[test]
    fn capacity_limits_and_releases_connections() {
        let catalog = InMemoryCatalog::with_capacity(1);
        let first = catalog.acquire().unwrap();
        assert!(matches!(catalog.acquire(), Err(StoreError::Unavailable(_))));

        drop(first);
        assert_eq!(catalog.in_use(), 0);
        assert!(catalog.acquire().is_ok());
    }

    #[test]
    fn latest_status_uses_most_recent_log() {
        let catalog = InMemoryCatalog::new();
        catalog.add_job_log(JobId::new(2), RunStatus::Failed);
        catalog.add_job_log(JobId::new(2), RunStatus::Success);

        let mut conn = catalog.acquire().unwrap();
        assert_eq!(conn.latest_status(JobId::new(2)).unwrap(), Some(RunStatus::Success));
        assert_eq!(conn.latest_status(JobId::new(3)).unwrap(), None);
    }

    #[test]
    fn scripted_sql_failures() {
        let dbs = InMemoryStepDatabases::new();
        dbs.fail_statement("SELECT broken", "syntax error at or near \"broken\"");

        {
            let mut session = dbs.connect(&SqlTarget::database("app")).unwrap();
            assert_eq!(session.execute("SELECT 1"), Ok(1));
            assert_eq!(
                session.execute(" SELECT broken "),
                Err("syntax error at or near \"broken\"".to_string())
            );
            assert_eq!(dbs.open_sessions(), 1);
        }

        assert_eq!(dbs.open_sessions(), 0);
        assert_eq!(dbs.executed().len(), 2);
    }
}

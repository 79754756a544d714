//! Postgres-backed catalog and SQL step targets.
//!
//! The execution core is synchronous: each job runs on its own OS thread and
//! blocks on database round-trips. SQLx is async, so every operation is driven
//! through a `tokio::runtime::Handle` owned by the adapter. Callers must be on
//! a plain thread (never inside a runtime worker), which is what the job thread
//! provides. SQLx spawns background tasks when pooled connections are
//! created or returned, so the adapters also enter the runtime whenever a pool
//! or pooled connection is created or dropped on a job thread.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | `PoolTimedOut`, `PoolClosed`, `Io`, `Tls` | `Unavailable` |
//! | `RowNotFound` | `NotFound` |
//! | `Database` (any code) | `Query` with the server's message |
//! | other | `Query` |

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Connection, FromRow, PgConnection, PgPool, Postgres, Row};
use tokio::runtime::Handle;
use tracing::{debug, instrument};

use jobagent_core::{
    JobContext, JobId, JobLogId, OnError, RunStatus, SqlTarget, Step, StepId, StepKind,
    StepLogId,
};

use super::{
    AuditEntry, Catalog, CatalogPool, StepDatabases, StepLogUpdate, StepSession, StoreError,
};

const SCHEMA: &str = include_str!("../../migrations/0001_jobagent.sql");

/// Postgres catalog pool.
///
/// Cloning is cheap (`PgPool` is reference counted).
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
    handle: Handle,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }

    /// Open a pool of at most `max_connections` catalog connections.
    pub fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        handle: Handle,
    ) -> Result<Self, StoreError> {
        let pool = handle
            .block_on(
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(database_url),
            )
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, handle))
    }

    /// Apply the bundled catalog schema (idempotent).
    pub fn migrate(&self) -> Result<(), StoreError> {
        self.handle
            .block_on(sqlx::raw_sql(SCHEMA).execute(&self.pool))
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connect options of the catalog pool, reused as the base for SQL step targets.
    pub fn connect_options(&self) -> PgConnectOptions {
        (*self.pool.connect_options()).clone()
    }
}

impl CatalogPool for PostgresCatalog {
    type Conn = PostgresConnection;

    fn acquire(&self) -> Result<Self::Conn, StoreError> {
        let conn = self
            .handle
            .block_on(self.pool.acquire())
            .map_err(|e| map_sqlx_error("acquire", e))?;
        Ok(PostgresConnection {
            conn: Some(conn),
            handle: self.handle.clone(),
        })
    }

    fn record_launch_failure(&self, job_id: JobId) -> Result<(), StoreError> {
        // Dedicated connection: the pool is what just failed us.
        let options = self.connect_options();
        self.handle.block_on(async move {
            let mut conn = PgConnection::connect_with(&options)
                .await
                .map_err(|e| map_sqlx_error("record_launch_failure", e))?;
            sqlx::query("INSERT INTO jobagent.job_log (job_id, status) VALUES ($1, $2)")
                .bind(job_id.get())
                .bind(RunStatus::InternalError.as_code())
                .execute(&mut conn)
                .await
                .map_err(|e| map_sqlx_error("record_launch_failure", e))?;
            conn.close()
                .await
                .map_err(|e| map_sqlx_error("record_launch_failure", e))
        })
    }
}

/// A pooled catalog connection; returned to the pool on drop.
#[derive(Debug)]
pub struct PostgresConnection {
    conn: Option<PoolConnection<Postgres>>,
    handle: Handle,
}

impl PostgresConnection {
    fn parts(&mut self) -> Result<(&mut PgConnection, &Handle), StoreError> {
        match self.conn.as_mut() {
            Some(conn) => Ok((&mut **conn, &self.handle)),
            None => Err(StoreError::Unavailable("connection already released".to_string())),
        }
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        let _runtime = self.handle.enter();
        drop(self.conn.take());
    }
}

impl Catalog for PostgresConnection {
    fn claim_job(&mut self, ctx: &JobContext) -> Result<u64, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::claim_job(conn, ctx))
    }

    fn release_claim(&mut self, ctx: &JobContext) -> Result<u64, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::release_claim(conn, ctx))
    }

    fn allocate_job_log_id(&mut self) -> Result<JobLogId, StoreError> {
        let (conn, handle) = self.parts()?;
        handle
            .block_on(queries::next_id(conn, "jobagent.job_log_log_id_seq"))
            .map(JobLogId::new)
    }

    fn insert_job_log(
        &mut self,
        ctx: &JobContext,
        id: JobLogId,
        status: RunStatus,
    ) -> Result<u64, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::insert_job_log(conn, ctx, id, status))
    }

    fn finish_job_log(&mut self, id: JobLogId, status: RunStatus) -> Result<u64, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::finish_job_log(conn, id, status))
    }

    fn current_user(&mut self) -> Result<String, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::current_user(conn))
    }

    fn job_snapshot(&mut self, ctx: &JobContext) -> Result<Option<serde_json::Value>, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::job_snapshot(conn, ctx))
    }

    fn record_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::record_audit(conn, entry))
    }

    fn prerequisites(&mut self, ctx: &JobContext) -> Result<Vec<JobId>, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::prerequisites(conn, ctx))
    }

    fn latest_status(&mut self, job_id: JobId) -> Result<Option<RunStatus>, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::latest_status(conn, job_id))
    }

    fn enabled_steps(&mut self, ctx: &JobContext) -> Result<Vec<Step>, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::enabled_steps(conn, ctx))
    }

    fn allocate_step_log_id(&mut self) -> Result<StepLogId, StoreError> {
        let (conn, handle) = self.parts()?;
        handle
            .block_on(queries::next_id(conn, "jobagent.step_log_step_log_id_seq"))
            .map(StepLogId::new)
    }

    fn insert_step_log(
        &mut self,
        id: StepLogId,
        job_log_id: JobLogId,
        step_id: StepId,
    ) -> Result<u64, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::insert_step_log(conn, id, job_log_id, step_id))
    }

    fn finish_step_log(
        &mut self,
        id: StepLogId,
        update: &StepLogUpdate<'_>,
    ) -> Result<u64, StoreError> {
        let (conn, handle) = self.parts()?;
        handle.block_on(queries::finish_step_log(conn, id, update))
    }
}

mod queries {
    use super::*;

    #[instrument(skip(conn), fields(job_id = %ctx.job_id, agent_id = %ctx.agent_id), err)]
    pub(super) async fn claim_job(
        conn: &mut PgConnection,
        ctx: &JobContext,
    ) -> Result<u64, StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE jobagent.job
               SET agent_id = $1, last_run = now()
             WHERE agent_id IS NULL AND job_id = $2
            "#,
        )
        .bind(ctx.agent_id.get())
        .bind(ctx.job_id.get())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("claim_job", e))?;
        Ok(done.rows_affected())
    }

    #[instrument(skip(conn), fields(job_id = %ctx.job_id), err)]
    pub(super) async fn release_claim(
        conn: &mut PgConnection,
        ctx: &JobContext,
    ) -> Result<u64, StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE jobagent.job
               SET agent_id = NULL, next_run = NULL
             WHERE job_id = $1 AND agent_id = $2
            "#,
        )
        .bind(ctx.job_id.get())
        .bind(ctx.agent_id.get())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("release_claim", e))?;
        Ok(done.rows_affected())
    }

    pub(super) async fn next_id(
        conn: &mut PgConnection,
        sequence: &'static str,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT nextval($1::regclass) AS id")
            .bind(sequence)
            .fetch_one(conn)
            .await
            .map_err(|e| map_sqlx_error("next_id", e))?;
        row.try_get("id")
            .map_err(|e| StoreError::Decode(format!("failed to read id: {e}")))
    }

    #[instrument(skip(conn), fields(job_id = %ctx.job_id, job_log_id = %id), err)]
    pub(super) async fn insert_job_log(
        conn: &mut PgConnection,
        ctx: &JobContext,
        id: JobLogId,
        status: RunStatus,
    ) -> Result<u64, StoreError> {
        let done = sqlx::query(
            "INSERT INTO jobagent.job_log (log_id, job_id, status) VALUES ($1, $2, $3)",
        )
        .bind(id.get())
        .bind(ctx.job_id.get())
        .bind(status.as_code())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("insert_job_log", e))?;
        Ok(done.rows_affected())
    }

    #[instrument(skip(conn), fields(job_log_id = %id), err)]
    pub(super) async fn finish_job_log(
        conn: &mut PgConnection,
        id: JobLogId,
        status: RunStatus,
    ) -> Result<u64, StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE jobagent.job_log
               SET status = $1, duration = now() - started_at
             WHERE log_id = $2
            "#,
        )
        .bind(status.as_code())
        .bind(id.get())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("finish_job_log", e))?;
        Ok(done.rows_affected())
    }

    pub(super) async fn current_user(conn: &mut PgConnection) -> Result<String, StoreError> {
        let row = sqlx::query("SELECT current_user::text AS name")
            .fetch_one(conn)
            .await
            .map_err(|e| map_sqlx_error("current_user", e))?;
        row.try_get("name")
            .map_err(|e| StoreError::Decode(format!("failed to read current_user: {e}")))
    }

    pub(super) async fn job_snapshot(
        conn: &mut PgConnection,
        ctx: &JobContext,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let row = sqlx::query(
            "SELECT row_to_json(j)::jsonb AS job_state FROM jobagent.job j WHERE j.job_id = $1",
        )
        .bind(ctx.job_id.get())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("job_snapshot", e))?;

        match row {
            Some(row) => row
                .try_get("job_state")
                .map_err(|e| StoreError::Decode(format!("failed to read job_state: {e}"))),
            None => Ok(None),
        }
    }

    #[instrument(skip(conn, entry), fields(job_id = %entry.job_id, operation = %entry.operation), err)]
    pub(super) async fn record_audit(
        conn: &mut PgConnection,
        entry: &AuditEntry,
    ) -> Result<(), StoreError> {
        sqlx::query("SELECT jobagent.log_job_operation($1, $2, $3, $4, $5, $6)")
            .bind(entry.job_id.get())
            .bind(&entry.operation)
            .bind(&entry.user)
            .bind(&entry.old_state)
            .bind(&entry.new_state)
            .bind(&entry.message)
            .execute(conn)
            .await
            .map_err(|e| map_sqlx_error("record_audit", e))?;
        Ok(())
    }

    pub(super) async fn prerequisites(
        conn: &mut PgConnection,
        ctx: &JobContext,
    ) -> Result<Vec<JobId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT prerequisite_job_id
              FROM jobagent.job_dependency
             WHERE job_id = $1
             ORDER BY prerequisite_job_id
            "#,
        )
        .bind(ctx.job_id.get())
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("prerequisites", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<i64, _>("prerequisite_job_id")
                    .map(JobId::new)
                    .map_err(|e| StoreError::Decode(format!("failed to read prerequisite: {e}")))
            })
            .collect()
    }

    pub(super) async fn latest_status(
        conn: &mut PgConnection,
        job_id: JobId,
    ) -> Result<Option<RunStatus>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT status
              FROM jobagent.job_log
             WHERE job_id = $1
             ORDER BY started_at DESC, log_id DESC
             LIMIT 1
            "#,
        )
        .bind(job_id.get())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("latest_status", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let code: String = row
            .try_get("status")
            .map_err(|e| StoreError::Decode(format!("failed to read status: {e}")))?;
        RunStatus::from_code(&code)
            .map(Some)
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    #[instrument(skip(conn), fields(job_id = %ctx.job_id), err)]
    pub(super) async fn enabled_steps(
        conn: &mut PgConnection,
        ctx: &JobContext,
    ) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT step_id, job_id, step_name, enabled, kind, code, db_name, conn_str, on_error
              FROM jobagent.step
             WHERE enabled AND job_id = $1
             ORDER BY step_name, step_id
            "#,
        )
        .bind(ctx.job_id.get())
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("enabled_steps", e))?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in rows {
            let step = StepRow::from_row(&row)
                .map_err(|e| StoreError::Decode(format!("failed to deserialize step row: {e}")))?;
            steps.push(step.try_into()?);
        }
        debug!(step_count = steps.len(), "loaded enabled steps");
        Ok(steps)
    }

    pub(super) async fn insert_step_log(
        conn: &mut PgConnection,
        id: StepLogId,
        job_log_id: JobLogId,
        step_id: StepId,
    ) -> Result<u64, StoreError> {
        let done = sqlx::query(
            r#"
            INSERT INTO jobagent.step_log (step_log_id, job_log_id, step_id, status)
            SELECT $1, $2, step_id, $3
              FROM jobagent.step
             WHERE step_id = $4
            "#,
        )
        .bind(id.get())
        .bind(job_log_id.get())
        .bind(RunStatus::Running.as_code())
        .bind(step_id.get())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("insert_step_log", e))?;
        Ok(done.rows_affected())
    }

    pub(super) async fn finish_step_log(
        conn: &mut PgConnection,
        id: StepLogId,
        update: &StepLogUpdate<'_>,
    ) -> Result<u64, StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE jobagent.step_log
               SET duration = now() - started_at,
                   result = $1,
                   status = $2,
                   output = $3
             WHERE step_log_id = $4
            "#,
        )
        .bind(update.result)
        .bind(update.status.as_code())
        .bind(update.output)
        .bind(id.get())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("finish_step_log", e))?;
        Ok(done.rows_affected())
    }
}

/// Postgres SQL step targets.
///
/// One lazily created pool per distinct target; a target without its own
/// connection string reuses the catalog's connect options with the step's
/// database name swapped in.
#[derive(Debug)]
pub struct PostgresStepDatabases {
    base: PgConnectOptions,
    handle: Handle,
    max_connections: u32,
    acquire_timeout: Duration,
    pools: Mutex<HashMap<String, PgPool>>,
}

impl PostgresStepDatabases {
    pub fn new(base: PgConnectOptions, handle: Handle) -> Self {
        Self {
            base,
            handle,
            max_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn options_for(&self, target: &SqlTarget) -> Result<PgConnectOptions, StoreError> {
        match (target.conn_str.as_deref(), target.db_name.as_deref()) {
            (Some(conn), _) if !conn.trim().is_empty() => conn
                .parse::<PgConnectOptions>()
                .map_err(|e| StoreError::Unavailable(format!("invalid connection string: {e}"))),
            (_, Some(db)) if !db.trim().is_empty() => Ok(self.base.clone().database(db)),
            _ => Ok(self.base.clone()),
        }
    }

    fn pool_for(&self, target: &SqlTarget) -> Result<PgPool, StoreError> {
        let mut pools = self
            .pools
            .lock()
            .map_err(|_| StoreError::Unavailable("step pool registry poisoned".to_string()))?;
        let key = target.key();
        if let Some(pool) = pools.get(&key) {
            return Ok(pool.clone());
        }
        let options = self.options_for(target)?;
        let _runtime = self.handle.enter();
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_lazy_with(options);
        pools.insert(key, pool.clone());
        Ok(pool)
    }
}

impl StepDatabases for PostgresStepDatabases {
    fn connect(&self, target: &SqlTarget) -> Result<Box<dyn StepSession + '_>, StoreError> {
        let pool = self.pool_for(target)?;
        let conn = self
            .handle
            .block_on(pool.acquire())
            .map_err(|e| map_sqlx_error("connect_step_target", e))?;
        Ok(Box::new(PostgresStepSession {
            conn: Some(conn),
            handle: &self.handle,
        }))
    }
}

impl Drop for PostgresStepDatabases {
    fn drop(&mut self) {
        let _runtime = self.handle.enter();
        if let Ok(pools) = self.pools.get_mut() {
            pools.clear();
        }
    }
}

struct PostgresStepSession<'a> {
    conn: Option<PoolConnection<Postgres>>,
    handle: &'a Handle,
}

impl StepSession for PostgresStepSession<'_> {
    fn execute(&mut self, sql: &str) -> Result<u64, String> {
        let Some(conn) = self.conn.as_mut() else {
            return Err("step connection already released".to_string());
        };
        self.handle
            .block_on(sqlx::raw_sql(sql).execute(&mut **conn))
            .map(|done| done.rows_affected())
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) => db_err.message().to_string(),
                other => other.to_string(),
            })
    }
}

impl Drop for PostgresStepSession<'_> {
    fn drop(&mut self) {
        let _runtime = self.handle.enter();
        drop(self.conn.take());
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::RowNotFound => StoreError::NotFound(operation),
        sqlx::Error::Database(db_err) => StoreError::query(operation, db_err.message()),
        other => StoreError::query(operation, other.to_string()),
    }
}

// SQLx row types

#[derive(Debug)]
struct StepRow {
    step_id: i64,
    job_id: i64,
    step_name: String,
    enabled: bool,
    kind: String,
    code: String,
    db_name: Option<String>,
    conn_str: Option<String>,
    on_error: String,
}

impl<'r> FromRow<'r, PgRow> for StepRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StepRow {
            step_id: row.try_get("step_id")?,
            job_id: row.try_get("job_id")?,
            step_name: row.try_get("step_name")?,
            enabled: row.try_get("enabled")?,
            kind: row.try_get("kind")?,
            code: row.try_get("code")?,
            db_name: row.try_get("db_name")?,
            conn_str: row.try_get("conn_str")?,
            on_error: row.try_get("on_error")?,
        })
    }
}

impl TryFrom<StepRow> for Step {
    type Error = StoreError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        Ok(Step {
            id: StepId::new(row.step_id),
            job_id: JobId::new(row.job_id),
            name: row.step_name,
            enabled: row.enabled,
            kind: StepKind::from_code(&row.kind),
            code: row.code,
            target: SqlTarget {
                db_name: row.db_name,
                conn_str: row.conn_str,
            },
            on_error: OnError::from_code(&row.on_error)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str, on_error: &str) -> StepRow {
        StepRow {
            step_id: 3,
            job_id: 1,
            step_name: "load".to_string(),
            enabled: true,
            kind: kind.to_string(),
            code: "SELECT 1".to_string(),
            db_name: Some("warehouse".to_string()),
            conn_str: None,
            on_error: on_error.to_string(),
        }
    }

    #[test]
    fn step_row_maps_to_model() {
        let step: Step = row("s", "i").try_into().unwrap();
        assert_eq!(step.kind, StepKind::Sql);
        assert_eq!(step.on_error, OnError::Ignore);
        assert_eq!(step.target, SqlTarget::database("warehouse"));
    }

    #[test]
    fn unknown_kind_survives_decoding() {
        let step: Step = row("z", "f").try_into().unwrap();
        assert_eq!(step.kind, StepKind::Unknown("z".to_string()));
    }

    #[test]
    fn bad_on_error_is_a_decode_error() {
        let err = Step::try_from(row("b", "?")).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn pool_errors_map_to_unavailable() {
        assert!(matches!(
            map_sqlx_error("acquire", sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert_eq!(
            map_sqlx_error("latest_status", sqlx::Error::RowNotFound),
            StoreError::NotFound("latest_status")
        );
    }

    #[test]
    fn step_target_options() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let base: PgConnectOptions = "postgres://agent@localhost/catalog".parse().unwrap();
        let dbs = PostgresStepDatabases::new(base, runtime.handle().clone());

        let by_name = dbs.options_for(&SqlTarget::database("warehouse")).unwrap();
        assert_eq!(by_name.get_database(), Some("warehouse"));

        let by_conn = dbs
            .options_for(&SqlTarget::connection_string("postgres://x@remote/other"))
            .unwrap();
        assert_eq!(by_conn.get_database(), Some("other"));
        assert_eq!(by_conn.get_host(), "remote");
    }
}

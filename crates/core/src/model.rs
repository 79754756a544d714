//! Catalog rows read and written by the execution core.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::id::{AgentId, JobId, JobLogId, StepId, StepLogId};
use crate::status::RunStatus;

/// Persisted job definition (the columns the execution core touches).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    /// Claim owner. Set only while a run is in progress.
    pub agent_id: Option<AgentId>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            agent_id: None,
            last_run: None,
            next_run: None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.agent_id.is_some()
    }
}

/// One row per execution attempt of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLog {
    pub id: JobLogId,
    pub job_id: JobId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    /// Set when the run is finalized.
    pub duration: Option<Duration>,
}

/// Kind discriminator of a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Sql,
    Batch,
    /// A kind code this agent does not know how to run.
    Unknown(String),
}

impl StepKind {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "s" => StepKind::Sql,
            "b" => StepKind::Batch,
            other => StepKind::Unknown(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            StepKind::Sql => "s",
            StepKind::Batch => "b",
            StepKind::Unknown(code) => code,
        }
    }
}

/// On-error policy attached to a step.
///
/// The value is recorded and reported in failure messages, but every failure
/// aborts the job regardless of the policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    Fail,
    Succeed,
    Ignore,
}

impl OnError {
    pub fn as_code(self) -> &'static str {
        match self {
            OnError::Fail => "f",
            OnError::Succeed => "s",
            OnError::Ignore => "i",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ModelError> {
        match code.trim() {
            "f" => Ok(OnError::Fail),
            "s" => Ok(OnError::Succeed),
            "i" => Ok(OnError::Ignore),
            other => Err(ModelError::UnknownOnError(other.to_string())),
        }
    }
}

impl Default for OnError {
    fn default() -> Self {
        Self::Fail
    }
}

/// Database a SQL step runs against.
///
/// A non-empty connection string wins; otherwise the agent's own server is
/// used with `db_name` as the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SqlTarget {
    pub db_name: Option<String>,
    pub conn_str: Option<String>,
}

impl SqlTarget {
    pub fn database(db_name: impl Into<String>) -> Self {
        Self {
            db_name: Some(db_name.into()),
            conn_str: None,
        }
    }

    pub fn connection_string(conn_str: impl Into<String>) -> Self {
        Self {
            db_name: None,
            conn_str: Some(conn_str.into()),
        }
    }

    /// Stable key identifying the target, used to pool per-target connections.
    pub fn key(&self) -> String {
        match (self.conn_str.as_deref(), self.db_name.as_deref()) {
            (Some(conn), _) if !conn.trim().is_empty() => format!("conn:{conn}"),
            (_, Some(db)) => format!("db:{db}"),
            _ => "default".to_string(),
        }
    }
}

/// Ordered unit of work belonging to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: StepId,
    pub job_id: JobId,
    pub name: String,
    pub enabled: bool,
    pub kind: StepKind,
    pub code: String,
    pub target: SqlTarget,
    pub on_error: OnError,
}

impl Step {
    /// Execution order: ascending by `(name, id)`.
    pub fn order_key(&self) -> (&str, StepId) {
        (&self.name, self.id)
    }
}

/// Sort steps into execution order.
pub fn sort_steps(steps: &mut [Step]) {
    steps.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
}

/// One row per step execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLog {
    pub id: StepLogId,
    pub job_log_id: JobLogId,
    pub step_id: StepId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub result: Option<i32>,
    pub duration: Option<Duration>,
    pub output: Option<String>,
}

/// Directed prerequisite edge: `job_id` requires `prerequisite` to have succeeded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub job_id: JobId,
    pub prerequisite: JobId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: i64, name: &str) -> Step {
        Step {
            id: StepId::new(id),
            job_id: JobId::new(1),
            name: name.to_string(),
            enabled: true,
            kind: StepKind::Sql,
            code: String::new(),
            target: SqlTarget::default(),
            on_error: OnError::Fail,
        }
    }

    #[test]
    fn steps_order_by_name_then_id() {
        let mut steps = vec![step(5, "b"), step(20, "a"), step(3, "a")];
        sort_steps(&mut steps);
        let order: Vec<i64> = steps.iter().map(|s| s.id.get()).collect();
        assert_eq!(order, vec![3, 20, 5]);
    }

    #[test]
    fn unknown_kind_keeps_its_code() {
        let kind = StepKind::from_code("q");
        assert_eq!(kind, StepKind::Unknown("q".to_string()));
        assert_eq!(kind.as_code(), "q");
    }

    #[test]
    fn target_key_prefers_connection_string() {
        let target = SqlTarget {
            db_name: Some("app".into()),
            conn_str: Some("postgres://other/db".into()),
        };
        assert_eq!(target.key(), "conn:postgres://other/db");
        assert_eq!(SqlTarget::database("app").key(), "db:app");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: sorted steps are non-decreasing in (name, id).
            #[test]
            fn sorted_steps_are_ordered(
                raw in proptest::collection::vec(("[a-c]{1,2}", 0i64..50), 0..20)
            ) {
                let mut steps: Vec<Step> = raw.iter().map(|(n, id)| step(*id, n)).collect();
                sort_steps(&mut steps);
                for pair in steps.windows(2) {
                    prop_assert!(pair[0].order_key() <= pair[1].order_key());
                }
            }
        }
    }
}

//! SQL steps.

use tracing::debug;

use jobagent_core::Step;

use super::StepOutcome;
use crate::db::StepDatabases;

/// Run the step's code as one command against its target database.
///
/// The step connection is dropped (returned to its pool) before this returns,
/// whatever the outcome.
pub fn run_sql<D>(databases: &D, step: &Step) -> StepOutcome
where
    D: StepDatabases + ?Sized,
{
    let mut session = match databases.connect(&step.target) {
        Ok(session) => session,
        Err(e) => {
            return StepOutcome::failure(-1, format!("could not connect to step database: {e}"));
        }
    };

    match session.execute(&step.code) {
        Ok(rows) => {
            debug!(step_id = %step.id, rows, "sql step executed");
            StepOutcome::success(i32::try_from(rows).unwrap_or(i32::MAX), String::new())
        }
        Err(message) => StepOutcome::failure(-1, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStepDatabases;
    use jobagent_core::{JobId, OnError, SqlTarget, StepId, StepKind};

    fn sql_step(code: &str) -> Step {
        Step {
            id: StepId::new(2),
            job_id: JobId::new(1),
            name: "sql".to_string(),
            enabled: true,
            kind: StepKind::Sql,
            code: code.to_string(),
            target: SqlTarget::database("warehouse"),
            on_error: OnError::Fail,
        }
    }

    #[test]
    fn clean_statement_has_empty_output() {
        let dbs = InMemoryStepDatabases::new();
        let outcome = run_sql(&dbs, &sql_step("DELETE FROM stale"));

        assert!(outcome.succeeded);
        assert_eq!(outcome.output, "");
        assert_eq!(dbs.open_sessions(), 0);
    }

    #[test]
    fn database_error_text_becomes_output() {
        let dbs = InMemoryStepDatabases::new();
        dbs.fail_statement("SELECT broken", r#"column "broken" does not exist"#);

        let outcome = run_sql(&dbs, &sql_step("SELECT broken"));

        assert!(!outcome.succeeded);
        assert_eq!(outcome.result, -1);
        assert_eq!(outcome.output, r#"column "broken" does not exist"#);
        assert_eq!(dbs.open_sessions(), 0);
    }

    #[test]
    fn unreachable_target_fails_the_step() {
        let dbs = InMemoryStepDatabases::new();
        dbs.make_unreachable(&SqlTarget::database("warehouse"));

        let outcome = run_sql(&dbs, &sql_step("SELECT 1"));

        assert!(!outcome.succeeded);
        assert!(outcome.output.starts_with("could not connect to step database"));
        assert!(dbs.executed().is_empty());
    }
}

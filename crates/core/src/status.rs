//! Status vocabulary shared by job logs and step logs.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Outcome state of a job run or a step run.
///
/// Persisted as a single-character code (`r`, `s`, `f`, `i`, `x`), which is
/// what dashboards and other agents read back from the catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Transient: the run is in progress.
    Running,
    Success,
    Failed,
    /// The agent could not run the job at all (no steps, bad step kind, no connection).
    InternalError,
    /// A prerequisite job has not succeeded.
    Blocked,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn is_success(self) -> bool {
        matches!(self, RunStatus::Success)
    }

    /// Single-character catalog code.
    pub fn as_code(self) -> &'static str {
        match self {
            RunStatus::Running => "r",
            RunStatus::Success => "s",
            RunStatus::Failed => "f",
            RunStatus::InternalError => "i",
            RunStatus::Blocked => "x",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ModelError> {
        match code.trim() {
            "r" => Ok(RunStatus::Running),
            "s" => Ok(RunStatus::Success),
            "f" => Ok(RunStatus::Failed),
            "i" => Ok(RunStatus::InternalError),
            "x" => Ok(RunStatus::Blocked),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

impl core::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::InternalError => "internal-error",
            RunStatus::Blocked => "blocked",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_is_transient() {
        assert!(!RunStatus::Running.is_terminal());
        for s in [
            RunStatus::Success,
            RunStatus::Failed,
            RunStatus::InternalError,
            RunStatus::Blocked,
        ] {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(
            RunStatus::from_code("d"),
            Err(ModelError::UnknownStatus("d".to_string()))
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = RunStatus> {
            prop_oneof![
                Just(RunStatus::Running),
                Just(RunStatus::Success),
                Just(RunStatus::Failed),
                Just(RunStatus::InternalError),
                Just(RunStatus::Blocked),
            ]
        }

        proptest! {
            /// Property: every status survives the catalog code mapping.
            #[test]
            fn code_mapping_is_lossless(status in any_status()) {
                prop_assert_eq!(RunStatus::from_code(status.as_code()), Ok(status));
            }
        }
    }
}

//! Batch (script) steps.
//!
//! Each run gets its own directory `jobagent_<job>_<step>_XXXXXX` holding the
//! script (`<job>_<step>.scr`, `.bat` on Windows) and the captured stderr
//! (`<job>_<step>_error.txt`). The directory is removed afterwards on every
//! path; a removal failure is logged and leaves the outcome untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use jobagent_core::{JobContext, Step};

use super::StepOutcome;
use super::process::ScriptProcess;

#[cfg(windows)]
const SCRIPT_EXTENSION: &str = "bat";
#[cfg(not(windows))]
const SCRIPT_EXTENSION: &str = "scr";

/// Label separating a script's stdout from its captured stderr in step output.
pub const STDERR_LABEL: &str = "Script Error:";

#[derive(Debug, Error)]
enum BatchError {
    #[error("could not create temporary directory: {0}")]
    TempDir(#[source] io::Error),

    #[error("could not write script file {path}: {source}")]
    WriteScript {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not set permissions on script file {path}: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not run script {path}: {source}")]
    Run {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Runs batch steps inside scratch directories under `root`.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    root: PathBuf,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl BatchExecutor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run(&self, ctx: &JobContext, step: &Step) -> StepOutcome {
        let dir = match tempfile::Builder::new()
            .prefix(&format!("jobagent_{}_{}_", ctx.job_id, step.id))
            .tempdir_in(&self.root)
        {
            Ok(dir) => dir,
            Err(e) => return failed(BatchError::TempDir(e)),
        };

        let outcome = match run_in(dir.path(), ctx, step) {
            Ok(outcome) => outcome,
            Err(e) => failed(e),
        };

        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!(
                job_id = %ctx.job_id,
                step_id = %step.id,
                path = %path.display(),
                error = %e,
                "could not remove batch step directory"
            );
        }

        outcome
    }
}

fn failed(err: BatchError) -> StepOutcome {
    warn!(error = %err, "batch step could not run");
    StepOutcome::failure(-1, err.to_string())
}

fn run_in(dir: &Path, ctx: &JobContext, step: &Step) -> Result<StepOutcome, BatchError> {
    let stem = format!("{}_{}", ctx.job_id, step.id);
    let script = dir.join(format!("{stem}.{SCRIPT_EXTENSION}"));
    let errors = dir.join(format!("{stem}_error.txt"));

    fs::write(&script, normalize_line_endings(&step.code)).map_err(|source| {
        BatchError::WriteScript {
            path: script.clone(),
            source,
        }
    })?;
    make_executable(&script).map_err(|source| BatchError::Permissions {
        path: script.clone(),
        source,
    })?;

    debug!(job_id = %ctx.job_id, step_id = %step.id, script = %script.display(), "running batch step");
    let out = ScriptProcess::run(&script, &errors).map_err(|source| BatchError::Run {
        path: script.clone(),
        source,
    })?;

    let mut output = out.stdout;
    if !out.stderr.is_empty() {
        output.push('\n');
        output.push_str(STDERR_LABEL);
        output.push_str(" \n");
        output.push_str(&out.stderr);
        output.push('\n');
    }

    Ok(if out.exit_code == 0 {
        StepOutcome::success(out.exit_code, output)
    } else {
        StepOutcome::failure(out.exit_code, output)
    })
}

#[cfg(windows)]
fn normalize_line_endings(code: &str) -> String {
    code.replace("\r\n", "\n").replace('\n', "\r\n")
}

#[cfg(not(windows))]
fn normalize_line_endings(code: &str) -> String {
    code.replace("\r\n", "\n")
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use jobagent_core::{AgentId, JobId, OnError, SqlTarget, StepId, StepKind};

    fn batch_step(code: &str) -> Step {
        Step {
            id: StepId::new(4),
            job_id: JobId::new(9),
            name: "script".to_string(),
            enabled: true,
            kind: StepKind::Batch,
            code: code.to_string(),
            target: SqlTarget::default(),
            on_error: OnError::Fail,
        }
    }

    fn ctx() -> JobContext {
        JobContext::new(AgentId::new(1), JobId::new(9))
    }

    fn leftovers(root: &Path) -> usize {
        fs::read_dir(root).unwrap().count()
    }

    #[test]
    fn exit_zero_succeeds_with_stdout() {
        let root = tempfile::tempdir().unwrap();
        let executor = BatchExecutor::new(root.path());

        let outcome = executor.run(&ctx(), &batch_step("echo hello\n"));

        assert_eq!(outcome, StepOutcome::success(0, "hello\n"));
        assert_eq!(leftovers(root.path()), 0);
    }

    #[test]
    fn nonzero_exit_fails_with_code_as_result() {
        let root = tempfile::tempdir().unwrap();
        let executor = BatchExecutor::new(root.path());

        let outcome = executor.run(&ctx(), &batch_step("exit 7\n"));

        assert!(!outcome.succeeded);
        assert_eq!(outcome.result, 7);
        assert_eq!(leftovers(root.path()), 0);
    }

    #[test]
    fn stderr_is_appended_under_label() {
        let root = tempfile::tempdir().unwrap();
        let executor = BatchExecutor::new(root.path());

        let outcome = executor.run(&ctx(), &batch_step("echo done\necho oops >&2\n"));

        assert!(outcome.succeeded);
        assert_eq!(outcome.output, "done\n\nScript Error: \noops\n\n");
    }

    #[test]
    fn crlf_scripts_run() {
        let root = tempfile::tempdir().unwrap();
        let executor = BatchExecutor::new(root.path());

        let outcome = executor.run(&ctx(), &batch_step("echo a\r\nexit 0\r\n"));

        assert_eq!(outcome, StepOutcome::success(0, "a\n"));
    }

    #[test]
    fn script_sees_its_own_directory_name() {
        let root = tempfile::tempdir().unwrap();
        let executor = BatchExecutor::new(root.path());

        let outcome = executor.run(&ctx(), &batch_step("basename \"$(dirname \"$0\")\"\n"));

        assert!(outcome.output.starts_with("jobagent_9_4_"), "{}", outcome.output);
    }

    #[test]
    fn missing_scratch_root_is_a_failed_outcome() {
        let root = tempfile::tempdir().unwrap();
        let executor = BatchExecutor::new(root.path().join("missing"));

        let outcome = executor.run(&ctx(), &batch_step("true\n"));

        assert!(!outcome.succeeded);
        assert_eq!(outcome.result, -1);
        assert!(outcome.output.starts_with("could not create temporary directory"));
    }
}

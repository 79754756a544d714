//! Child process execution for batch steps.
//!
//! A single entry point, [`ScriptProcess::run`], hides how each platform
//! launches a script file: `cmd /C` on Windows, `/bin/sh` elsewhere (so a
//! script without a shebang line still runs as a shell script).

use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// What a finished script produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Plain exit code; `-1` if the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptProcess;

impl ScriptProcess {
    /// Run `script` to completion.
    ///
    /// Stdin is closed, stdout is read to the end, stderr goes to
    /// `stderr_path` and is read back once the process exits.
    pub fn run(script: &Path, stderr_path: &Path) -> io::Result<ProcessOutput> {
        let stderr_file = File::create(stderr_path)?;

        let output = Self::command(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_file))
            .output()?;

        let stderr = std::fs::read(stderr_path)?;

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    #[cfg(windows)]
    fn command(script: &Path) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(script);
        cmd
    }

    #[cfg(not(windows))]
    fn command(script: &Path) -> Command {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg("\"$0\"").arg(script);
        cmd
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("t.scr");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700)).unwrap();
        path
    }

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "echo out\necho err >&2\nexit 3\n");

        let out = ScriptProcess::run(&path, &dir.path().join("t_error.txt")).unwrap();

        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[test]
    fn honours_shebang() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "#!/bin/sh\nprintf hi\n");

        let out = ScriptProcess::run(&path, &dir.path().join("e.txt")).unwrap();

        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "hi");
        assert_eq!(out.stderr, "");
    }

    #[test]
    fn missing_stderr_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "true\n");

        let err = ScriptProcess::run(&path, &dir.path().join("nope").join("e.txt"));

        assert!(err.is_err());
    }
}

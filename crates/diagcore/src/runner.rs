//! Raw binary execution: the primitive underneath both the test oracles and
//! the UB classifier's sanitizer/cross-compiler signals.
//!
//! This is deliberately distinct from [`crate::oracle::TestOracle`]: the
//! oracle collapses an execution into pass/fail, but the UB classifier also
//! needs the raw stdout/stderr to look for the `runtime error:` sanitizer
//! marker, and a caller-supplied environment (e.g. `UBSAN_OPTIONS`).

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::compile::kill_process_group;

/// Outcome of running a compiled binary to completion or to a wall-clock
/// ceiling.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Exited {
        code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    Timeout,
    SpawnFailed,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RunOutcome::Exited { code: Some(0), .. })
    }

    pub fn stderr_lossy(&self) -> String {
        match self {
            RunOutcome::Exited { stderr, .. } => String::from_utf8_lossy(stderr).to_string(),
            _ => String::new(),
        }
    }

    pub fn stdout_lossy(&self) -> String {
        match self {
            RunOutcome::Exited { stdout, .. } => String::from_utf8_lossy(stdout).to_string(),
            _ => String::new(),
        }
    }
}

/// Run `binary` with `argv_extra` arguments, `env_overrides` layered onto the
/// inherited environment, bounded by `timeout`. Kills the whole process
/// group on expiry so a hung child never outlives the budget.
pub async fn run_capture(
    binary: &Path,
    argv_extra: &[String],
    env_overrides: &HashMap<String, String>,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> RunOutcome {
    let mut cmd = tokio::process::Command::new(binary);
    cmd.args(argv_extra)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
            .kill_on_drop(true);
    for (key, value) in env_overrides {
        cmd.env(key, value);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(_) => return RunOutcome::SpawnFailed,
    };
    let pid = child.id();

    if let Some(data) = stdin {
        if let Some(mut child_stdin) = child.stdin.take() {
            let _ = child_stdin.write_all(data).await;
            drop(child_stdin);
        }
    }

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => RunOutcome::Exited {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        },
        Ok(Err(_)) => RunOutcome::SpawnFailed,
        Err(_elapsed) => {
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            RunOutcome::Timeout
        }
    }
}

//! Bounded-timeout subprocess runner.

use macblock_types::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default timeout applied to system commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit code reported when a child is killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Captured result of a finished (or killed) subprocess.
///
/// `stdout` and `stderr` are always valid strings; invalid UTF-8 from the
/// child is replaced, never raised.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// The child's exit code, [`TIMEOUT_EXIT_CODE`] on timeout, -1 when
    /// killed by a signal.
    pub exit_code: i32,
    /// Lossily decoded standard output.
    pub stdout: String,
    /// Lossily decoded standard error, with a timeout note appended when the
    /// child was killed for running too long.
    pub stderr: String,
    /// Whether the child hit its timeout.
    pub timed_out: bool,
}

impl CommandOutput {
    /// Whether the child exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `argv` with [`DEFAULT_TIMEOUT`].
pub async fn run(argv: &[&str]) -> Result<CommandOutput> {
    run_with_timeout(argv, DEFAULT_TIMEOUT).await
}

/// Runs `argv` directly (no shell), captures both output streams, and kills
/// the child if it outlives `timeout`.
///
/// A missing binary is a [`Error::Platform`]; any other spawn failure is
/// transient. A nonzero exit is not an error here: callers decide.
pub async fn run_with_timeout(argv: &[&str], timeout: Duration) -> Result<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::transient("run", "empty argv"))?;

    debug!(command = %argv.join(" "), "running");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::platform(format!("required system binary not found: {program}"))
            } else {
                Error::transient(format!("spawning {program}"), e.to_string())
            }
        })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(Error::transient(
            format!("waiting for {program}"),
            e.to_string(),
        )),
        // Dropping the wait future reaps the child via kill_on_drop.
        Err(_) => Ok(CommandOutput {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: format!("{program} timed out after {}s", timeout.as_secs()),
            timed_out: true,
        }),
    }
}

/// Runs `argv` and maps a nonzero exit to a transient error carrying the
/// child's stderr.
pub async fn run_checked(argv: &[&str], timeout: Duration) -> Result<CommandOutput> {
    let output = run_with_timeout(argv, timeout).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(Error::transient(
            argv.join(" "),
            format!("exit {}: {}", output.exit_code, output.stderr.trim()),
        ))
    }
}

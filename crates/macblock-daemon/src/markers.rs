//! Daemon marker files: pid, ready, last-apply.
//!
//! Each holds a single decimal integer and a trailing newline, written
//! atomically. Diagnostics read them tolerantly; a missing or garbled marker
//! is reported as absent, never an error.

use macblock_core::fsutil;
use macblock_types::{paths, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

fn write_integer(path: &Path, value: i64) -> Result<()> {
    fsutil::write_atomic(path, format!("{value}\n").as_bytes(), fsutil::MODE_FILE)
}

/// Reads a single-integer marker. `None` when missing or malformed.
#[must_use]
pub fn read_integer(path: &Path) -> Option<i64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Writes the daemon's own PID to `daemon.pid`.
pub fn write_pid() -> Result<()> {
    write_integer(&paths::daemon_pid_file(), i64::from(std::process::id()))
}

/// Writes `daemon.ready` with the given epoch seconds.
pub fn write_ready(now: i64) -> Result<()> {
    write_integer(&paths::daemon_ready_file(), now)
}

/// Writes `daemon.last_apply` with the given epoch seconds.
pub fn write_last_apply(now: i64) -> Result<()> {
    write_integer(&paths::daemon_last_apply_file(), now)
}

/// Removes pid and ready markers on shutdown. `daemon.last_apply` survives
/// as a historical record.
pub fn remove_runtime_markers() {
    for path in [paths::daemon_pid_file(), paths::daemon_ready_file()] {
        let _ = fs::remove_file(path);
    }
}

/// The daemon's PID, if its marker names a live process.
#[must_use]
pub fn live_daemon_pid() -> Option<i32> {
    let pid = i32::try_from(read_integer(&paths::daemon_pid_file())?).ok()?;
    #[cfg(unix)]
    {
        kill(Pid::from_raw(pid), None).ok()?;
    }
    Some(pid)
}

/// Asks a running daemon to reconcile now via SIGUSR1. Returns whether a
/// daemon was there to kick.
pub fn kick() -> Result<bool> {
    let Some(pid) = live_daemon_pid() else {
        return Ok(false);
    };
    #[cfg(unix)]
    {
        match kill(Pid::from_raw(pid), Signal::SIGUSR1) {
            Ok(()) => {
                debug!(pid, "kicked daemon");
                Ok(true)
            }
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(e) => Err(macblock_types::Error::transient(
                "signalling daemon",
                format!("kill({pid}, SIGUSR1): {e}"),
            )),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_markers_round_trip_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.last_apply");
        write_integer(&path, 1_750_000_000).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "1750000000\n");
        assert_eq!(read_integer(&path), Some(1_750_000_000));
    }

    #[test]
    fn malformed_markers_read_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.ready");
        fs::write(&path, "yesterday\n").unwrap();
        assert_eq!(read_integer(&path), None);
        assert_eq!(read_integer(&dir.path().join("missing")), None);
    }
}

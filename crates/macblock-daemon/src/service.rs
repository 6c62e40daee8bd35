//! The daemon event loop.

use crate::{markers, reconcile};
use macblock_core::fsutil;
use macblock_types::{paths, Error, Result};
use macblock_platform::NetworkWatcher;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Safety-net reconcile interval.
const TICK_INTERVAL: Duration = Duration::from_secs(30);
/// Consecutive failed passes before the daemon exits so the supervisor
/// restarts it and the fault becomes visible.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Sleeps until the pause deadline when one is pending, else forever.
async fn pause_expiry(paused_until: Option<i64>) {
    let now = chrono::Utc::now().timestamp();
    match paused_until {
        Some(until) if until > now => {
            let wait = u64::try_from(until - now).unwrap_or(0);
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
        // No pending expiry; never wake this branch.
        _ => std::future::pending().await,
    }
}

/// Runs the daemon until a termination signal arrives.
///
/// Exits with an error on a corrupt state file or after
/// [`MAX_CONSECUTIVE_FAILURES`] failed passes; launchd restarts it either
/// way, which is the point: failures surface instead of looping silently.
pub async fn run() -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "macblock daemon starting");

    fsutil::cleanup_stale_temps(Path::new(paths::RUN_DIR));
    markers::write_pid()?;

    #[cfg(unix)]
    let (mut sigterm, mut sigint, mut sigusr1) = (
        signal(SignalKind::terminate())
            .map_err(|e| Error::transient("installing SIGTERM handler", e.to_string()))?,
        signal(SignalKind::interrupt())
            .map_err(|e| Error::transient("installing SIGINT handler", e.to_string()))?,
        signal(SignalKind::user_defined1())
            .map_err(|e| Error::transient("installing SIGUSR1 handler", e.to_string()))?,
    );

    let mut watcher = NetworkWatcher::spawn();
    // First tick one period out; the loop body already starts with a pass.
    let mut tick = tokio::time::interval_at(
        tokio::time::Instant::now() + TICK_INTERVAL,
        TICK_INTERVAL,
    );
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut consecutive_failures: u32 = 0;
    let mut ready_written = false;
    // Re-read on every iteration so control-plane pauses move the timer.
    let mut paused_until: Option<i64> = None;

    loop {
        // Triggers that piled up mid-pass collapse into this one.
        watcher.drain();
        match reconcile::reconcile_once().await {
            Ok(outcome) => {
                paused_until = macblock_core::store::load()
                    .map(|s| s.paused_until)
                    .unwrap_or(None);
                if outcome.success() {
                    consecutive_failures = 0;
                    if !ready_written {
                        markers::write_ready(chrono::Utc::now().timestamp())?;
                        ready_written = true;
                    }
                } else {
                    consecutive_failures += 1;
                    warn!(
                        failures = ?outcome.failures,
                        consecutive = consecutive_failures,
                        "reconcile had failures"
                    );
                }
            }
            Err(e @ Error::StateCorrupt { .. }) => {
                error!(error = %e, "state file is corrupt; exiting for supervisor restart");
                markers::remove_runtime_markers();
                return Err(e);
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(error = %e, consecutive = consecutive_failures, "reconcile failed");
            }
        }

        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            error!(
                consecutive_failures,
                "too many consecutive reconcile failures; exiting for supervisor restart"
            );
            markers::remove_runtime_markers();
            return Err(Error::transient(
                "reconcile loop",
                format!("{consecutive_failures} consecutive failures"),
            ));
        }

        #[cfg(unix)]
        {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM; shutting down without touching DNS");
                    break;
                }
                _ = sigint.recv() => {
                    info!("SIGINT; shutting down without touching DNS");
                    break;
                }
                _ = sigusr1.recv() => {
                    info!("SIGUSR1; reconciling now");
                }
                () = watcher.changed() => {
                    info!("network change notification");
                }
                () = pause_expiry(paused_until) => {
                    info!("pause expiry timer fired");
                }
                _ = tick.tick() => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt; shutting down without touching DNS");
                    break;
                }
                () = watcher.changed() => {}
                () = pause_expiry(paused_until) => {}
                _ = tick.tick() => {}
            }
        }
    }

    markers::remove_runtime_markers();
    info!("daemon stopped");
    Ok(())
}

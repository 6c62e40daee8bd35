//! install / uninstall commands.

use crate::privilege;
use macblock_core::install::{self, InstallOptions, UninstallOptions};
use macblock_daemon::markers;
use macblock_types::{Error, Result};
use tracing::warn;

/// `macblock install [--force] [--skip-update]`
pub async fn run_install(force: bool, skip_update: bool) -> Result<()> {
    privilege::ensure_root()?;

    install::install(&InstallOptions { force }).await?;
    println!("macblock installed; resolver and daemon are running.");

    if skip_update {
        println!("Skipped the initial blocklist compile; run `macblock update` when ready.");
    } else {
        super::update::run(None, None).await?;
    }

    // First reconcile happens at daemon startup; kick anyway in case it
    // started before the blocklist landed.
    if let Err(e) = markers::kick() {
        warn!(error = %e, "could not kick the daemon");
    }
    println!("Run `macblock enable` to start blocking.");
    Ok(())
}

/// `macblock uninstall [--force]`
pub async fn run_uninstall(force: bool) -> Result<()> {
    privilege::ensure_root()?;

    let report = install::uninstall(&UninstallOptions { force }).await?;

    for failure in &report.restore_failures {
        eprintln!("warning: DNS not restored on {failure}");
    }
    if report.clean() {
        println!("macblock uninstalled cleanly.");
        return Ok(());
    }

    if !report.leftovers.is_empty() {
        println!("Left behind:");
        for leftover in &report.leftovers {
            println!("  {leftover}");
        }
    }
    Err(Error::Partial {
        summary: "uninstall finished with leftovers".into(),
        failures: report
            .restore_failures
            .iter()
            .chain(&report.leftovers)
            .cloned()
            .collect(),
    })
}

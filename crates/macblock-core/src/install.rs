//! Install and uninstall of the privileged footprint.
//!
//! Install is idempotent per step: existing users, directories, and files
//! are left alone or rewritten in place. Uninstall restores DNS first, then
//! tears the rest down; `--force` turns per-file errors into accumulated
//! leftovers instead of aborting.

use crate::{dnsmasq, fsutil, store, upstreams};
use macblock_platform::{dns, launchd, run};
use macblock_types::{paths, DesiredState, Error, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Options for `install`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Tolerate already-installed steps by redoing them.
    pub force: bool,
}

/// Options for `uninstall`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UninstallOptions {
    /// Continue past per-item failures, remove the dedicated user, and
    /// report leftovers at the end.
    pub force: bool,
}

/// What uninstall could not undo.
#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    /// Services whose DNS could not be restored, with causes.
    pub restore_failures: Vec<String>,
    /// Paths that are still on disk.
    pub leftovers: Vec<String>,
}

impl UninstallReport {
    /// Whether everything came off cleanly.
    #[must_use]
    pub fn clean(&self) -> bool {
        self.restore_failures.is_empty() && self.leftovers.is_empty()
    }
}

/// System ID range probed for the dedicated user and group.
const ID_RANGE: std::ops::RangeInclusive<u32> = 200..=400;

fn require_root() -> Result<()> {
    #[cfg(unix)]
    if !nix::unistd::geteuid().is_root() {
        return Err(Error::privilege(
            "this command must run as root (re-run with sudo)",
        ));
    }
    Ok(())
}

/// Parses `dscl . -list <path> <key>` output into the set of numeric IDs.
pub fn parse_dscl_ids(stdout: &str) -> BTreeSet<u32> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|id| id.parse().ok())
        .collect()
}

/// First free ID in the system range.
pub fn next_free_id(taken: &BTreeSet<u32>) -> Result<u32> {
    ID_RANGE
        .clone()
        .find(|id| !taken.contains(id))
        .ok_or_else(|| Error::platform("no free system IDs in the 200-400 range"))
}

async fn dscl(args: &[&str]) -> Result<run::CommandOutput> {
    let mut argv = vec!["dscl", "."];
    argv.extend_from_slice(args);
    run::run_checked(&argv, run::DEFAULT_TIMEOUT).await
}

async fn record_exists(path: &str) -> Result<bool> {
    let mut argv = vec!["dscl", ".", "-read"];
    argv.push(path);
    let output = run::run(&argv).await?;
    Ok(output.success())
}

/// Creates the `_macblock` user and group if they do not exist.
async fn ensure_resolver_user() -> Result<()> {
    let user_path = format!("/Users/{}", paths::RESOLVER_USER);
    let group_path = format!("/Groups/{}", paths::RESOLVER_USER);

    if !record_exists(&group_path).await? {
        let gids = parse_dscl_ids(
            &dscl(&["-list", "/Groups", "PrimaryGroupID"]).await?.stdout,
        );
        let gid = next_free_id(&gids)?.to_string();
        dscl(&["-create", &group_path]).await?;
        dscl(&["-create", &group_path, "PrimaryGroupID", &gid]).await?;
        info!(group = paths::RESOLVER_USER, gid, "created resolver group");
    }

    if !record_exists(&user_path).await? {
        let uids =
            parse_dscl_ids(&dscl(&["-list", "/Users", "UniqueID"]).await?.stdout);
        let uid = next_free_id(&uids)?.to_string();
        let gid_output = dscl(&["-read", &group_path, "PrimaryGroupID"]).await?;
        let gid = gid_output
            .stdout
            .split_whitespace()
            .last()
            .unwrap_or("1")
            .to_string();

        dscl(&["-create", &user_path]).await?;
        dscl(&["-create", &user_path, "UniqueID", &uid]).await?;
        dscl(&["-create", &user_path, "PrimaryGroupID", &gid]).await?;
        dscl(&["-create", &user_path, "UserShell", "/usr/bin/false"]).await?;
        dscl(&["-create", &user_path, "NFSHomeDirectory", "/var/empty"]).await?;
        dscl(&["-create", &user_path, "IsHidden", "1"]).await?;
        info!(user = paths::RESOLVER_USER, uid, "created resolver user");
    }

    Ok(())
}

/// Refuses to install over a foreign port-53 listener.
async fn preflight_port53() -> Result<()> {
    let listeners = launchd::port53_listeners().await?;
    let foreign: Vec<String> = listeners
        .iter()
        .filter(|l| l.command != "dnsmasq")
        .map(|l| format!("{} (pid {})", l.command, l.pid))
        .collect();
    if !foreign.is_empty() {
        return Err(Error::conflict(format!(
            "port 53 is already in use by {}; stop it before installing",
            foreign.join(", ")
        )));
    }
    Ok(())
}

/// The macblock binary path recorded in the daemon manifest.
fn daemon_program() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(paths::ENV_MACBLOCK_BIN) {
        return Ok(PathBuf::from(custom));
    }
    Ok(std::env::current_exe()?)
}

/// Installs the complete footprint. Must run as root. The initial blocklist
/// compile is the caller's follow-up step so `--skip-update` can defer it.
pub async fn install(opts: &InstallOptions) -> Result<()> {
    macblock_platform::require_macos()?;
    require_root()?;

    preflight_port53().await?;
    let dnsmasq_bin = dnsmasq::find_binary()?;

    ensure_resolver_user().await?;

    for dir in [paths::CONF_DIR, paths::RUN_DIR, paths::LOG_DIR] {
        fsutil::ensure_dir(Path::new(dir), fsutil::MODE_DIR)?;
    }

    // Seed config files that do not exist yet; never clobber user edits.
    let state_path = paths::state_file();
    if !state_path.exists() {
        store::save_to(&state_path, &DesiredState::default())?;
    }
    for seed in [
        paths::allowlist_file(),
        paths::denylist_file(),
        paths::exclude_services_file(),
    ] {
        if !seed.exists() {
            fsutil::write_atomic(&seed, b"", fsutil::MODE_FILE)?;
        }
    }
    let fallbacks_path = paths::fallback_upstreams_file();
    if !fallbacks_path.exists() {
        upstreams::write_fallbacks(&fallbacks_path, &upstreams::default_fallbacks())?;
    }

    // An empty blocklist keeps dnsmasq startable before the first compile.
    for runtime_file in [
        paths::upstream_conf_file(),
        paths::blocklist_raw_file(),
        paths::blocklist_conf_file(),
    ] {
        if !runtime_file.exists() {
            fsutil::write_atomic(&runtime_file, b"", fsutil::MODE_FILE)?;
        }
    }

    fsutil::write_atomic(
        &paths::dnsmasq_conf_file(),
        dnsmasq::render_config().as_bytes(),
        fsutil::MODE_FILE,
    )?;

    let daemon_plist = paths::daemon_plist_file();
    let dnsmasq_plist = paths::dnsmasq_plist_file();
    if opts.force {
        launchd::unload(&daemon_plist).await.ok();
        launchd::unload(&dnsmasq_plist).await.ok();
    }
    fsutil::write_atomic(
        &daemon_plist,
        launchd::render_daemon_plist(&daemon_program()?).as_bytes(),
        fsutil::MODE_FILE,
    )?;
    fsutil::write_atomic(
        &dnsmasq_plist,
        launchd::render_dnsmasq_plist(&dnsmasq_bin).as_bytes(),
        fsutil::MODE_FILE,
    )?;

    launchd::load(&dnsmasq_plist).await?;
    launchd::load(&daemon_plist).await?;
    launchd::wait_running(paths::DNSMASQ_LABEL, Duration::from_secs(15)).await?;
    launchd::wait_running(paths::DAEMON_LABEL, Duration::from_secs(15)).await?;

    info!("install complete");
    Ok(())
}

fn remove_path(path: &Path, force: bool, leftovers: &mut Vec<String>) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        return Ok(());
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if force => {
            warn!(path = %path.display(), error = %e, "leaving leftover behind");
            leftovers.push(path.display().to_string());
            Ok(())
        }
        Err(e) => Err(Error::transient(
            format!("removing {}", path.display()),
            e.to_string(),
        )),
    }
}

/// Tears the footprint down. Must run as root.
///
/// DNS restore happens first and is always best-effort; later steps follow
/// the `--force` contract. The returned report lists everything that is
/// still in place.
pub async fn uninstall(opts: &UninstallOptions) -> Result<UninstallReport> {
    macblock_platform::require_macos()?;
    require_root()?;

    let mut report = UninstallReport::default();

    // 1. Restore DNS on every backed-up service.
    let mut state = match store::load() {
        Ok(state) => state,
        Err(e) if opts.force => {
            warn!(error = %e, "state unreadable; skipping DNS restore");
            DesiredState::default()
        }
        Err(e) => return Err(e),
    };
    let backups: Vec<(String, macblock_types::ServiceDns)> = state
        .dns_backup
        .iter()
        .map(|(s, b)| (s.clone(), b.clone()))
        .collect();
    for (service, backup) in backups {
        match dns::restore(&service, &backup).await {
            Ok(()) => {
                state.dns_backup.remove(&service);
                state.managed_services.remove(&service);
            }
            Err(e) => {
                report.restore_failures.push(format!("{service}: {e}"));
            }
        }
    }
    // Keep cleared backups durable in case teardown stops early.
    if let Err(e) = store::save(&state) {
        warn!(error = %e, "could not persist state after DNS restore");
    }

    // 2. Unload both launch services; daemon first so it stops re-applying.
    for plist in [paths::daemon_plist_file(), paths::dnsmasq_plist_file()] {
        match launchd::unload(&plist).await {
            Ok(()) => {}
            Err(e) if opts.force => {
                warn!(plist = %plist.display(), error = %e, "unload failed; continuing");
            }
            Err(e) => return Err(e),
        }
    }

    // 3. Remove installed files and directories.
    for path in [
        paths::daemon_plist_file(),
        paths::dnsmasq_plist_file(),
        PathBuf::from(paths::RUN_DIR),
        PathBuf::from(paths::LOG_DIR),
        PathBuf::from(paths::CONF_DIR),
    ] {
        remove_path(&path, opts.force, &mut report.leftovers)?;
    }

    // 4. The dedicated user comes off only under --force.
    if opts.force {
        let user_path = format!("/Users/{}", paths::RESOLVER_USER);
        let group_path = format!("/Groups/{}", paths::RESOLVER_USER);
        if record_exists(&user_path).await.unwrap_or(false) {
            if let Err(e) = dscl(&["-delete", &user_path]).await {
                warn!(error = %e, "could not delete resolver user");
                report.leftovers.push(format!("user {}", paths::RESOLVER_USER));
            }
        }
        if record_exists(&group_path).await.unwrap_or(false) {
            if let Err(e) = dscl(&["-delete", &group_path]).await {
                warn!(error = %e, "could not delete resolver group");
                report
                    .leftovers
                    .push(format!("group {}", paths::RESOLVER_USER));
            }
        }
    }

    info!(clean = report.clean(), "uninstall finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dscl_id_listing_parses() {
        let stdout = "_www 70\n_mdns 65\nsomeuser 501\nbadline\n";
        let ids = parse_dscl_ids(stdout);
        assert!(ids.contains(&70));
        assert!(ids.contains(&501));
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn next_free_id_skips_taken_ids() {
        let taken: BTreeSet<u32> = [200, 201, 203].into_iter().collect();
        assert_eq!(next_free_id(&taken).unwrap(), 202);
        assert_eq!(next_free_id(&BTreeSet::new()).unwrap(), 200);
    }

    #[test]
    fn next_free_id_errors_when_range_is_full() {
        let taken: BTreeSet<u32> = ID_RANGE.clone().collect();
        assert!(next_free_id(&taken).is_err());
    }

    #[test]
    fn remove_path_accumulates_leftovers_under_force() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never-existed");
        let mut leftovers = Vec::new();
        // Missing paths are fine either way.
        remove_path(&missing, false, &mut leftovers).unwrap();
        remove_path(&missing, true, &mut leftovers).unwrap();
        assert!(leftovers.is_empty());

        let present = dir.path().join("file");
        fs::write(&present, b"x").unwrap();
        remove_path(&present, false, &mut leftovers).unwrap();
        assert!(!present.exists());
    }

    #[test]
    fn uninstall_report_clean_accounting() {
        let mut report = UninstallReport::default();
        assert!(report.clean());
        report.leftovers.push("/Library/LaunchDaemons/x.plist".into());
        assert!(!report.clean());
    }
}

//! One reconcile pass: desired state in, host mutations out.

use macblock_core::{dnsmasq, store, upstreams};
use macblock_platform::{dns, run, services};
use macblock_types::{paths, DesiredState, Error, Result, ServiceDns};
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long an `on` reconcile waits for a default route before applying
/// anyway.
const NETWORK_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// The interception target.
const LOOPBACK_SERVERS: [IpAddr; 1] = [IpAddr::V4(Ipv4Addr::LOCALHOST)];

/// What one pass did.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Whether blocking was in effect after this pass.
    pub mode_on: bool,
    /// Per-item failures ("service: cause"), empty on full success.
    pub failures: Vec<String>,
}

impl ReconcileOutcome {
    /// Whether the pass applied cleanly.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// How the managed-service set moves between passes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServicesDelta {
    /// The freshly selected managed set.
    pub managed: BTreeSet<String>,
    /// Present on the host, no longer selected, still backed up: restore
    /// and forget.
    pub restore_now: Vec<String>,
    /// Backed up but gone from the host: keep the backup until the service
    /// reappears.
    pub vanished: Vec<String>,
}

/// Computes the managed-set delta.
///
/// Backups, not the previous managed set, decide what needs restoring: a
/// service stays "overridden" exactly as long as its backup exists.
pub fn diff_services(
    selected: &BTreeSet<String>,
    present: &BTreeSet<String>,
    backups: &BTreeMap<String, ServiceDns>,
) -> ServicesDelta {
    let mut delta = ServicesDelta {
        managed: selected.clone(),
        ..ServicesDelta::default()
    };
    for service in backups.keys() {
        if !present.contains(service) {
            delta.vanished.push(service.clone());
        } else if !selected.contains(service) {
            delta.restore_now.push(service.clone());
        }
    }
    delta
}

async fn has_default_route() -> bool {
    for family in ["-inet", "-inet6"] {
        if let Ok(output) = run::run(&["route", "-n", "get", family, "default"]).await {
            if output.success() {
                return true;
            }
        }
    }
    false
}

/// Waits (bounded) for the default route to appear before an `on` apply.
async fn network_ready_gate() {
    let deadline = tokio::time::Instant::now() + NETWORK_READY_TIMEOUT;
    loop {
        if has_default_route().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                "no default route after {}s; applying anyway",
                NETWORK_READY_TIMEOUT.as_secs()
            );
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Applies one mutation to the state record under the control-plane lock,
/// re-reading first so a concurrent CLI write is never clobbered.
fn mutate_state(apply: impl FnOnce(&mut DesiredState)) -> Result<DesiredState> {
    let _lock = store::lock()?;
    let mut state = store::load()?;
    apply(&mut state);
    store::save(&state)?;
    Ok(state)
}

/// Runs one reconcile pass. A corrupt state record is fatal for the caller;
/// per-service trouble lands in the outcome instead.
pub async fn reconcile_once() -> Result<ReconcileOutcome> {
    let mut state = store::load()?;
    let now = chrono::Utc::now().timestamp();
    let mut outcome = ReconcileOutcome::default();

    if state.pause_expired(now) {
        info!("pause window expired; resuming blocking");
        state = mutate_state(|s| s.paused_until = None)?;
    }
    outcome.mode_on = state.effective_on(now);

    if outcome.mode_on {
        network_ready_gate().await;
    }

    // Refresh the managed set from the host and the override file.
    let host_services = services::list().await?;
    let exclusions = match std::fs::read_to_string(paths::exclude_services_file()) {
        Ok(text) => services::parse_exclusions(&text),
        Err(_) => BTreeSet::new(),
    };
    let selected = services::select_managed(&host_services, &exclusions);
    let present: BTreeSet<String> =
        host_services.iter().map(|s| s.name.clone()).collect();
    let delta = diff_services(&selected, &present, &state.dns_backup);
    for service in &delta.vanished {
        debug!(service, "service vanished; keeping its backup");
    }

    // Deselected services get their DNS back regardless of mode.
    let mut restored: Vec<String> = Vec::new();
    for service in &delta.restore_now {
        let backup = state.dns_backup[service].clone();
        match dns::restore(service, &backup).await {
            Ok(()) => restored.push(service.clone()),
            Err(e) => outcome.failures.push(format!("{service}: {e}")),
        }
    }

    if outcome.mode_on {
        // Capture a backup for every managed service that lacks one, persist
        // the captures, then and only then point the services at loopback.
        let mut captured: BTreeMap<String, ServiceDns> = BTreeMap::new();
        for service in &delta.managed {
            if state.dns_backup.contains_key(service) {
                continue;
            }
            match dns::get(service).await {
                Ok(current) => {
                    captured.insert(service.clone(), current);
                }
                Err(e) => outcome.failures.push(format!("{service}: {e}")),
            }
        }

        state = mutate_state(|s| {
            for (service, backup) in &captured {
                s.dns_backup
                    .entry(service.clone())
                    .or_insert_with(|| backup.clone());
            }
            for service in &restored {
                s.dns_backup.remove(service);
            }
            // Only services we hold a backup for count as managed.
            s.managed_services = delta
                .managed
                .iter()
                .filter(|service| s.dns_backup.contains_key(*service))
                .cloned()
                .collect();
        })?;

        for service in &delta.managed {
            if !state.dns_backup.contains_key(service) {
                // No backup means capture failed; never override blind.
                continue;
            }
            if let Err(e) = dns::set(service, &LOOPBACK_SERVERS).await {
                outcome.failures.push(format!("{service}: {e}"));
            }
        }
    } else {
        // Off (or paused): restore every present service from its backup.
        for (service, backup) in state.dns_backup.clone() {
            if !present.contains(&service) || restored.contains(&service) {
                continue;
            }
            match dns::restore(&service, &backup).await {
                Ok(()) => restored.push(service),
                Err(e) => outcome.failures.push(format!("{service}: {e}")),
            }
        }
        mutate_state(|s| {
            for service in &restored {
                s.dns_backup.remove(service);
            }
            s.managed_services.clear();
        })?;
    }

    // Keep dnsmasq's upstream rules in sync with the OS resolver table.
    match upstreams::refresh().await {
        Ok(changed) => {
            if changed {
                if let Err(e) = dnsmasq::reload() {
                    outcome.failures.push(format!("dnsmasq reload: {e}"));
                }
            }
        }
        Err(e) => outcome.failures.push(format!("upstreams: {e}")),
    }

    if outcome.success() {
        crate::markers::write_last_apply(now)?;
    }
    info!(
        mode_on = outcome.mode_on,
        failures = outcome.failures.len(),
        "reconcile finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn backups(names: &[&str]) -> BTreeMap<String, ServiceDns> {
        names
            .iter()
            .map(|n| (ToString::to_string(n), ServiceDns::Dhcp))
            .collect()
    }

    #[test]
    fn vanished_services_keep_their_backups() {
        // Host lost Ethernet; its backup must survive untouched.
        let delta = diff_services(
            &set(&["Wi-Fi"]),
            &set(&["Wi-Fi"]),
            &backups(&["Wi-Fi", "Ethernet"]),
        );
        assert_eq!(delta.vanished, ["Ethernet"]);
        assert!(delta.restore_now.is_empty());
        assert_eq!(delta.managed, set(&["Wi-Fi"]));
    }

    #[test]
    fn deselected_but_present_services_are_restored() {
        // User added Ethernet to the exclusion file while it was overridden.
        let delta = diff_services(
            &set(&["Wi-Fi"]),
            &set(&["Wi-Fi", "Ethernet"]),
            &backups(&["Wi-Fi", "Ethernet"]),
        );
        assert_eq!(delta.restore_now, ["Ethernet"]);
        assert!(delta.vanished.is_empty());
    }

    #[test]
    fn reappeared_service_with_backup_is_not_recaptured() {
        // The backup's existence is what skips recapture; diff just has to
        // leave it alone.
        let delta = diff_services(
            &set(&["Wi-Fi", "Ethernet"]),
            &set(&["Wi-Fi", "Ethernet"]),
            &backups(&["Wi-Fi", "Ethernet"]),
        );
        assert!(delta.restore_now.is_empty());
        assert!(delta.vanished.is_empty());
        assert_eq!(delta.managed.len(), 2);
    }

    #[test]
    fn empty_everything_is_a_clean_delta() {
        let delta = diff_services(&set(&[]), &set(&[]), &BTreeMap::new());
        assert_eq!(delta, ServicesDelta::default());
    }
}

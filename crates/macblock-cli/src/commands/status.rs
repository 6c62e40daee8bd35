//! Read-only status display.

use macblock_core::{dnsmasq, store};
use macblock_daemon::markers;
use macblock_types::{paths, DesiredState, Result, ServiceDns};

fn format_time(epoch: i64) -> String {
    chrono::DateTime::from_timestamp(epoch, 0).map_or_else(
        || epoch.to_string(),
        |t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

fn effective_mode(state: &DesiredState, now: i64) -> String {
    if state.effective_on(now) {
        "on".to_string()
    } else if state.paused(now) {
        let until = state.paused_until.unwrap_or(now);
        format!("paused until {}", format_time(until))
    } else {
        "off".to_string()
    }
}

fn describe_backup(backup: &ServiceDns) -> String {
    match backup {
        ServiceDns::Dhcp => "DHCP".to_string(),
        ServiceDns::Servers(ips) => ips
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// `macblock status` - reads state and markers, never mutates anything.
pub async fn run() -> Result<()> {
    let state = store::load()?;
    let now = chrono::Utc::now().timestamp();

    println!("Blocking:      {}", effective_mode(&state, now));
    println!("Source:        {}", state.source);
    match state.last_update_at {
        Some(at) => println!("Last update:   {}", format_time(at)),
        None => println!("Last update:   never (run `macblock update`)"),
    }

    let blocklist_size = std::fs::read_to_string(paths::blocklist_raw_file())
        .map(|text| text.lines().count())
        .ok();
    match blocklist_size {
        Some(count) => println!("Blocked:       {count} domains"),
        None => println!("Blocked:       no compiled blocklist"),
    }

    match markers::live_daemon_pid() {
        Some(pid) => {
            let detail = markers::read_integer(&paths::daemon_last_apply_file())
                .map_or_else(String::new, |at| {
                    format!(", last apply {}", format_time(at))
                });
            println!("Daemon:        running (pid {pid}{detail})");
        }
        None => println!("Daemon:        not running"),
    }
    println!(
        "Resolver:      {}",
        if dnsmasq::is_running() {
            "running"
        } else {
            "not running"
        }
    );

    if state.managed_services.is_empty() && state.dns_backup.is_empty() {
        println!("Services:      none intercepted");
    } else {
        println!("Services:");
        for service in &state.managed_services {
            let backup = state
                .dns_backup
                .get(service)
                .map_or_else(|| "no backup".to_string(), describe_backup);
            println!("  {service}: intercepted (was {backup})");
        }
        for (service, backup) in &state.dns_backup {
            if !state.managed_services.contains(service) {
                println!(
                    "  {service}: backup held ({}), service not currently managed",
                    describe_backup(backup)
                );
            }
        }
    }

    if !state.allowlist.is_empty() || !state.denylist.is_empty() {
        println!(
            "Lists:         {} allowed, {} denied",
            state.allowlist.len(),
            state.denylist.len()
        );
    }
    Ok(())
}

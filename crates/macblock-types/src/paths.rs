//! Canonical on-disk locations.
//!
//! File names are part of the compatibility contract; nothing outside this
//! module spells out a macblock path.

use std::path::{Path, PathBuf};

/// Configuration directory: state, allow/deny lists, overrides.
pub const CONF_DIR: &str = "/usr/local/etc/macblock";
/// Runtime directory: generated dnsmasq config and marker files.
pub const RUN_DIR: &str = "/usr/local/var/run/macblock";
/// Log directory for the daemon and dnsmasq.
pub const LOG_DIR: &str = "/usr/local/var/log/macblock";
/// Where launchd daemon manifests live.
pub const LAUNCH_DIR: &str = "/Library/LaunchDaemons";

/// launchd label of the reconcile daemon.
pub const DAEMON_LABEL: &str = "com.macblock.daemon";
/// launchd label of the dnsmasq service.
pub const DNSMASQ_LABEL: &str = "com.macblock.dnsmasq";

/// Dedicated unprivileged user (and group) dnsmasq runs as.
pub const RESOLVER_USER: &str = "_macblock";

/// Address the loopback resolver listens on.
pub const LOOPBACK: &str = "127.0.0.1";

/// dnsmasq binary candidates, probed in order (Apple silicon first).
pub const DNSMASQ_CANDIDATES: &[&str] =
    &["/opt/homebrew/sbin/dnsmasq", "/usr/local/sbin/dnsmasq"];

/// Environment variable overriding the dnsmasq binary path. Never forwarded
/// across a privilege escalation.
pub const ENV_DNSMASQ_BIN: &str = "MACBLOCK_DNSMASQ_BIN";
/// Environment variable overriding the macblock binary path used in launchd
/// manifests. Never forwarded across a privilege escalation.
pub const ENV_MACBLOCK_BIN: &str = "MACBLOCK_BIN";
/// Marker set on the escalated re-exec to stop recursion.
pub const ENV_ESCALATED: &str = "MACBLOCK_ESCALATED";

/// `<CONF>/state.json`
pub fn state_file() -> PathBuf {
    Path::new(CONF_DIR).join("state.json")
}

/// `<CONF>/.lock`: advisory lock serializing control-plane commands.
pub fn state_lock_file() -> PathBuf {
    Path::new(CONF_DIR).join(".lock")
}

/// `<CONF>/whitelist.txt`: domains never blocked.
pub fn allowlist_file() -> PathBuf {
    Path::new(CONF_DIR).join("whitelist.txt")
}

/// `<CONF>/blacklist.txt`: domains always blocked.
pub fn denylist_file() -> PathBuf {
    Path::new(CONF_DIR).join("blacklist.txt")
}

/// `<CONF>/dns.exclude_services`: user-excluded network services.
pub fn exclude_services_file() -> PathBuf {
    Path::new(CONF_DIR).join("dns.exclude_services")
}

/// `<CONF>/upstream.fallbacks`: known-good upstream IPs.
pub fn fallback_upstreams_file() -> PathBuf {
    Path::new(CONF_DIR).join("upstream.fallbacks")
}

/// `<RUN>/upstream.conf`: dnsmasq `server=` rules.
pub fn upstream_conf_file() -> PathBuf {
    Path::new(RUN_DIR).join("upstream.conf")
}

/// `<RUN>/blocklist.raw`: compiled domains, one per line, sorted.
pub fn blocklist_raw_file() -> PathBuf {
    Path::new(RUN_DIR).join("blocklist.raw")
}

/// `<RUN>/blocklist.conf`: dnsmasq `address=/domain/` NXDOMAIN rules.
pub fn blocklist_conf_file() -> PathBuf {
    Path::new(RUN_DIR).join("blocklist.conf")
}

/// `<RUN>/dnsmasq.conf`: static dnsmasq configuration.
pub fn dnsmasq_conf_file() -> PathBuf {
    Path::new(RUN_DIR).join("dnsmasq.conf")
}

/// `<RUN>/dnsmasq.pid`: written by dnsmasq itself.
pub fn dnsmasq_pid_file() -> PathBuf {
    Path::new(RUN_DIR).join("dnsmasq.pid")
}

/// `<RUN>/daemon.pid`
pub fn daemon_pid_file() -> PathBuf {
    Path::new(RUN_DIR).join("daemon.pid")
}

/// `<RUN>/daemon.ready`: epoch seconds of the first successful reconcile.
pub fn daemon_ready_file() -> PathBuf {
    Path::new(RUN_DIR).join("daemon.ready")
}

/// `<RUN>/daemon.last_apply`: epoch seconds of the last successful apply.
pub fn daemon_last_apply_file() -> PathBuf {
    Path::new(RUN_DIR).join("daemon.last_apply")
}

/// `<LOG>/daemon.log`: the daemon's tracing output.
pub fn daemon_log_file() -> PathBuf {
    Path::new(LOG_DIR).join("daemon.log")
}

/// `<LOG>/daemon.stdout.log` / `<LOG>/daemon.stderr.log`: launchd captures.
pub fn daemon_stdio_log_file(stream: &str) -> PathBuf {
    Path::new(LOG_DIR).join(format!("daemon.{stream}.log"))
}

/// `<LOG>/dnsmasq.log`
pub fn dnsmasq_log_file() -> PathBuf {
    Path::new(LOG_DIR).join("dnsmasq.log")
}

/// `<LAUNCH>/com.macblock.daemon.plist`
pub fn daemon_plist_file() -> PathBuf {
    Path::new(LAUNCH_DIR).join(format!("{DAEMON_LABEL}.plist"))
}

/// `<LAUNCH>/com.macblock.dnsmasq.plist`
pub fn dnsmasq_plist_file() -> PathBuf {
    Path::new(LAUNCH_DIR).join(format!("{DNSMASQ_LABEL}.plist"))
}

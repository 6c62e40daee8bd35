//! Control of the cooperating dnsmasq process.
//!
//! dnsmasq is supervised by launchd, not by us. We read its PID file, signal
//! it to reload, and optionally probe a canary query to confirm the new
//! config is live.

use macblock_types::{paths, Error, Result};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Renders the static dnsmasq configuration laid down at install.
pub fn render_config() -> String {
    format!(
        "# Generated by macblock; do not edit. Regenerated on install.\n\
         listen-address={loopback}\n\
         port=53\n\
         user={user}\n\
         no-resolv\n\
         domain-needed\n\
         bogus-priv\n\
         cache-size=10000\n\
         servers-file={servers}\n\
         conf-file={blocklist}\n\
         log-facility={log}\n",
        loopback = paths::LOOPBACK,
        user = paths::RESOLVER_USER,
        servers = paths::upstream_conf_file().display(),
        blocklist = paths::blocklist_conf_file().display(),
        log = paths::dnsmasq_log_file().display(),
    )
}

/// Locates the dnsmasq binary: the environment override first (never
/// forwarded across escalation), then the well-known Homebrew paths.
pub fn find_binary() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(paths::ENV_DNSMASQ_BIN) {
        let path = PathBuf::from(&custom);
        if path.is_file() {
            return Ok(path);
        }
        return Err(Error::platform(format!(
            "{} points at {custom:?} which does not exist",
            paths::ENV_DNSMASQ_BIN
        )));
    }
    for candidate in paths::DNSMASQ_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.is_file() {
            return Ok(path);
        }
    }
    Err(Error::platform(format!(
        "dnsmasq not found (tried {}); install it with `brew install dnsmasq`",
        paths::DNSMASQ_CANDIDATES.join(", ")
    )))
}

/// Reads a PID file: a single decimal integer, trailing newline tolerated.
/// Missing file is `None`; garbage is an error naming the file.
pub fn read_pid_file(path: &Path) -> Result<Option<i32>> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let trimmed = text.trim();
            trimmed.parse::<i32>().map(Some).map_err(|_| {
                Error::transient(
                    format!("reading {}", path.display()),
                    format!("not a PID: {trimmed:?}"),
                )
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::transient(
            format!("reading {}", path.display()),
            e.to_string(),
        )),
    }
}

/// Whether a process with this PID exists (signal 0 probe).
#[cfg(unix)]
fn process_exists(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn process_exists(_pid: i32) -> bool {
    false
}

/// Whether dnsmasq is currently running according to its PID file.
#[must_use]
pub fn is_running() -> bool {
    matches!(
        read_pid_file(&paths::dnsmasq_pid_file()),
        Ok(Some(pid)) if process_exists(pid)
    )
}

/// Signals dnsmasq to reload its servers-file and conf-file.
///
/// "Not running" and "stale PID file" are transient failures: the caller
/// retries on the next reconcile once launchd has restarted the resolver.
pub fn reload() -> Result<()> {
    let pid_path = paths::dnsmasq_pid_file();
    let pid = read_pid_file(&pid_path)?.ok_or_else(|| {
        Error::transient(
            "reloading dnsmasq",
            format!("not running (no PID file at {})", pid_path.display()),
        )
    })?;

    #[cfg(unix)]
    {
        match kill(Pid::from_raw(pid), Signal::SIGHUP) {
            Ok(()) => {
                debug!(pid, "sent SIGHUP to dnsmasq");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => Err(Error::transient(
                "reloading dnsmasq",
                format!("stale PID file ({pid} is gone)"),
            )),
            Err(e) => Err(Error::transient(
                "reloading dnsmasq",
                format!("kill({pid}, SIGHUP): {e}"),
            )),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(Error::platform("signal delivery requires a Unix host"))
    }
}

/// Best-effort canary: queries the loopback resolver for a domain expected
/// to be blocked and reports whether it answered NXDOMAIN. Failures are
/// logged, never propagated; this confirms liveness, it does not gate it.
pub async fn canary_blocked(domain: &str) -> bool {
    use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
    use hickory_resolver::error::ResolveErrorKind;
    use hickory_resolver::proto::op::ResponseCode;
    use hickory_resolver::TokioAsyncResolver;

    let group = NameServerConfigGroup::from_ips_clear(
        &[IpAddr::V4(Ipv4Addr::LOCALHOST)],
        53,
        true,
    );
    let mut opts = ResolverOpts::default();
    opts.timeout = Duration::from_secs(2);
    opts.attempts = 1;
    opts.use_hosts_file = false;
    opts.cache_size = 0;
    let resolver =
        TokioAsyncResolver::tokio(ResolverConfig::from_parts(None, Vec::new(), group), opts);

    match resolver.lookup_ip(domain).await {
        Ok(_) => {
            warn!(domain, "canary domain unexpectedly resolved");
            false
        }
        Err(e) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. }
                if *response_code == ResponseCode::NXDomain =>
            {
                debug!(domain, "canary NXDOMAIN confirmed");
                true
            }
            other => {
                warn!(domain, error = %other, "canary query failed");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_pins_the_resolver_contract() {
        let conf = render_config();
        assert!(conf.contains("listen-address=127.0.0.1"));
        assert!(conf.contains("port=53"));
        assert!(conf.contains("user=_macblock"));
        assert!(conf.contains("servers-file=/usr/local/var/run/macblock/upstream.conf"));
        assert!(conf.contains("conf-file=/usr/local/var/run/macblock/blocklist.conf"));
        assert!(conf.contains("no-resolv"));
    }

    #[test]
    fn pid_file_parses_single_decimal_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dnsmasq.pid");

        fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_pid_file(&path).unwrap(), Some(4242));

        fs::write(&path, "not-a-pid\n").unwrap();
        assert!(read_pid_file(&path).is_err());

        assert_eq!(read_pid_file(&dir.path().join("missing")).unwrap(), None);
    }
}

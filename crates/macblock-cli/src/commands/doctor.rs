//! Read-only health checks.

use macblock_core::{dnsmasq, store};
use macblock_daemon::markers;
use macblock_platform::launchd;
use macblock_types::{paths, Error, Result};

enum Verdict {
    Pass,
    Warn,
    Fail,
}

struct Probe {
    name: &'static str,
    verdict: Verdict,
    detail: String,
}

impl Probe {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            verdict: Verdict::Pass,
            detail: detail.into(),
        }
    }
    fn warn(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            verdict: Verdict::Warn,
            detail: detail.into(),
        }
    }
    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            verdict: Verdict::Fail,
            detail: detail.into(),
        }
    }
}

/// How stale `daemon.last_apply` may be before it is worth a warning. The
/// periodic tick alone refreshes it twice as often as this.
const LAST_APPLY_STALE_SECS: i64 = 120;

/// `macblock doctor` - probes everything, mutates nothing, hints at fixes.
pub async fn run() -> Result<()> {
    let mut probes: Vec<Probe> = Vec::new();

    let on_macos = cfg!(target_os = "macos");
    probes.push(if on_macos {
        Probe::pass("platform", "macOS")
    } else {
        Probe::fail("platform", "not macOS; macblock cannot manage this host")
    });

    probes.push(match dnsmasq::find_binary() {
        Ok(path) => Probe::pass("dnsmasq binary", path.display().to_string()),
        Err(e) => Probe::fail("dnsmasq binary", e.to_string()),
    });

    probes.push(match store::load() {
        Ok(state) => {
            let mode = if state.enabled { "enabled" } else { "disabled" };
            Probe::pass("state file", format!("loads cleanly ({mode})"))
        }
        Err(e) => Probe::fail("state file", e.to_string()),
    });

    if on_macos {
        for label in [paths::DAEMON_LABEL, paths::DNSMASQ_LABEL] {
            probes.push(match launchd::is_loaded(label).await {
                Ok(true) => Probe::pass("launchd", format!("{label} loaded")),
                Ok(false) => Probe::fail(
                    "launchd",
                    format!("{label} not loaded; run `sudo macblock install`"),
                ),
                Err(e) => Probe::warn("launchd", format!("{label}: {e}")),
            });
        }

        probes.push(match launchd::port53_listeners().await {
            Ok(listeners) if listeners.iter().any(|l| l.command == "dnsmasq") => {
                Probe::pass("port 53", "dnsmasq is listening")
            }
            Ok(listeners) if listeners.is_empty() => {
                Probe::fail("port 53", "nothing is listening; resolver is down")
            }
            Ok(listeners) => Probe::fail(
                "port 53",
                format!(
                    "foreign listener: {}",
                    listeners
                        .iter()
                        .map(|l| format!("{} (pid {})", l.command, l.pid))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ),
            Err(e) => Probe::warn("port 53", e.to_string()),
        });
    }

    probes.push(match markers::live_daemon_pid() {
        Some(pid) => Probe::pass("daemon", format!("running (pid {pid})")),
        None => Probe::fail("daemon", "not running; launchd should be keeping it alive"),
    });

    let now = chrono::Utc::now().timestamp();
    probes.push(
        match markers::read_integer(&paths::daemon_last_apply_file()) {
            Some(at) if now - at <= LAST_APPLY_STALE_SECS => {
                Probe::pass("last apply", format!("{}s ago", now - at))
            }
            Some(at) => Probe::warn(
                "last apply",
                format!("{}s ago; daemon may be wedged", now - at),
            ),
            None => Probe::warn("last apply", "no marker yet"),
        },
    );

    let raw = std::fs::read_to_string(paths::blocklist_raw_file());
    probes.push(match raw {
        Ok(text) => {
            let count = text.lines().count();
            if count == 0 {
                Probe::warn("blocklist", "compiled but empty; run `macblock update`")
            } else {
                Probe::pass("blocklist", format!("{count} domains compiled"))
            }
        }
        Err(_) => Probe::warn("blocklist", "not compiled yet; run `macblock update`"),
    });

    if on_macos && dnsmasq::is_running() {
        let sample = std::fs::read_to_string(paths::blocklist_raw_file())
            .ok()
            .and_then(|text| text.lines().next().map(ToString::to_string));
        if let Some(domain) = sample {
            probes.push(if dnsmasq::canary_blocked(&domain).await {
                Probe::pass("canary", format!("{domain} answers NXDOMAIN"))
            } else {
                Probe::warn("canary", format!("{domain} did not answer NXDOMAIN"))
            });
        }
    }

    let mut failed = 0;
    for probe in &probes {
        let tag = match probe.verdict {
            Verdict::Pass => "ok  ",
            Verdict::Warn => "warn",
            Verdict::Fail => {
                failed += 1;
                "FAIL"
            }
        };
        println!("[{tag}] {:12} {}", probe.name, probe.detail);
    }

    if failed > 0 {
        return Err(Error::user(format!(
            "{failed} of {} checks failed",
            probes.len()
        )));
    }
    println!("All checks passed.");
    Ok(())
}

//! launchd manifests and service control.

use crate::run;
use macblock_types::{paths, Error, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Renders the reconcile daemon's launchd manifest.
pub fn render_daemon_plist(program: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{program}</string>
        <string>daemon</string>
        <string>run</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>ThrottleInterval</key>
    <integer>5</integer>
    <key>StandardOutPath</key>
    <string>{stdout}</string>
    <key>StandardErrorPath</key>
    <string>{stderr}</string>
</dict>
</plist>
"#,
        label = paths::DAEMON_LABEL,
        program = program.display(),
        stdout = paths::daemon_stdio_log_file("stdout").display(),
        stderr = paths::daemon_stdio_log_file("stderr").display(),
    )
}

/// Renders the dnsmasq launchd manifest. dnsmasq stays in the foreground so
/// launchd supervises it, but still writes its PID file for reloads.
pub fn render_dnsmasq_plist(dnsmasq_bin: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{program}</string>
        <string>--keep-in-foreground</string>
        <string>--conf-file={conf}</string>
        <string>--pid-file={pid}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
</dict>
</plist>
"#,
        label = paths::DNSMASQ_LABEL,
        program = dnsmasq_bin.display(),
        conf = paths::dnsmasq_conf_file().display(),
        pid = paths::dnsmasq_pid_file().display(),
    )
}

/// Loads a manifest with `launchctl load -w`.
pub async fn load(plist: &Path) -> Result<()> {
    let plist_str = plist.to_string_lossy();
    run::run_checked(
        &["launchctl", "load", "-w", plist_str.as_ref()],
        run::DEFAULT_TIMEOUT,
    )
    .await?;
    info!(plist = %plist.display(), "loaded launch service");
    Ok(())
}

/// Unloads a manifest with `launchctl unload`. Missing or already-unloaded
/// services are not errors.
pub async fn unload(plist: &Path) -> Result<()> {
    if !plist.exists() {
        return Ok(());
    }
    let plist_str = plist.to_string_lossy();
    let output = run::run(&["launchctl", "unload", plist_str.as_ref()]).await?;
    if !output.success() && !output.stderr.contains("Could not find") {
        return Err(Error::transient(
            format!("launchctl unload {plist_str}"),
            format!("exit {}: {}", output.exit_code, output.stderr.trim()),
        ));
    }
    info!(plist = %plist.display(), "unloaded launch service");
    Ok(())
}

/// Whether launchd knows the label at all.
pub async fn is_loaded(label: &str) -> Result<bool> {
    let output = run::run(&["launchctl", "list", label]).await?;
    Ok(output.success())
}

/// Extracts the running PID from `launchctl list <label>` output, if any.
pub fn parse_listed_pid(stdout: &str) -> Option<u32> {
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("\"PID\"") {
            let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
            if let Ok(pid) = digits.parse() {
                return Some(pid);
            }
        }
    }
    None
}

/// Polls until the labelled service reports a PID, or errors after
/// `timeout`.
pub async fn wait_running(label: &str, timeout: Duration) -> Result<u32> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let output = run::run(&["launchctl", "list", label]).await?;
        if output.success() {
            if let Some(pid) = parse_listed_pid(&output.stdout) {
                debug!(label, pid, "launch service is running");
                return Ok(pid);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::transient(
                format!("waiting for {label}"),
                format!("service did not reach running within {}s", timeout.as_secs()),
            ));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// A process listening on a port, as reported by `lsof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortListener {
    /// Process name.
    pub command: String,
    /// Process ID.
    pub pid: u32,
}

/// Parses `lsof` tabular output into listener entries.
pub fn parse_lsof(stdout: &str) -> Vec<PortListener> {
    let mut listeners = Vec::new();
    for line in stdout.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let (Some(command), Some(pid)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(pid) = pid.parse() else {
            continue;
        };
        let entry = PortListener {
            command: command.to_string(),
            pid,
        };
        if !listeners.contains(&entry) {
            listeners.push(entry);
        }
    }
    listeners
}

/// Lists processes bound to port 53 on either protocol. `lsof` exits 1 when
/// nothing matches, which is not an error.
pub async fn port53_listeners() -> Result<Vec<PortListener>> {
    let output = run::run(&["lsof", "-nP", "-iTCP:53", "-iUDP:53"]).await?;
    if !output.success() && !output.stdout.trim().is_empty() {
        return Err(Error::transient(
            "lsof -i :53",
            format!("exit {}: {}", output.exit_code, output.stderr.trim()),
        ));
    }
    Ok(parse_lsof(&output.stdout))
}

//! Privilege escalation for install/uninstall.

use macblock_types::{paths, Error, Result};

/// Whether the process is running as root.
#[must_use]
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Environment variables forwarded across the sudo boundary. Everything
/// else is dropped, in particular anything that affects binary discovery.
fn passthrough_env() -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(key, _)| key == "TERM" || key == "LANG" || key.starts_with("LC_"))
        .collect()
}

/// Ensures the current command runs as root, re-execing under sudo if not.
///
/// The re-exec passes a minimal environment: the escalation marker plus
/// terminal/locale variables. Seeing the marker while still unprivileged
/// means sudo did not deliver root; abort instead of recursing.
pub fn ensure_root() -> Result<()> {
    if is_root() {
        return Ok(());
    }
    if std::env::var_os(paths::ENV_ESCALATED).is_some() {
        return Err(Error::privilege(
            "still not root after sudo re-exec; run this command with sudo directly",
        ));
    }

    let exe = std::env::current_exe()?;
    let mut sudo_args: Vec<String> = vec![format!("{}=1", paths::ENV_ESCALATED)];
    for (key, value) in passthrough_env() {
        sudo_args.push(format!("{key}={value}"));
    }
    sudo_args.push(exe.display().to_string());
    sudo_args.extend(std::env::args().skip(1));

    let status = std::process::Command::new("sudo")
        .args(&sudo_args)
        .status()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::privilege("root required and sudo is not available")
            } else {
                Error::privilege(format!("sudo failed: {e}"))
            }
        })?;

    // The escalated child did the real work; mirror its exit.
    std::process::exit(status.code().unwrap_or(1));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_keeps_only_terminal_and_locale() {
        std::env::set_var("LC_ALL", "C");
        std::env::set_var("MACBLOCK_BIN", "/tmp/evil");
        let kept = passthrough_env();
        assert!(kept.iter().any(|(k, _)| k == "LC_ALL"));
        assert!(!kept.iter().any(|(k, _)| k == "MACBLOCK_BIN"));
        std::env::remove_var("MACBLOCK_BIN");
    }
}

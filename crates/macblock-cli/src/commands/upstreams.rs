//! Fallback upstream commands.

use crate::app::UpstreamsCommands;
use macblock_core::{store, upstreams};
use macblock_daemon::markers;
use macblock_types::{paths, Error, Result};
use std::net::IpAddr;
use tracing::warn;

/// `macblock upstreams <list|set|reset>`
pub async fn run(command: UpstreamsCommands) -> Result<()> {
    let path = paths::fallback_upstreams_file();
    match command {
        UpstreamsCommands::List => {
            for ip in upstreams::read_fallbacks(&path)? {
                println!("{ip}");
            }
            Ok(())
        }
        UpstreamsCommands::Set { ips } => {
            let mut parsed: Vec<IpAddr> = Vec::new();
            for raw in &ips {
                let ip: IpAddr = raw
                    .parse()
                    .map_err(|_| Error::user(format!("not an IP address: {raw:?}")))?;
                if ip.is_loopback() {
                    return Err(Error::user(
                        "a loopback address cannot be a fallback upstream",
                    ));
                }
                if !parsed.contains(&ip) {
                    parsed.push(ip);
                }
            }

            let _lock = store::lock()?;
            upstreams::write_fallbacks(&path, &parsed)?;
            drop(_lock);

            kick_for_rerender();
            println!("Fallback upstreams set ({}).", ips.join(", "));
            Ok(())
        }
        UpstreamsCommands::Reset => {
            let _lock = store::lock()?;
            upstreams::write_fallbacks(&path, &upstreams::default_fallbacks())?;
            drop(_lock);

            kick_for_rerender();
            println!(
                "Fallback upstreams reset to {}.",
                upstreams::DEFAULT_FALLBACKS.join(", ")
            );
            Ok(())
        }
    }
}

fn kick_for_rerender() {
    match markers::kick() {
        Ok(true) => {}
        Ok(false) => warn!("daemon is not running; upstream rules rerender when it starts"),
        Err(e) => warn!(error = %e, "could not kick the daemon"),
    }
}

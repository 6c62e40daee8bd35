//! The update command: compile and apply the blocklist.

use macblock_core::blocklist::{self, CompileOptions};
use macblock_core::{dnsmasq, sources, store};
use macblock_types::{Error, Result};
use tracing::warn;

/// `macblock update [--source <name|url>] [--min-domains <n>]`
pub async fn run(source_override: Option<String>, min_domains: Option<usize>) -> Result<()> {
    let _lock = store::lock()?;
    let mut state = store::load()?;

    let selected = source_override.as_deref().unwrap_or(&state.source);
    let source = sources::resolve(selected)?;
    if min_domains.is_some() && source.builtin {
        warn!("--min-domains only applies to custom URL sources; built-ins keep the full floor");
    }

    let compiled =
        blocklist::compile_to_files(&source, &CompileOptions { min_domains }).await?;

    // Compiled files and the state record advance together, before the
    // resolver is told to look.
    state.source = source.id.clone();
    state.last_update_at = Some(chrono::Utc::now().timestamp());
    store::save(&state)?;

    dnsmasq::reload().map_err(|e| {
        Error::transient(
            "blocklist compiled and recorded, but the resolver did not reload",
            format!("{e}; it picks the new set up when it next starts"),
        )
    })?;

    if let Some(sample) = compiled.domains.iter().next() {
        if !dnsmasq::canary_blocked(sample).await {
            warn!(domain = %sample, "canary query did not come back NXDOMAIN");
        }
    }

    println!(
        "Blocklist updated from {}: {} domains ({} from denylist, {} removed by allowlist).",
        source.id,
        compiled.domains.len(),
        compiled.denied,
        compiled.allowed,
    );
    Ok(())
}

//! Rendering dnsmasq upstream rules from the OS resolver table.

use crate::fsutil;
use macblock_platform::resolver_table::{self, ResolverTable};
use macblock_types::{paths, Error, Result};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use tracing::{info, warn};

/// Fallback upstreams shipped by default, used when the host has none.
pub const DEFAULT_FALLBACKS: &[&str] = &["1.1.1.1", "8.8.8.8"];

/// Renders `server=` lines for dnsmasq.
///
/// Global upstreams first, then scoped upstreams sorted by domain. When the
/// table has no global upstreams the fallbacks stand in, so the resolver
/// never ends up with nowhere to forward.
pub fn render(table: &ResolverTable, fallbacks: &[IpAddr]) -> String {
    let mut out = String::new();

    let defaults: Vec<IpAddr> = if table.default.is_empty() {
        fallbacks
            .iter()
            .copied()
            .filter(|ip| !ip.is_loopback())
            .collect()
    } else {
        table.default.clone()
    };
    for ip in &defaults {
        out.push_str(&format!("server={ip}\n"));
    }
    for (domain, ips) in &table.per_domain {
        for ip in ips {
            out.push_str(&format!("server=/{domain}/{ip}\n"));
        }
    }
    out
}

/// Parses the fallback upstreams file: one IP per line, `#` comments.
/// Invalid lines are skipped with a warning.
pub fn parse_fallbacks(text: &str) -> Vec<IpAddr> {
    let mut ips = Vec::new();
    for raw in text.lines() {
        let line = raw
            .split_once('#')
            .map_or(raw, |(before, _)| before)
            .trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<IpAddr>() {
            Ok(ip) if !ips.contains(&ip) => ips.push(ip),
            Ok(_) => {}
            Err(_) => warn!(line, "skipping invalid fallback upstream"),
        }
    }
    ips
}

/// Reads the persisted fallback list, defaulting to [`DEFAULT_FALLBACKS`]
/// when the file is missing.
pub fn read_fallbacks(path: &Path) -> Result<Vec<IpAddr>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse_fallbacks(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(default_fallbacks()),
        Err(e) => Err(Error::transient(
            format!("reading {}", path.display()),
            e.to_string(),
        )),
    }
}

/// Writes the fallback list, one IP per line.
pub fn write_fallbacks(path: &Path, ips: &[IpAddr]) -> Result<()> {
    let mut rendered = String::new();
    for ip in ips {
        rendered.push_str(&ip.to_string());
        rendered.push('\n');
    }
    fsutil::write_atomic(path, rendered.as_bytes(), fsutil::MODE_FILE)
}

/// The shipped default fallbacks.
#[must_use]
pub fn default_fallbacks() -> Vec<IpAddr> {
    DEFAULT_FALLBACKS
        .iter()
        .map(|s| s.parse().expect("default fallback is a valid IP"))
        .collect()
}

/// Re-reads the live resolver table, renders upstream rules, and writes
/// `upstream.conf` atomically. Returns whether the file content changed.
pub async fn refresh() -> Result<bool> {
    let table = resolver_table::read().await?;
    let fallbacks = read_fallbacks(&paths::fallback_upstreams_file())?;
    let rendered = render(&table, &fallbacks);

    let path = paths::upstream_conf_file();
    let changed = fs::read_to_string(&path).map_or(true, |old| old != rendered);
    if changed {
        fsutil::write_atomic(&path, rendered.as_bytes(), fsutil::MODE_FILE)?;
        info!(
            default = table.default.len(),
            scoped = table.per_domain.len(),
            "rewrote upstream rules"
        );
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use macblock_platform::resolver_table::parse;

    #[test]
    fn renders_default_then_scoped_sorted_by_domain() {
        let table = parse(
            "resolver #1\n  nameserver[0] : 1.1.1.1\n  nameserver[1] : 127.0.0.1\n\
             resolver #2\n  domain : corp.example.\n  nameserver[0] : 10.0.0.53\n",
        );
        let rendered = render(&table, &[]);
        assert_eq!(rendered, "server=1.1.1.1\nserver=/corp.example/10.0.0.53\n");
    }

    #[test]
    fn scoped_domains_render_in_sorted_order() {
        let table = parse(
            "resolver #1\n  nameserver[0] : 9.9.9.9\n\
             resolver #2\n  domain : zeta.example\n  nameserver[0] : 10.0.0.2\n\
             resolver #3\n  domain : alpha.example\n  nameserver[0] : 10.0.0.1\n",
        );
        let rendered = render(&table, &[]);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            [
                "server=9.9.9.9",
                "server=/alpha.example/10.0.0.1",
                "server=/zeta.example/10.0.0.2"
            ]
        );
    }

    #[test]
    fn empty_default_uses_fallbacks() {
        let table = ResolverTable::default();
        let rendered = render(&table, &default_fallbacks());
        assert_eq!(rendered, "server=1.1.1.1\nserver=8.8.8.8\n");
    }

    #[test]
    fn loopback_fallbacks_are_dropped() {
        let table = ResolverTable::default();
        let fallbacks: Vec<IpAddr> =
            vec!["127.0.0.1".parse().unwrap(), "9.9.9.9".parse().unwrap()];
        assert_eq!(render(&table, &fallbacks), "server=9.9.9.9\n");
    }

    #[test]
    fn fallback_file_parses_tolerantly() {
        let ips = parse_fallbacks("1.1.1.1\n# comment\nnot-an-ip\n8.8.8.8 # google\n1.1.1.1\n");
        let rendered: Vec<String> = ips.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["1.1.1.1", "8.8.8.8"]);
    }

    #[test]
    fn missing_fallback_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ips = read_fallbacks(&dir.path().join("upstream.fallbacks")).unwrap();
        assert_eq!(ips, default_fallbacks());
    }
}

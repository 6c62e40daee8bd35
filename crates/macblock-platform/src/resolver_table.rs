//! Reading the OS resolver table from `scutil --dns`.

use crate::run;
use macblock_types::Result;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Parsed system DNS configuration: global upstreams plus split-DNS scoped
/// upstreams keyed by domain suffix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolverTable {
    /// Upstreams for unscoped queries, in order of first appearance.
    pub default: Vec<IpAddr>,
    /// Per-suffix upstreams (VPN split DNS), domain with trailing dot
    /// stripped.
    pub per_domain: BTreeMap<String, Vec<IpAddr>>,
}

impl ResolverTable {
    /// Whether the table has no usable upstreams at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.per_domain.is_empty()
    }
}

/// Addresses we must never propagate as upstreams: ourselves and the
/// unspecified addresses.
fn is_unusable(ip: IpAddr) -> bool {
    ip.is_loopback() || ip.is_unspecified()
}

/// Parses `scutil --dns` output.
///
/// Sections start at `resolver #N`; a `domain : X` line marks the section as
/// scoped, `nameserver[k] : IP` lines list upstreams. scutil prints the
/// table twice (plain and "for scoped queries"); buckets deduplicate while
/// preserving order of first appearance, so the duplication is harmless.
pub fn parse(text: &str) -> ResolverTable {
    let mut table = ResolverTable::default();
    let mut domain: Option<String> = None;
    let mut servers: Vec<IpAddr> = Vec::new();

    let mut flush = |domain: &mut Option<String>, servers: &mut Vec<IpAddr>| {
        if servers.is_empty() {
            *domain = None;
            return;
        }
        let bucket = match domain.take() {
            Some(d) => table.per_domain.entry(d).or_default(),
            None => &mut table.default,
        };
        for ip in servers.drain(..) {
            if !bucket.contains(&ip) {
                bucket.push(ip);
            }
        }
    };

    for raw in text.lines() {
        let line = raw.trim();
        if line.starts_with("resolver #") {
            flush(&mut domain, &mut servers);
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key == "domain" || key.starts_with("domain[") {
            let name = value.trim_end_matches('.').to_ascii_lowercase();
            if !name.is_empty() {
                domain = Some(name);
            }
        } else if key == "nameserver" || key.starts_with("nameserver[") {
            if let Ok(ip) = value.parse::<IpAddr>() {
                if !is_unusable(ip) {
                    servers.push(ip);
                }
            }
        }
    }
    flush(&mut domain, &mut servers);

    table
}

/// Reads and parses the live resolver table.
pub async fn read() -> Result<ResolverTable> {
    let output = run::run_checked(&["scutil", "--dns"], run::DEFAULT_TIMEOUT).await?;
    Ok(parse(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_default_and_scoped_resolvers() {
        let text = "\
DNS configuration

resolver #1
  nameserver[0] : 1.1.1.1
  nameserver[1] : 127.0.0.1
  if_index : 14 (en0)

resolver #2
  domain   : corp.example.
  nameserver[0] : 10.0.0.53
";
        let table = parse(text);
        assert_eq!(table.default, vec!["1.1.1.1".parse::<IpAddr>().unwrap()]);
        assert_eq!(
            table.per_domain.get("corp.example").unwrap(),
            &vec!["10.0.0.53".parse::<IpAddr>().unwrap()]
        );
    }

    #[test]
    fn accepts_unindexed_nameserver_lines() {
        let table = parse("resolver #1\n  nameserver: 9.9.9.9\n");
        assert_eq!(table.default, vec!["9.9.9.9".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn drops_loopback_and_unspecified() {
        let text = "\
resolver #1
  nameserver[0] : 127.0.0.1
  nameserver[1] : ::1
  nameserver[2] : 0.0.0.0
  nameserver[3] : ::
";
        assert!(parse(text).is_empty());
    }

    #[test]
    fn deduplicates_within_a_bucket_preserving_order() {
        let text = "\
resolver #1
  nameserver[0] : 8.8.8.8
  nameserver[1] : 1.1.1.1
resolver #2
  nameserver[0] : 8.8.8.8
resolver #3
  domain : corp.example
  nameserver[0] : 10.0.0.53
resolver #4
  domain : corp.example.
  nameserver[0] : 10.0.0.53
  nameserver[1] : 10.0.0.54
";
        let table = parse(text);
        let dflt: Vec<String> = table.default.iter().map(ToString::to_string).collect();
        assert_eq!(dflt, ["8.8.8.8", "1.1.1.1"]);
        let corp: Vec<String> = table.per_domain["corp.example"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(corp, ["10.0.0.53", "10.0.0.54"]);
    }

    #[test]
    fn ipv6_nameservers_parse() {
        let table = parse("resolver #1\n  nameserver[0] : fd00::53\n");
        assert_eq!(table.default, vec!["fd00::53".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn scoped_section_without_servers_is_ignored() {
        let table = parse("resolver #1\n  domain : corp.example\n  flags : Scoped\n");
        assert!(table.per_domain.is_empty());
    }
}

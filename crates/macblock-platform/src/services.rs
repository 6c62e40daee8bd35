//! Network-service listing and managed-service selection.

use crate::run;
use macblock_types::Result;
use std::collections::BTreeSet;

/// One entry from `networksetup -listnetworkserviceorder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkService {
    /// User-visible service name, e.g. `Wi-Fi`.
    pub name: String,
    /// BSD device, e.g. `en0`, when the service has one.
    pub device: Option<String>,
    /// False when the service is disabled (asterisk entries).
    pub enabled: bool,
}

/// Case-insensitive name fragments that mark a service as hands-off. These
/// catch VPN control-plane services whose DNS we must not hijack.
const EXCLUDED_NAME_TOKENS: &[&str] = &[
    "vpn",
    "tailscale",
    "wireguard",
    "tunnel",
    "l2tp",
    "pptp",
    "ipsec",
];

/// Device prefixes that mark a service as hands-off.
const EXCLUDED_DEVICE_PREFIXES: &[&str] = &["utun", "ppp", "ipsec", "tun", "tap", "wg"];

/// Parses `networksetup -listnetworkserviceorder` output.
///
/// Entries look like:
///
/// ```text
/// (1) Wi-Fi
/// (Hardware Port: Wi-Fi, Device: en0)
/// (*) Corporate VPN
/// ```
///
/// `(*)` entries are disabled services.
pub fn parse_service_order(text: &str) -> Vec<NetworkService> {
    let mut services: Vec<NetworkService> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("(Hardware Port:") {
            if let Some(current) = services.last_mut() {
                if current.device.is_none() {
                    current.device = rest
                        .split("Device:")
                        .nth(1)
                        .map(|d| d.trim_end_matches(')').trim().to_string())
                        .filter(|d| !d.is_empty());
                }
            }
            continue;
        }
        if !line.starts_with('(') {
            continue;
        }
        let Some((marker, name)) = line[1..].split_once(") ") else {
            continue;
        };
        let enabled = marker != "*";
        if marker != "*" && marker.parse::<u32>().is_err() {
            continue;
        }
        let name = name.trim();
        if !name.is_empty() {
            services.push(NetworkService {
                name: name.to_string(),
                device: None,
                enabled,
            });
        }
    }

    services
}

/// Lists the host's network services in order.
pub async fn list() -> Result<Vec<NetworkService>> {
    let output = run::run_checked(
        &["networksetup", "-listnetworkserviceorder"],
        run::DEFAULT_TIMEOUT,
    )
    .await?;
    Ok(parse_service_order(&output.stdout))
}

/// Parses the `dns.exclude_services` override file: one service name per
/// line, `#` comments and blank lines ignored.
pub fn parse_exclusions(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(|line| {
            line.split_once('#')
                .map_or(line, |(before, _)| before)
                .trim()
        })
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Whether the default filter keeps a service. The filter is intentionally
/// opinionated: unusual hosts recover via the override file, not by widening
/// these defaults.
fn default_filter(service: &NetworkService) -> bool {
    if !service.enabled {
        return false;
    }
    let name = service.name.to_ascii_lowercase();
    if EXCLUDED_NAME_TOKENS.iter().any(|t| name.contains(t)) {
        return false;
    }
    if let Some(device) = &service.device {
        if EXCLUDED_DEVICE_PREFIXES
            .iter()
            .any(|p| device.starts_with(p))
        {
            return false;
        }
    }
    true
}

/// Selects the services macblock manages: pass the default filter and are
/// not excluded by the user override file.
pub fn select_managed(
    services: &[NetworkService],
    user_exclusions: &BTreeSet<String>,
) -> BTreeSet<String> {
    services
        .iter()
        .filter(|s| default_filter(s))
        .filter(|s| !user_exclusions.contains(&s.name))
        .map(|s| s.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
An asterisk (*) denotes that a network service is disabled.
(1) Wi-Fi
(Hardware Port: Wi-Fi, Device: en0)
(2) Thunderbolt Ethernet
(Hardware Port: Thunderbolt Ethernet, Device: en4)
(3) Tailscale
(Hardware Port: Tailscale, Device: utun3)
(4) Corporate VPN
(Hardware Port: L2TP, Device: )
(*) Bluetooth PAN
(Hardware Port: Bluetooth PAN, Device: en5)
(5) Bridge
(Hardware Port: Bridge, Device: bridge0)
";

    #[test]
    fn parses_names_devices_and_disabled_flags() {
        let services = parse_service_order(SAMPLE);
        assert_eq!(services.len(), 6);
        assert_eq!(services[0].name, "Wi-Fi");
        assert_eq!(services[0].device.as_deref(), Some("en0"));
        assert!(services[0].enabled);
        assert_eq!(services[2].device.as_deref(), Some("utun3"));
        assert_eq!(services[3].device, None);
        assert!(!services[4].enabled);
    }

    #[test]
    fn selector_keeps_user_interfaces_and_drops_vpns() {
        let services = parse_service_order(SAMPLE);
        let managed = select_managed(&services, &BTreeSet::new());
        let names: Vec<&str> = managed.iter().map(String::as_str).collect();
        assert_eq!(names, ["Bridge", "Thunderbolt Ethernet", "Wi-Fi"]);
    }

    #[test]
    fn selector_honors_user_exclusions() {
        let services = parse_service_order(SAMPLE);
        let exclusions = parse_exclusions("# never touch ethernet\nThunderbolt Ethernet\n\n");
        let managed = select_managed(&services, &exclusions);
        assert!(!managed.contains("Thunderbolt Ethernet"));
        assert!(managed.contains("Wi-Fi"));
    }

    #[test]
    fn wireguard_is_excluded_by_name_even_without_device() {
        let services = vec![NetworkService {
            name: "WireGuard Home".into(),
            device: None,
            enabled: true,
        }];
        assert!(select_managed(&services, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn exclusion_file_tolerates_comments_and_blanks() {
        let set = parse_exclusions("Wi-Fi # primary\n\n# comment only\nEthernet\n");
        assert_eq!(set.len(), 2);
        assert!(set.contains("Wi-Fi"));
        assert!(set.contains("Ethernet"));
    }
}

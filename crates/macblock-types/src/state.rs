//! The persisted desired-state record.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// Current schema version written by this build.
pub const SCHEMA_VERSION: u64 = 2;

/// Default blocklist source name.
pub const DEFAULT_SOURCE: &str = "stevenblack";

/// Per-service DNS configuration as captured before interception.
///
/// `Dhcp` is the `networksetup` sentinel `"Empty"`: the service has no
/// statically configured servers and follows DHCP. It is distinct from an
/// empty server list, which never occurs in practice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ServiceDnsRepr", try_from = "ServiceDnsRepr")]
pub enum ServiceDns {
    /// Statically configured servers, in order.
    Servers(Vec<IpAddr>),
    /// No static servers; the service follows DHCP.
    Dhcp,
}

/// Wire form: a JSON array of IPs, or the literal string `"Empty"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ServiceDnsRepr {
    Servers(Vec<IpAddr>),
    Sentinel(String),
}

impl From<ServiceDns> for ServiceDnsRepr {
    fn from(value: ServiceDns) -> Self {
        match value {
            ServiceDns::Servers(ips) => Self::Servers(ips),
            ServiceDns::Dhcp => Self::Sentinel("Empty".to_string()),
        }
    }
}

impl TryFrom<ServiceDnsRepr> for ServiceDns {
    type Error = String;

    fn try_from(value: ServiceDnsRepr) -> Result<Self, Self::Error> {
        match value {
            ServiceDnsRepr::Servers(ips) => Ok(Self::Servers(ips)),
            ServiceDnsRepr::Sentinel(word) if word == "Empty" => Ok(Self::Dhcp),
            ServiceDnsRepr::Sentinel(word) => {
                Err(format!("unknown DNS backup sentinel {word:?}"))
            }
        }
    }
}

/// The single source of truth for what should be true on the host.
///
/// Mutated by control-plane commands, and by the daemon on pause expiry and
/// DNS backup capture/restore. Unknown fields from other schema versions are
/// carried through `extra` so a round-trip does not lose them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Schema version; mismatched loads warn but do not crash.
    pub schema_version: u64,

    /// Whether blocking is desired on.
    pub enabled: bool,

    /// Epoch seconds until which blocking is suspended; cleared on expiry.
    #[serde(default)]
    pub paused_until: Option<i64>,

    /// Blocklist source: a catalog name or an absolute HTTPS URL.
    pub source: String,

    /// Epoch seconds of the last applied blocklist compile.
    #[serde(default)]
    pub last_update_at: Option<i64>,

    /// Pre-intercept per-service DNS; source of truth for restore.
    #[serde(default)]
    pub dns_backup: BTreeMap<String, ServiceDns>,

    /// Services the controller is currently touching.
    #[serde(default)]
    pub managed_services: BTreeSet<String>,

    /// Normalized domains never blocked. Mirrors `whitelist.txt`.
    #[serde(default)]
    pub allowlist: BTreeSet<String>,

    /// Normalized domains always blocked. Mirrors `blacklist.txt`.
    #[serde(default)]
    pub denylist: BTreeSet<String>,

    /// Fields from other schema versions, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for DesiredState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            enabled: false,
            paused_until: None,
            source: DEFAULT_SOURCE.to_string(),
            last_update_at: None,
            dns_backup: BTreeMap::new(),
            managed_services: BTreeSet::new(),
            allowlist: BTreeSet::new(),
            denylist: BTreeSet::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl DesiredState {
    /// Whether blocking should be in effect at `now` (epoch seconds):
    /// enabled and not inside a pause window.
    #[must_use]
    pub fn effective_on(&self, now: i64) -> bool {
        self.enabled && !self.paused(now)
    }

    /// Whether a pause window is active at `now`.
    #[must_use]
    pub fn paused(&self, now: i64) -> bool {
        matches!(self.paused_until, Some(until) if now < until)
    }

    /// Whether a recorded pause has expired by `now` and should be cleared.
    #[must_use]
    pub fn pause_expired(&self, now: i64) -> bool {
        matches!(self.paused_until, Some(until) if now >= until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut state = DesiredState {
            enabled: true,
            paused_until: Some(1_900_000_000),
            last_update_at: Some(1_890_000_000),
            ..DesiredState::default()
        };
        state
            .dns_backup
            .insert("Wi-Fi".into(), ServiceDns::Servers(vec!["10.0.0.1".parse().unwrap()]));
        state.dns_backup.insert("Ethernet".into(), ServiceDns::Dhcp);
        state.managed_services.insert("Wi-Fi".into());
        state.allowlist.insert("good.example.com".into());
        state.denylist.insert("bad.example.com".into());

        let json = serde_json::to_string(&state).unwrap();
        let loaded: DesiredState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn dhcp_backup_serializes_as_the_empty_sentinel() {
        let json = serde_json::to_string(&ServiceDns::Dhcp).unwrap();
        assert_eq!(json, "\"Empty\"");
        let back: ServiceDns = serde_json::from_str("\"Empty\"").unwrap();
        assert_eq!(back, ServiceDns::Dhcp);
        assert!(serde_json::from_str::<ServiceDns>("\"Full\"").is_err());
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let json = r#"{
            "schema_version": 3,
            "enabled": false,
            "source": "stevenblack",
            "future_knob": {"nested": true}
        }"#;
        let state: DesiredState = serde_json::from_str(json).unwrap();
        assert!(state.extra.contains_key("future_knob"));
        let out = serde_json::to_string(&state).unwrap();
        assert!(out.contains("future_knob"));
    }

    #[test]
    fn effective_mode_accounts_for_pause_window() {
        let state = DesiredState {
            enabled: true,
            paused_until: Some(100),
            ..DesiredState::default()
        };
        assert!(!state.effective_on(50));
        assert!(state.paused(50));
        assert!(state.effective_on(100));
        assert!(state.pause_expired(100));

        let disabled = DesiredState::default();
        assert!(!disabled.effective_on(50));
    }
}

//! The blocklist source catalog.

use macblock_types::{Error, Result};

/// A built-in blocklist source.
#[derive(Debug, Clone, Copy)]
pub struct SourceSpec {
    /// Catalog name used with `sources set` / `update --source`.
    pub name: &'static str,
    /// Hosts-format download URL.
    pub url: &'static str,
    /// Optional pinned SHA-256 of the download, hex-encoded.
    pub sha256: Option<&'static str>,
    /// One-line description for `sources list`.
    pub description: &'static str,
}

/// Built-in sources. All are hosts-format and enforce the full safety floor.
pub const CATALOG: &[SourceSpec] = &[
    SourceSpec {
        name: "stevenblack",
        url: "https://raw.githubusercontent.com/StevenBlack/hosts/master/hosts",
        sha256: None,
        description: "StevenBlack unified hosts (adware + malware)",
    },
    SourceSpec {
        name: "stevenblack-fakenews",
        url: "https://raw.githubusercontent.com/StevenBlack/hosts/master/alternates/fakenews/hosts",
        sha256: None,
        description: "StevenBlack unified hosts + fakenews extension",
    },
    SourceSpec {
        name: "stevenblack-gambling",
        url: "https://raw.githubusercontent.com/StevenBlack/hosts/master/alternates/gambling/hosts",
        sha256: None,
        description: "StevenBlack unified hosts + gambling extension",
    },
];

/// A source selection resolved to something downloadable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// The identifier stored in state: catalog name or the URL itself.
    pub id: String,
    /// Download URL.
    pub url: String,
    /// Pinned digest, when the catalog carries one.
    pub sha256: Option<String>,
    /// Whether this came from the catalog (built-ins always enforce the
    /// full safety floor).
    pub builtin: bool,
}

/// Looks a source up by catalog name, or accepts a custom HTTPS URL.
pub fn resolve(source: &str) -> Result<ResolvedSource> {
    if let Some(spec) = CATALOG.iter().find(|s| s.name == source) {
        return Ok(ResolvedSource {
            id: spec.name.to_string(),
            url: spec.url.to_string(),
            sha256: spec.sha256.map(ToString::to_string),
            builtin: true,
        });
    }
    if source.starts_with("https://") {
        return Ok(ResolvedSource {
            id: source.to_string(),
            url: source.to_string(),
            sha256: None,
            builtin: false,
        });
    }
    if source.starts_with("http://") {
        return Err(Error::user(format!(
            "blocklist sources must use https, got {source:?}"
        )));
    }
    let names: Vec<&str> = CATALOG.iter().map(|s| s.name).collect();
    Err(Error::user(format!(
        "unknown source {source:?}; known sources: {}, or an https:// URL",
        names.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_names() {
        let resolved = resolve("stevenblack").unwrap();
        assert!(resolved.builtin);
        assert!(resolved.url.starts_with("https://"));
        assert_eq!(resolved.id, "stevenblack");
    }

    #[test]
    fn accepts_custom_https_urls() {
        let resolved = resolve("https://lists.example.com/hosts.txt").unwrap();
        assert!(!resolved.builtin);
        assert_eq!(resolved.url, "https://lists.example.com/hosts.txt");
    }

    #[test]
    fn rejects_plain_http_and_unknown_names() {
        assert!(resolve("http://lists.example.com/hosts.txt").is_err());
        let err = resolve("no-such-list").unwrap_err();
        assert!(err.to_string().contains("stevenblack"));
    }
}

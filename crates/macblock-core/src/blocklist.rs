//! The blocklist compile pipeline.
//!
//! Download, verify, parse, filter, emit, reload, in that order, with the
//! existing compiled set left untouched unless every gate passes. The
//! success path is the only path that bumps `last_update_at`.

use crate::{fsutil, lists, sources};
use futures::StreamExt;
use macblock_types::{domain, paths, Error, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Hard cap on the downloaded payload.
pub const MAX_DOWNLOAD_BYTES: usize = 100 * 1024 * 1024;
/// Minimum domain count a compile must produce to be applied.
pub const SAFETY_FLOOR: usize = 1000;
/// Connect timeout for the download.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Overall download timeout.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
/// How much of the head of the payload the HTML sniff examines.
const SNIFF_LEN: usize = 1024;

/// Options for one compile run.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Lowered safety floor for custom URLs. Built-in sources ignore this
    /// and always enforce [`SAFETY_FLOOR`].
    pub min_domains: Option<usize>,
}

/// A compiled blocklist that has been written to disk.
#[derive(Debug, Clone)]
pub struct CompiledSet {
    /// The applied domain set, sorted.
    pub domains: BTreeSet<String>,
    /// Domains contributed by the denylist.
    pub denied: usize,
    /// Domains removed by the allowlist.
    pub allowed: usize,
}

/// Sniffs whether a payload head looks like an HTML error page rather than
/// a hosts file: a doctype/html prefix, or a high angle-bracket density.
pub fn looks_like_html(head: &[u8]) -> bool {
    let head = &head[..head.len().min(SNIFF_LEN)];
    let text = String::from_utf8_lossy(head);
    let lower = text.trim_start().to_ascii_lowercase();
    if lower.starts_with("<!doctype") || lower.starts_with("<html") {
        return true;
    }
    if head.is_empty() {
        return false;
    }
    let angles = head.iter().filter(|b| **b == b'<' || **b == b'>').count();
    angles * 50 > head.len()
}

/// Parses hosts-format text into normalized domains.
///
/// Accepted line shapes after comment stripping: `IP host [host…]` (the IP
/// is discarded) or a bare `host`. Unparseable hostnames are skipped; the
/// count of skipped candidates is returned for logging.
pub fn parse_hosts(text: &str) -> (BTreeSet<String>, usize) {
    let mut domains = BTreeSet::new();
    let mut skipped = 0;

    for raw in text.lines() {
        let line = raw
            .split_once('#')
            .map_or(raw, |(before, _)| before)
            .trim();
        if line.is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };
        let candidates: Vec<&str> = if first.parse::<IpAddr>().is_ok() {
            tokens.collect()
        } else {
            vec![first]
        };
        for candidate in candidates {
            match domain::normalize(candidate) {
                Ok(normalized) => {
                    domains.insert(normalized);
                }
                // Hosts files are full of localhost aliases; those are
                // expected to fall out here.
                Err(_) => skipped += 1,
            }
        }
    }

    (domains, skipped)
}

/// Renders the raw-domain file: one domain per line, sorted.
pub fn render_raw(domains: &BTreeSet<String>) -> String {
    let mut out = String::new();
    for d in domains {
        out.push_str(d);
        out.push('\n');
    }
    out
}

/// Renders the dnsmasq NXDOMAIN rules file: `address=/<domain>/` per line.
pub fn render_conf(domains: &BTreeSet<String>) -> String {
    let mut out = String::new();
    for d in domains {
        out.push_str("address=/");
        out.push_str(d);
        out.push_str("/\n");
    }
    out
}

/// Downloads the source with size cap, timeouts, and HTML sniff.
async fn download(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| Error::transient("building HTTP client", e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::transient(format!("downloading {url}"), e.to_string()))?
        .error_for_status()
        .map_err(|e| Error::transient(format!("downloading {url}"), e.to_string()))?;

    let mut body: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::transient(format!("downloading {url}"), e.to_string()))?;
        if body.len() + chunk.len() > MAX_DOWNLOAD_BYTES {
            return Err(Error::user(format!(
                "blocklist download exceeds the {} MB cap",
                MAX_DOWNLOAD_BYTES / (1024 * 1024)
            )));
        }
        body.extend_from_slice(&chunk);
    }

    if looks_like_html(&body) {
        return Err(Error::user(format!(
            "{url} returned an HTML page, not a hosts file"
        )));
    }
    Ok(body)
}

/// Verifies a pinned SHA-256 digest. Mismatch is fatal.
fn verify_digest(body: &[u8], expected_hex: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(body));
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(Error::user(format!(
            "blocklist digest mismatch: expected {expected_hex}, got {actual}"
        )))
    }
}

/// Applies allowlist subtraction and denylist union to a parsed source set.
pub fn apply_lists(
    mut domains: BTreeSet<String>,
    allowlist: &BTreeSet<String>,
    denylist: &BTreeSet<String>,
) -> (BTreeSet<String>, usize, usize) {
    let before = domains.len();
    for allowed in allowlist {
        domains.remove(allowed);
    }
    let allowed = before - domains.len();

    let before = domains.len();
    for denied in denylist {
        domains.insert(denied.clone());
    }
    let denied = domains.len() - before;

    (domains, allowed, denied)
}

/// Enforces the safety floor for a parsed source.
pub fn check_floor(count: usize, builtin: bool, opts: &CompileOptions) -> Result<()> {
    let floor = if builtin {
        SAFETY_FLOOR
    } else {
        opts.min_domains.unwrap_or(SAFETY_FLOOR)
    };
    if count < floor {
        return Err(Error::user(format!(
            "source produced {count} domains, below the safety floor of {floor}; \
             keeping the existing blocklist"
        )));
    }
    Ok(())
}

/// Runs the pipeline against `source` up to and including the file emit.
///
/// On success the compiled files have been replaced (raw first, then conf).
/// On any failure before the emit the previous compiled set is untouched.
/// Persisting `last_update_at` and signalling the resolver are the caller's
/// next two steps, in that order, so the compiled files and the state record
/// advance together before dnsmasq ever sees the new set.
pub async fn compile_to_files(
    source: &sources::ResolvedSource,
    opts: &CompileOptions,
) -> Result<CompiledSet> {
    info!(source = %source.id, "compiling blocklist");

    let body = download(&source.url).await?;
    if let Some(expected) = &source.sha256 {
        verify_digest(&body, expected)?;
    }

    let text = String::from_utf8_lossy(&body);
    let (parsed, skipped) = parse_hosts(&text);
    if skipped > 0 {
        info!(skipped, "skipped unparseable host entries");
    }
    check_floor(parsed.len(), source.builtin, opts)?;

    let (allowlist, allow_warnings) = lists::read(&paths::allowlist_file())?;
    let (denylist, deny_warnings) = lists::read(&paths::denylist_file())?;
    for warning in allow_warnings.iter().chain(&deny_warnings) {
        warn!(%warning, "skipping invalid list line");
    }

    let (domains, allowed, denied) = apply_lists(parsed, &allowlist, &denylist);

    write_compiled(
        &paths::blocklist_raw_file(),
        &paths::blocklist_conf_file(),
        &domains,
    )?;
    info!(domains = domains.len(), "compiled blocklist written");

    Ok(CompiledSet {
        domains,
        denied,
        allowed,
    })
}

/// Writes the two compiled files atomically, raw before conf, both 0644.
pub fn write_compiled(
    raw_path: &Path,
    conf_path: &Path,
    domains: &BTreeSet<String>,
) -> Result<()> {
    fsutil::write_atomic(raw_path, render_raw(domains).as_bytes(), fsutil::MODE_FILE)?;
    fsutil::write_atomic(conf_path, render_conf(domains).as_bytes(), fsutil::MODE_FILE)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hosts_and_bare_domain_forms() {
        let text = "\
# StevenBlack style
127.0.0.1 localhost
0.0.0.0 ads.example.com tracker.example.com
bare.example.net
0.0.0.0 another.example.org # trailing comment
::1 ip6-localhost
";
        let (domains, skipped) = parse_hosts(text);
        assert!(domains.contains("ads.example.com"));
        assert!(domains.contains("tracker.example.com"));
        assert!(domains.contains("bare.example.net"));
        assert!(domains.contains("another.example.org"));
        // localhost aliases are not blockable domains
        assert_eq!(domains.len(), 4);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn html_sniff_catches_error_pages() {
        assert!(looks_like_html(b"<!DOCTYPE html><html><body>404</body>"));
        assert!(looks_like_html(b"  <html lang=\"en\">"));
        assert!(!looks_like_html(b"# hosts file\n0.0.0.0 ads.example.com\n"));
        assert!(!looks_like_html(b""));
    }

    #[test]
    fn safety_floor_blocks_small_builtin_sources() {
        let opts = CompileOptions::default();
        let err = check_floor(42, true, &opts).unwrap_err();
        assert!(err.to_string().contains("safety floor"));
        assert!(check_floor(SAFETY_FLOOR, true, &opts).is_ok());
    }

    #[test]
    fn custom_sources_may_lower_the_floor_builtin_may_not() {
        let opts = CompileOptions {
            min_domains: Some(10),
        };
        assert!(check_floor(42, false, &opts).is_ok());
        assert!(check_floor(42, true, &opts).is_err());
        assert!(check_floor(5, false, &opts).is_err());
    }

    #[test]
    fn allowlist_subtracts_and_denylist_wins_when_source_omits() {
        let source: BTreeSet<String> = ["ads.example.com", "tracker.example.com"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let allow: BTreeSet<String> = ["tracker.example.com"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let deny: BTreeSet<String> = ["evil.example.net"]
            .iter()
            .map(ToString::to_string)
            .collect();

        let (result, allowed, denied) = apply_lists(source, &allow, &deny);
        assert!(result.contains("ads.example.com"));
        assert!(!result.contains("tracker.example.com"));
        assert!(result.contains("evil.example.net"));
        assert_eq!(allowed, 1);
        assert_eq!(denied, 1);
    }

    #[test]
    fn rendered_outputs_are_sorted_and_nxdomain_shaped() {
        let domains: BTreeSet<String> = ["b.example.com", "a.example.com"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(render_raw(&domains), "a.example.com\nb.example.com\n");
        assert_eq!(
            render_conf(&domains),
            "address=/a.example.com/\naddress=/b.example.com/\n"
        );
    }

    #[test]
    fn digest_verification_rejects_mismatch() {
        let body = b"0.0.0.0 ads.example.com\n";
        let good = hex::encode(Sha256::digest(body));
        assert!(verify_digest(body, &good).is_ok());
        assert!(verify_digest(body, &good.to_uppercase()).is_ok());
        assert!(verify_digest(body, &"0".repeat(64)).is_err());
    }

    #[test]
    fn compiled_files_write_in_raw_then_conf_order() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("blocklist.raw");
        let conf = dir.path().join("blocklist.conf");
        let domains: BTreeSet<String> =
            ["x.example.com".to_string()].into_iter().collect();

        write_compiled(&raw, &conf, &domains).unwrap();
        assert_eq!(std::fs::read_to_string(&raw).unwrap(), "x.example.com\n");
        assert_eq!(
            std::fs::read_to_string(&conf).unwrap(),
            "address=/x.example.com/\n"
        );
    }
}

//! Allow/deny list files: one normalized domain per line, `#` comments.
//!
//! Readers are tolerant: invalid lines are skipped and reported as warnings
//! naming the file and line number, never a hard failure. Writes go through
//! the atomic primitives and keep the surviving valid lines intact.

use crate::fsutil;
use macblock_types::{domain, Error, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// A skipped line from a tolerant list read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListWarning {
    /// File the line came from.
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    /// Why the line was skipped.
    pub reason: String,
}

impl std::fmt::Display for ListWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.reason)
    }
}

/// Parses list text tolerantly into normalized domains plus warnings.
pub fn parse(text: &str, file_name: &str) -> (BTreeSet<String>, Vec<ListWarning>) {
    let mut domains = BTreeSet::new();
    let mut warnings = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw
            .split_once('#')
            .map_or(raw, |(before, _)| before)
            .trim();
        if line.is_empty() {
            continue;
        }
        match domain::normalize(line) {
            Ok(normalized) => {
                domains.insert(normalized);
            }
            Err(e) => warnings.push(ListWarning {
                file: file_name.to_string(),
                line: idx + 1,
                reason: e.to_string(),
            }),
        }
    }

    (domains, warnings)
}

/// Reads a list file tolerantly. A missing file is an empty list.
pub fn read(path: &Path) -> Result<(BTreeSet<String>, Vec<ListWarning>)> {
    let name = path.display().to_string();
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse(&text, &name)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((BTreeSet::new(), Vec::new())),
        Err(e) => Err(Error::transient(format!("reading {name}"), e.to_string())),
    }
}

/// Writes the set back, one domain per line, sorted, mode 0644.
pub fn write(path: &Path, domains: &BTreeSet<String>) -> Result<()> {
    let mut rendered = String::new();
    for d in domains {
        rendered.push_str(d);
        rendered.push('\n');
    }
    fsutil::write_atomic(path, rendered.as_bytes(), fsutil::MODE_FILE)
}

/// Adds a domain (normalizing it first). Returns the warnings from the read
/// and whether the domain was newly added.
pub fn add(path: &Path, raw_domain: &str) -> Result<(bool, Vec<ListWarning>)> {
    let normalized = domain::normalize(raw_domain)?;
    let (mut domains, warnings) = read(path)?;
    let added = domains.insert(normalized);
    if added {
        write(path, &domains)?;
    }
    Ok((added, warnings))
}

/// Removes a domain. Returns the warnings from the read and whether the
/// domain was present.
pub fn remove(path: &Path, raw_domain: &str) -> Result<(bool, Vec<ListWarning>)> {
    let normalized = domain::normalize(raw_domain)?;
    let (mut domains, warnings) = read(path)?;
    let removed = domains.remove(&normalized);
    if removed {
        write(path, &domains)?;
    }
    Ok((removed, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_invalid_lines_with_numbered_warnings() {
        let text = "good.example.com\nnot a domain!\n# comment\nAds.Example.NET # inline\n";
        let (domains, warnings) = parse(text, "whitelist.txt");

        assert!(domains.contains("good.example.com"));
        assert!(domains.contains("ads.example.net"));
        assert_eq!(domains.len(), 2);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line, 2);
        assert!(warnings[0].to_string().starts_with("whitelist.txt:2:"));
    }

    #[test]
    fn add_and_remove_preserve_valid_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.txt");
        fs::write(&path, "keep.example.com\nbroken line here\n").unwrap();

        let (added, warnings) = add(&path, "new.example.com").unwrap();
        assert!(added);
        assert_eq!(warnings.len(), 1);

        let (domains, _) = read(&path).unwrap();
        assert!(domains.contains("keep.example.com"));
        assert!(domains.contains("new.example.com"));

        let (removed, _) = remove(&path, "keep.example.com").unwrap();
        assert!(removed);
        let (domains, _) = read(&path).unwrap();
        assert!(!domains.contains("keep.example.com"));
    }

    #[test]
    fn add_rejects_invalid_domains_before_touching_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.txt");
        assert!(add(&path, "not a domain").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn adding_a_duplicate_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.txt");
        add(&path, "dup.example.com").unwrap();
        let (added, _) = add(&path, "DUP.example.com.").unwrap();
        assert!(!added);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (domains, warnings) = read(&dir.path().join("nope.txt")).unwrap();
        assert!(domains.is_empty());
        assert!(warnings.is_empty());
    }
}

//! Domain name normalization.

use crate::error::{Error, Result};

/// Maximum total length of a normalized domain name.
const MAX_NAME_LEN: usize = 253;
/// Maximum length of a single label.
const MAX_LABEL_LEN: usize = 63;

/// Normalizes a domain name to its canonical blockable form: lowercase,
/// IDNA-ASCII, trailing dot stripped.
///
/// Rejects names that are not fully qualified (no dot), names with empty or
/// oversized labels, and labels with characters outside `a-z0-9-` or with
/// leading/trailing hyphens. Plain hostnames like `localhost` are therefore
/// rejected, which is what the blocklist pipeline wants.
pub fn normalize(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(Error::user("empty domain name"));
    }

    let ascii = idna::domain_to_ascii(trimmed)
        .map_err(|_| Error::user(format!("invalid domain name: {input:?}")))?;
    let ascii = ascii.trim_end_matches('.').to_ascii_lowercase();

    if ascii.len() > MAX_NAME_LEN {
        return Err(Error::user(format!(
            "domain name too long ({} > {MAX_NAME_LEN}): {input:?}",
            ascii.len()
        )));
    }
    if !ascii.contains('.') {
        return Err(Error::user(format!(
            "not a fully-qualified domain name: {input:?}"
        )));
    }
    for label in ascii.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(Error::user(format!("invalid label in domain: {input:?}")));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::user(format!("invalid label in domain: {input:?}")));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(Error::user(format!("invalid label in domain: {input:?}")));
        }
    }

    Ok(ascii)
}

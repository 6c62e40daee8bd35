//! Parsing of brief user-supplied durations.

use crate::error::{Error, Result};
use std::time::Duration;

/// Parses a duration of the form `<digits><unit>` where the unit is one of
/// `s`, `m`, `h`, `d`. This is the `pause` command's argument format.
pub fn parse_brief(input: &str) -> Result<Duration> {
    let err = || {
        Error::user(format!(
            "invalid duration {input:?}; expected e.g. 30s, 10m, 2h, 1d"
        ))
    };

    let (digits, unit) = input.split_at(input.len().saturating_sub(1));
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    let value: u64 = digits.parse().map_err(|_| err())?;
    let secs = match unit {
        "s" => value,
        "m" => value.saturating_mul(60),
        "h" => value.saturating_mul(3600),
        "d" => value.saturating_mul(86400),
        _ => return Err(err()),
    };
    if secs == 0 {
        return Err(Error::user("duration must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_brief("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_brief("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_brief("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_brief("1d").unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "10", "s", "10x", "1.5h", "-3m", "10 m", "m10"] {
            assert!(parse_brief(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn rejects_zero() {
        assert!(parse_brief("0s").is_err());
    }
}

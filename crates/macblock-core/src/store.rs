//! The state store: one JSON file, loaded tolerantly, saved atomically.

use crate::fsutil;
use macblock_types::{paths, DesiredState, Error, Result, SCHEMA_VERSION};
use std::fs;
use std::path::Path;
use tracing::warn;

#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};

/// Loads the state record from its canonical path.
pub fn load() -> Result<DesiredState> {
    load_from(&paths::state_file())
}

/// Loads a state record from `path`.
///
/// A missing file is first-run and yields the defaults. Anything else that
/// is not a JSON object with an integer `schema_version` is corruption and
/// fails with a repair hint; a *newer* schema version warns and reads the
/// fields it recognizes.
pub fn load_from(path: &Path) -> Result<DesiredState> {
    let corrupt = |reason: String| Error::StateCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DesiredState::default());
        }
        Err(e) => return Err(corrupt(format!("unreadable: {e}"))),
    };

    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| corrupt(format!("invalid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| corrupt("top level is not an object".to_string()))?;
    let version = object
        .get("schema_version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| corrupt("schema_version is missing or not an integer".to_string()))?;
    if version > SCHEMA_VERSION {
        warn!(
            found = version,
            known = SCHEMA_VERSION,
            "state file written by a newer macblock; reading recognized fields only"
        );
    }

    serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))
}

/// Saves the state record to its canonical path.
pub fn save(state: &DesiredState) -> Result<()> {
    save_to(&paths::state_file(), state)
}

/// Serializes deterministically (BTree collections, sorted unknown keys) and
/// writes atomically with mode 0644.
pub fn save_to(path: &Path, state: &DesiredState) -> Result<()> {
    let mut rendered = serde_json::to_string_pretty(state)?;
    rendered.push('\n');
    fsutil::write_atomic(path, rendered.as_bytes(), fsutil::MODE_FILE)
}

/// Advisory lock serializing control-plane commands. Dropping it releases
/// the lock.
pub struct StateLock {
    #[cfg(unix)]
    _flock: Flock<fs::File>,
}

/// Takes the exclusive control-plane lock, blocking until available.
pub fn lock() -> Result<StateLock> {
    lock_at(&paths::state_lock_file())
}

/// Takes the lock at an explicit path.
pub fn lock_at(path: &Path) -> Result<StateLock> {
    if let Some(parent) = path.parent() {
        fsutil::ensure_dir(parent, fsutil::MODE_DIR)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    #[cfg(unix)]
    {
        let flock = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| Error::transient("locking state directory", errno.to_string()))?;
        Ok(StateLock { _flock: flock })
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(StateLock {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macblock_types::ServiceDns;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = load_from(&dir.path().join("state.json")).unwrap();
        assert_eq!(state, DesiredState::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = DesiredState {
            enabled: true,
            paused_until: Some(2_000_000_000),
            ..DesiredState::default()
        };
        state
            .dns_backup
            .insert("Wi-Fi".into(), ServiceDns::Servers(vec!["10.1.1.1".parse().unwrap()]));
        state.managed_services.insert("Wi-Fi".into());
        save_to(&path, &state).unwrap();

        assert_eq!(load_from(&path).unwrap(), state);
    }

    #[test]
    fn non_integer_schema_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{ "enabled": true, "schema_version": "two" }"#).unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, Error::StateCorrupt { .. }));
        assert!(err.to_string().contains("state.json"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn non_object_top_level_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            load_from(&path).unwrap_err(),
            Error::StateCorrupt { .. }
        ));
    }

    #[test]
    fn invalid_json_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_from(&path).unwrap_err(),
            Error::StateCorrupt { .. }
        ));
    }

    #[test]
    fn newer_schema_reads_recognized_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{ "schema_version": 99, "enabled": true, "source": "stevenblack", "hologram": 1 }"#,
        )
        .unwrap();

        let state = load_from(&path).unwrap();
        assert!(state.enabled);
        assert_eq!(state.schema_version, 99);
        assert!(state.extra.contains_key("hologram"));
    }

    #[test]
    fn unknown_fields_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{ "schema_version": 2, "enabled": false, "source": "stevenblack", "carried": "yes" }"#,
        )
        .unwrap();

        let state = load_from(&path).unwrap();
        save_to(&path, &state).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("carried"));
    }

    #[test]
    fn lock_is_exclusive_within_a_process_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        let first = lock_at(&path).unwrap();
        drop(first);
        let _second = lock_at(&path).unwrap();
    }
}

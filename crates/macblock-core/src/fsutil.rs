//! Atomic filesystem primitives.
//!
//! Every durable file macblock writes goes through [`write_atomic`]: a temp
//! file in the destination directory, fsync, explicit mode, rename. Modes
//! are always pinned rather than left to the process umask.

use macblock_types::{Error, Result};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, warn};

/// Prefix of in-flight temp files, also matched by [`cleanup_stale_temps`].
pub const TMP_PREFIX: &str = ".macblock-tmp";

/// Mode for world-readable files.
pub const MODE_FILE: u32 = 0o644;
/// Mode for directories.
pub const MODE_DIR: u32 = 0o755;

/// Creates `path` (and parents) with the given mode. Existing directories
/// get their mode re-pinned.
pub fn ensure_dir(path: &Path, mode: u32) -> Result<()> {
    fs::create_dir_all(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Writes `bytes` to `path` atomically with an explicit `mode`.
///
/// The temp file lives in the destination directory so the final rename
/// never crosses a filesystem. An interrupted write leaves the destination
/// untouched; the orphaned temp is swept by [`cleanup_stale_temps`].
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::transient("write_atomic", format!("{} has no parent", path.display())))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TMP_PREFIX)
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(mode))?;
    tmp.persist(path)
        .map_err(|e| Error::Io(e.error))?;

    debug!(path = %path.display(), bytes = bytes.len(), "wrote file atomically");
    Ok(())
}

/// Removes orphaned temp files left in `dir` by interrupted writes. Returns
/// how many were removed. Never fails; a directory that cannot be read is
/// simply skipped.
pub fn cleanup_stale_temps(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(TMP_PREFIX) {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "could not remove stale temp file");
                }
            }
        }
    }
    removed
}

//! Atomic file write utility.
//!
//! Write-to-temp-then-rename, used for the persisted local identity file.
//!
//! Invariants:
//! - Write goes to a `.tmp` file first, then an atomic rename replaces the target.
//! - On rename failure, the temp file is cleaned up to avoid stale artifacts.
//! - Parent directories are created if absent.
//!
//! Note: `rename()` is atomic on NTFS, ext4, APFS, and all major filesystems
//! when source and destination are on the same mount.

use anyhow::Result;
use std::path::Path;
use tracing::error;

/// Atomically write `content` to `path` via a temporary file and rename.
///
/// # Errors
/// Returns an error if the temp file cannot be written or the rename fails.
/// On rename failure, attempts to clean up the temp file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let tmp_path = path.with_extension("tmp");

    std::fs::write(&tmp_path, content).map_err(|e| {
        error!(
            event = "atomic_write_failure",
            path = %tmp_path.display(),
            error = %e,
            "Failed to write temp file"
        );
        e
    })?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        error!(
            event = "atomic_rename_failure",
            from = %tmp_path.display(),
            to = %path.display(),
            error = %e,
            "Failed to rename temp file"
        );
        let _ = std::fs::remove_file(&tmp_path);
        e
    })?;

    Ok(())
}

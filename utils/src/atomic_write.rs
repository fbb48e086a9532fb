//! Atomic file write helpers.
//!
//! Writes go to a temp file in the destination directory and are renamed into
//! place, so readers see either the old contents or the new contents. Where a
//! rename over an existing file fails (Windows), the old file is moved to
//! `.bak` first and restored if the second rename fails too.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

/// Whether to fsync the temp file before it is renamed into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    #[default]
    SyncAll,
    SkipSync,
}

/// Restore `path` from `path.bak` when a previous write died between the two renames.
pub fn recover_bak_file(path: &Path) {
    let backup = path.with_extension("bak");
    if path.exists() || !backup.exists() {
        return;
    }
    match fs::rename(&backup, path) {
        Ok(()) => {
            tracing::warn!(
                path = %path.display(),
                "Recovered .bak file from interrupted atomic write"
            );
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to recover .bak file: {e}");
        }
    }
}

pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write_with(path, bytes, SyncPolicy::default())
}

pub fn atomic_write_with(path: impl AsRef<Path>, bytes: &[u8], sync: SyncPolicy) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    if sync == SyncPolicy::SyncAll {
        tmp.as_file().sync_all()?;
    }

    let Err(err) = tmp.persist(path) else {
        debug!(path = %path.display(), bytes = bytes.len(), "atomic write complete");
        return Ok(());
    };
    if !path.exists() {
        return Err(err.error);
    }

    let backup = path.with_extension("bak");
    let _ = fs::remove_file(&backup);
    fs::rename(path, &backup)?;
    if let Err(rename_err) = err.file.persist(path) {
        let _ = fs::rename(&backup, path);
        return Err(rename_err.error);
    }
    if let Err(e) = fs::remove_file(&backup) {
        tracing::warn!(path = %backup.display(), "Failed to remove .bak after atomic write: {e}");
    }
    Ok(())
}

//! Single-writer lock on an output tree.
//!
//! Two organizers filing into the same output root would race on version
//! suffixes and the dedupe index, so the second one refuses to start.

use crate::error::WatchError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Name of the lock file inside the output root
pub const LOCK_FILE_NAME: &str = ".fileai.lock";

/// Held for the lifetime of the process; the lock is released on drop
#[derive(Debug)]
pub struct OutputLock {
    file: File,
    path: PathBuf,
}

impl OutputLock {
    /// Take the lock for `output_root` without blocking
    pub fn acquire(output_root: &Path) -> Result<Self, WatchError> {
        let path = Self::path_for(output_root);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| WatchError::Io {
                path: path.clone(),
                source,
            })?;

        if let Err(e) = file.try_lock_exclusive() {
            tracing::debug!("[Lock] {} is held elsewhere: {}", path.display(), e);
            return Err(WatchError::Locked(output_root.to_path_buf()));
        }

        tracing::debug!("[Lock] Acquired {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path_for(output_root: &Path) -> PathBuf {
        output_root.join(LOCK_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("[Lock] Failed to release {}: {}", self.path.display(), e);
        }
    }
}

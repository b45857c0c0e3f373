//! Output folder creation and cleanup of emptied input folders.

use crate::categories::{Category, CategorySet, UNSUPPORTED};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Folders created by NAS/desktop indexers that do not count as content
const SIDECAR_DIRS: &[&str] = &["@eaDir", ".AppleDouble", "__MACOSX"];

/// OS metadata files that do not count as content
const SIDECAR_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Creates category folders and prunes empty input directories
#[derive(Debug, Clone)]
pub struct DirectoryManager {
    output_root: PathBuf,
}

impl DirectoryManager {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Create one folder per category plus the unsupported holding area
    pub fn ensure_category_structure(&self, categories: &CategorySet) -> io::Result<()> {
        for category in categories.iter() {
            fs::create_dir_all(self.category_path(category))?;
        }
        fs::create_dir_all(self.unsupported_path())?;
        Ok(())
    }

    pub fn category_path(&self, category: &Category) -> PathBuf {
        self.output_root.join(&category.name)
    }

    pub fn unsupported_path(&self) -> PathBuf {
        self.output_root.join(UNSUPPORTED)
    }

    /// Remove `start` and its ancestors while they are empty, stopping at `stop`.
    ///
    /// `stop` itself is never removed, and nothing happens when `start` is not
    /// strictly inside `stop`. Returns the directories that were removed.
    pub fn cleanup_empty_dirs(&self, start: &Path, stop: &Path) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        let mut current = start.to_path_buf();

        while current != stop && current.starts_with(stop) && is_effectively_empty(&current) {
            if let Err(e) = remove_sidecars(&current).and_then(|_| fs::remove_dir(&current)) {
                tracing::debug!("[Directories] Stopped at {}: {}", current.display(), e);
                break;
            }
            tracing::info!(
                "[Directories] Deleted empty directory: {}",
                current.strip_prefix(stop).unwrap_or(&current).display()
            );
            removed.push(current.clone());

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        removed
    }
}

/// A directory is empty when it holds nothing but sidecar entries
pub fn is_effectively_empty(dir: &Path) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };

    for entry in entries {
        let Ok(entry) = entry else {
            return false;
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        let sidecar = if is_dir {
            SIDECAR_DIRS.contains(&name.as_ref())
        } else {
            SIDECAR_FILES.contains(&name.as_ref())
        };
        if !sidecar {
            return false;
        }
    }

    true
}

/// Whether a file name is OS metadata that should never be organized
pub fn is_sidecar_file(name: &str) -> bool {
    SIDECAR_FILES.contains(&name)
}

/// Whether a directory name belongs to an indexer rather than the user
pub fn is_sidecar_dir(name: &str) -> bool {
    SIDECAR_DIRS.contains(&name)
}

fn remove_sidecars(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_category_structure() {
        let out = TempDir::new().unwrap();
        let manager = DirectoryManager::new(out.path());
        manager
            .ensure_category_structure(&CategorySet::default())
            .unwrap();

        assert!(out.path().join("car").is_dir());
        assert!(out.path().join("misc").is_dir());
        assert!(out.path().join(UNSUPPORTED).is_dir());
    }

    #[test]
    fn test_cleanup_removes_three_levels_but_not_root() {
        let root = TempDir::new().unwrap();
        let deep = root.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();

        let manager = DirectoryManager::new("/unused");
        let removed = manager.cleanup_empty_dirs(&deep, root.path());

        assert_eq!(removed.len(), 3);
        assert!(!root.path().join("a").exists());
        assert!(root.path().exists());
    }

    #[test]
    fn test_cleanup_stops_at_non_empty_parent() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("a/b")).unwrap();
        fs::write(root.path().join("a/keep.txt"), b"x").unwrap();

        let manager = DirectoryManager::new("/unused");
        manager.cleanup_empty_dirs(&root.path().join("a/b"), root.path());

        assert!(!root.path().join("a/b").exists());
        assert!(root.path().join("a/keep.txt").exists());
    }

    #[test]
    fn test_sidecar_folder_counts_as_empty() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("photos");
        fs::create_dir_all(dir.join("@eaDir/thumbs")).unwrap();
        fs::write(dir.join(".DS_Store"), b"meta").unwrap();

        assert!(is_effectively_empty(&dir));

        let manager = DirectoryManager::new("/unused");
        manager.cleanup_empty_dirs(&dir, root.path());
        assert!(!dir.exists());
    }

    #[test]
    fn test_cleanup_outside_stop_is_noop() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let dir = other.path().join("empty");
        fs::create_dir_all(&dir).unwrap();

        let manager = DirectoryManager::new("/unused");
        assert!(manager.cleanup_empty_dirs(&dir, root.path()).is_empty());
        assert!(dir.exists());
    }

    #[test]
    fn test_root_is_never_removed() {
        let root = TempDir::new().unwrap();
        let manager = DirectoryManager::new("/unused");
        assert!(manager.cleanup_empty_dirs(root.path(), root.path()).is_empty());
        assert!(root.path().exists());
    }
}

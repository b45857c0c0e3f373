//! In-memory content-address index of the output tree.
//!
//! Built once by scanning the output root and updated after every placement.
//! The index only caches hashes; existence and size are always confirmed
//! against the filesystem before a match is reported.

use super::checksum::{content_address, ContentAddress};
use super::IN_FLIGHT_SUFFIX;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use walkdir::WalkDir;

/// Entry for one content hash
#[derive(Debug, Clone, Default)]
struct IndexEntry {
    /// Known paths with this content, kept sorted
    paths: Vec<PathBuf>,
    /// Size recorded when the first path was hashed
    size: u64,
}

#[derive(Debug, Default)]
struct IndexState {
    by_hash: HashMap<String, IndexEntry>,
    hash_of: HashMap<PathBuf, String>,
}

/// Summary of duplicates currently in the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateStats {
    pub total_files: usize,
    pub unique_files: usize,
    pub duplicate_files: usize,
    pub duplicate_groups: usize,
}

/// A set of indexed paths with identical content
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub sha256: String,
    pub size: u64,
    /// Sorted; the first path is the one that is kept
    pub paths: Vec<PathBuf>,
}

/// Thread-safe hash → paths index for one root directory
#[derive(Debug)]
pub struct ContentAddressIndex {
    root: PathBuf,
    state: Mutex<IndexState>,
    ignored: Vec<PathBuf>,
}

impl ContentAddressIndex {
    /// Create an empty index rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(IndexState::default()),
            ignored: Vec::new(),
        }
    }

    /// Exclude a specific file (such as the lock file) from scans
    pub fn ignoring(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignored.push(path.into());
        self
    }

    /// Build an index by hashing every file under `root`
    pub fn scan(root: impl Into<PathBuf>) -> Self {
        let index = Self::new(root);
        index.rescan();
        index
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the whole index from the filesystem
    pub fn rescan(&self) -> usize {
        let mut fresh = IndexState::default();
        let mut hashed = 0;

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("[Index] Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file()
                || self.ignored.iter().any(|p| p == entry.path())
                || is_in_flight(entry.path())
            {
                continue;
            }
            match content_address(entry.path()) {
                Ok(address) => {
                    insert(&mut fresh, entry.path().to_path_buf(), address);
                    hashed += 1;
                }
                Err(e) => {
                    tracing::error!("[Index] Error accessing file {}: {}", entry.path().display(), e);
                }
            }
        }

        tracing::info!("[Index] Indexed {} files under {}", hashed, self.root.display());
        *self.lock() = fresh;
        hashed
    }

    /// Find an indexed file with the same content as `candidate`.
    ///
    /// Returns the lexicographically smallest matching path whose current size
    /// equals the candidate's. Unreadable candidates have no duplicate.
    pub fn find_duplicate(&self, candidate: &Path) -> Option<PathBuf> {
        self.find_duplicate_within(candidate, &self.root)
    }

    /// Like [`find_duplicate`](Self::find_duplicate), restricted to paths under `scope`
    pub fn find_duplicate_within(&self, candidate: &Path, scope: &Path) -> Option<PathBuf> {
        let address = match content_address(candidate) {
            Ok(a) => a,
            Err(e) => {
                tracing::debug!(
                    "[Index] Cannot hash {}, treating as unique: {}",
                    candidate.display(),
                    e
                );
                return None;
            }
        };

        let paths = {
            let state = self.lock();
            let entry = state.by_hash.get(&address.sha256)?;
            if entry.size != address.size {
                tracing::warn!(
                    "[Index] Stale entry for {}: size {} != {}",
                    address.sha256,
                    entry.size,
                    address.size
                );
            }
            entry.paths.clone()
        };

        paths.into_iter().find(|path| {
            path != candidate
                && path.starts_with(scope)
                && std::fs::metadata(path)
                    .map(|m| m.is_file() && m.len() == address.size)
                    .unwrap_or(false)
        })
    }

    /// Add (or refresh) a single path without rescanning
    pub fn record(&self, path: &Path) -> std::io::Result<()> {
        let address = content_address(path)?;
        let mut state = self.lock();
        remove(&mut state, path);
        insert(&mut state, path.to_path_buf(), address);
        Ok(())
    }

    /// Number of indexed paths
    pub fn len(&self) -> usize {
        self.lock().hash_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DuplicateStats {
        let state = self.lock();
        let mut stats = DuplicateStats::default();
        for entry in state.by_hash.values() {
            stats.total_files += entry.paths.len();
            if entry.paths.len() > 1 {
                stats.duplicate_files += entry.paths.len() - 1;
                stats.duplicate_groups += 1;
            } else {
                stats.unique_files += 1;
            }
        }
        stats
    }

    /// All groups with more than one path, ordered by their first path
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        let state = self.lock();
        let mut groups: Vec<DuplicateGroup> = state
            .by_hash
            .iter()
            .filter(|(_, entry)| entry.paths.len() > 1)
            .map(|(sha256, entry)| DuplicateGroup {
                sha256: sha256.clone(),
                size: entry.size,
                paths: entry.paths.clone(),
            })
            .collect();
        groups.sort_by(|a, b| a.paths[0].cmp(&b.paths[0]));
        groups
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("[Index] State mutex was poisoned, recovering...");
            poisoned.into_inner()
        })
    }
}

/// Copies still being written by a placement
fn is_in_flight(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n.ends_with(IN_FLIGHT_SUFFIX))
        .unwrap_or(false)
}

fn insert(state: &mut IndexState, path: PathBuf, address: ContentAddress) {
    let entry = state
        .by_hash
        .entry(address.sha256.clone())
        .or_insert_with(|| IndexEntry {
            paths: Vec::new(),
            size: address.size,
        });
    if let Err(pos) = entry.paths.binary_search(&path) {
        entry.paths.insert(pos, path.clone());
    }
    state.hash_of.insert(path, address.sha256);
}

fn remove(state: &mut IndexState, path: &Path) {
    let Some(hash) = state.hash_of.remove(path) else {
        return;
    };
    if let Some(entry) = state.by_hash.get_mut(&hash) {
        entry.paths.retain(|p| p != path);
        if entry.paths.is_empty() {
            state.by_hash.remove(&hash);
        }
    }
}

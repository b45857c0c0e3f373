//! Content-addressed deduplication and path versioning.

mod checksum;
mod index;
mod versioning;

pub use checksum::{content_address, ContentAddress};
pub use index::{ContentAddressIndex, DuplicateGroup, DuplicateStats};
pub use versioning::ensure_unique_path;

/// Suffix of hidden temporary copies that are not yet in place
pub(crate) const IN_FLIGHT_SUFFIX: &str = ".partial";

use std::fs;
use std::path::{Path, PathBuf};

/// Result of deduplicating a folder
#[derive(Debug, Clone, Default)]
pub struct DedupeReport {
    pub stats: DuplicateStats,
    pub groups: Vec<DuplicateGroup>,
    /// Paths that were deleted (empty on a dry run)
    pub removed: Vec<PathBuf>,
    /// Paths that could not be deleted
    pub failed: Vec<(PathBuf, String)>,
}

/// Remove every copy but the first of each duplicate group under `folder`.
///
/// With `dry_run` nothing is deleted; the report still lists the groups.
pub fn dedupe_folder(folder: &Path, dry_run: bool) -> DedupeReport {
    let index = ContentAddressIndex::scan(folder);
    let mut report = DedupeReport {
        stats: index.stats(),
        groups: index.duplicate_groups(),
        ..Default::default()
    };

    if dry_run {
        return report;
    }

    for group in &report.groups {
        for path in group.paths.iter().skip(1) {
            match fs::remove_file(path) {
                Ok(()) => {
                    tracing::info!("[Dedupe] Removed {}", path.display());
                    report.removed.push(path.clone());
                }
                Err(e) => {
                    tracing::error!("[Dedupe] Error removing {}: {}", path.display(), e);
                    report.failed.push((path.clone(), e.to_string()));
                }
            }
        }
    }

    report
}

/// Format a byte count in human-readable units
pub fn format_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB"] {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} GB", size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.txt"), b"same").unwrap();
        fs::write(dir.path().join("nested/b.txt"), b"same").unwrap();
        fs::write(dir.path().join("c.txt"), b"other").unwrap();
        dir
    }

    #[test]
    fn test_dry_run_keeps_files() {
        let dir = seed();
        let report = dedupe_folder(dir.path(), true);
        assert_eq!(report.stats.duplicate_files, 1);
        assert_eq!(report.groups.len(), 1);
        assert!(report.removed.is_empty());
        assert!(dir.path().join("nested/b.txt").exists());
    }

    #[test]
    fn test_dedupe_removes_all_but_first() {
        let dir = seed();
        let report = dedupe_folder(dir.path(), false);
        assert_eq!(report.removed, vec![dir.path().join("nested/b.txt")]);
        assert!(dir.path().join("a.txt").exists());
        assert!(!dir.path().join("nested/b.txt").exists());
        assert!(dir.path().join("c.txt").exists());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}

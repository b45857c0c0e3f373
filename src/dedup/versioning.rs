//! Collision-free destination paths (`name.ext`, `name_1.ext`, `name_2.ext`, ...)

use std::path::{Path, PathBuf};

/// Return `base_path` if it is free, otherwise the first free `_N` variant.
///
/// Existence is checked against the filesystem for every candidate.
pub fn ensure_unique_path(base_path: &Path) -> PathBuf {
    if !exists(base_path) {
        return base_path.to_path_buf();
    }

    let directory = base_path.parent().unwrap_or_else(|| Path::new(""));
    let stem = base_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = base_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter: u64 = 1;
    loop {
        let candidate = directory.join(format!("{}_{}{}", stem, counter, extension));
        if !exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Like `Path::exists`, but a dangling symlink still occupies the name
fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_free_path_is_returned_unchanged() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("report.pdf");
        assert_eq!(ensure_unique_path(&base), base);
    }

    #[test]
    fn test_versions_are_appended_to_stem() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("report.pdf");
        fs::write(&base, b"a").unwrap();
        assert_eq!(ensure_unique_path(&base), dir.path().join("report_1.pdf"));

        fs::write(dir.path().join("report_1.pdf"), b"b").unwrap();
        assert_eq!(ensure_unique_path(&base), dir.path().join("report_2.pdf"));
    }

    #[test]
    fn test_many_prior_versions() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("scan.png");
        fs::write(&base, b"0").unwrap();
        for i in 1..=250 {
            fs::write(dir.path().join(format!("scan_{i}.png")), b"x").unwrap();
        }
        assert_eq!(ensure_unique_path(&base), dir.path().join("scan_251.png"));
    }

    #[test]
    fn test_gap_in_versions_is_reused() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("note.txt");
        fs::write(&base, b"0").unwrap();
        fs::write(dir.path().join("note_2.txt"), b"2").unwrap();
        assert_eq!(ensure_unique_path(&base), dir.path().join("note_1.txt"));
    }

    #[test]
    fn test_path_without_extension() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("README");
        fs::write(&base, b"0").unwrap();
        assert_eq!(ensure_unique_path(&base), dir.path().join("README_1"));
    }
}

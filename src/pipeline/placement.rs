//! Copy-then-delete placement.
//!
//! The file is copied to a hidden sibling in the destination folder, given
//! the source modification time, renamed into place and verified. Only then
//! is the input removed.

use crate::dedup::{ensure_unique_path, ContentAddressIndex, IN_FLIGHT_SUFFIX};
use crate::error::PipelineError;
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Place `source` into `dest_dir` as `file_name` (versioned on collision).
///
/// Returns the final path. The input is removed after a verified copy; if that
/// removal fails the file is reported placed and the leftover is logged.
pub fn place(
    source: &Path,
    dest_dir: &Path,
    file_name: &str,
    index: &ContentAddressIndex,
) -> Result<PathBuf, PipelineError> {
    fs::create_dir_all(dest_dir).map_err(|e| PipelineError::fs(dest_dir, e))?;

    let source_meta = fs::metadata(source).map_err(|e| PipelineError::fs(source, e))?;
    let destination = ensure_unique_path(&dest_dir.join(file_name));
    let partial = dest_dir.join(format!(".{}{}", Uuid::new_v4(), IN_FLIGHT_SUFFIX));

    if let Err(e) = copy_into_place(source, &source_meta, &partial, &destination) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    if let Err(e) = index.record(&destination) {
        tracing::warn!(
            "[Place] Could not index {}: {}",
            destination.display(),
            e
        );
    }

    if let Err(e) = fs::remove_file(source) {
        tracing::error!(
            "[Place] Copied to {} but could not remove input {}: {}",
            destination.display(),
            source.display(),
            e
        );
    }

    Ok(destination)
}

fn copy_into_place(
    source: &Path,
    source_meta: &fs::Metadata,
    partial: &Path,
    destination: &Path,
) -> Result<(), PipelineError> {
    fs::copy(source, partial).map_err(|e| PipelineError::fs(partial, e))?;

    let mtime = FileTime::from_last_modification_time(source_meta);
    if let Err(e) = filetime::set_file_mtime(partial, mtime) {
        tracing::debug!("[Place] Could not preserve mtime on {}: {}", partial.display(), e);
    }

    // Another writer may have claimed the name since it was chosen
    if fs::symlink_metadata(destination).is_ok() {
        return Err(PipelineError::DestinationTaken(destination.to_path_buf()));
    }
    fs::rename(partial, destination).map_err(|e| PipelineError::fs(destination, e))?;

    let copied = fs::metadata(destination).map_err(|e| PipelineError::fs(destination, e))?;
    if copied.len() != source_meta.len() {
        let _ = fs::remove_file(destination);
        return Err(PipelineError::UnverifiedCopy {
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir, ContentAddressIndex) {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let index = ContentAddressIndex::scan(output.path());
        (input, output, index)
    }

    #[test]
    fn test_place_copies_then_removes_input() {
        let (input, output, index) = setup();
        let source = input.path().join("scan.pdf");
        fs::write(&source, b"pdf bytes").unwrap();
        let old = FileTime::from_unix_time(1_451_606_400, 0);
        filetime::set_file_mtime(&source, old).unwrap();

        let dest_dir = output.path().join("car");
        let placed = place(&source, &dest_dir, "car-insurance.pdf", &index).unwrap();

        assert_eq!(placed, dest_dir.join("car-insurance.pdf"));
        assert_eq!(fs::read(&placed).unwrap(), b"pdf bytes");
        assert!(!source.exists());

        let meta = fs::metadata(&placed).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_place_versions_on_collision() {
        let (input, output, index) = setup();
        let dest_dir = output.path().join("misc");

        for (i, body) in ["one", "two", "three"].iter().enumerate() {
            let source = input.path().join(format!("{i}.txt"));
            fs::write(&source, body).unwrap();
            place(&source, &dest_dir, "note.txt", &index).unwrap();
        }

        assert!(dest_dir.join("note.txt").exists());
        assert!(dest_dir.join("note_1.txt").exists());
        assert!(dest_dir.join("note_2.txt").exists());
    }

    #[test]
    fn test_no_partial_left_behind() {
        let (input, output, index) = setup();
        let source = input.path().join("a.txt");
        fs::write(&source, b"a").unwrap();
        let dest_dir = output.path().join("misc");
        place(&source, &dest_dir, "a.txt", &index).unwrap();

        let leftovers: Vec<_> = fs::read_dir(&dest_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(IN_FLIGHT_SUFFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_missing_source_is_error_and_writes_nothing() {
        let (input, output, index) = setup();
        let dest_dir = output.path().join("misc");
        let err = place(&input.path().join("gone.txt"), &dest_dir, "gone.txt", &index).unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(fs::read_dir(&dest_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_blocked_destination_keeps_input() {
        let (input, output, index) = setup();
        let source = input.path().join("lease.pdf");
        fs::write(&source, b"lease").unwrap();
        // A plain file where the category folder should be
        let dest_dir = output.path().join("home");
        fs::write(&dest_dir, b"not a folder").unwrap();

        let err = place(&source, &dest_dir, "lease.pdf", &index).unwrap_err();

        assert!(err.is_transient());
        assert_eq!(fs::read(&source).unwrap(), b"lease");
        assert_eq!(fs::read(&dest_dir).unwrap(), b"not a folder");
        assert!(index.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_destination_keeps_input_and_leaves_no_partial() {
        use std::os::unix::fs::PermissionsExt;

        let (input, output, index) = setup();
        let source = input.path().join("payslip.pdf");
        fs::write(&source, b"payslip").unwrap();
        let dest_dir = output.path().join("work");
        fs::create_dir_all(&dest_dir).unwrap();
        fs::set_permissions(&dest_dir, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users ignore directory permissions
        let canary = dest_dir.join("canary");
        if fs::write(&canary, b"").is_ok() {
            let _ = fs::remove_file(&canary);
            fs::set_permissions(&dest_dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = place(&source, &dest_dir, "payslip.pdf", &index);
        let entries = fs::read_dir(&dest_dir).unwrap().count();
        fs::set_permissions(&dest_dir, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.unwrap_err().is_transient());
        assert_eq!(fs::read(&source).unwrap(), b"payslip");
        assert_eq!(entries, 0);
        assert!(index.is_empty());
    }
}

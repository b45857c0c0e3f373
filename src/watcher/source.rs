//! Filesystem change notifications for the input tree.

use crate::error::WatchError;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Debounce window for raw notifications
const DEBOUNCE: Duration = Duration::from_millis(500);

/// How changes are discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// OS notifications (inotify, FSEvents, ReadDirectoryChangesW)
    #[default]
    Events,
    /// Walk the input tree on every tick; for network shares without notifications
    Polling,
}

/// A change relevant to the stability tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File created, written or moved in
    Touched(PathBuf),
    /// Directory appeared; its files may predate their own events
    DirectoryCreated(PathBuf),
    Removed(PathBuf),
}

/// Keeps the OS watcher alive; dropping it stops notifications
pub struct EventSource {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl EventSource {
    /// Watch `root` recursively, forwarding events outside `exclude` to the returned channel
    pub fn spawn(
        root: &Path,
        exclude: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let exclude = exclude.to_path_buf();

        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        for watch_event in translate(&event.kind, &event.paths, &exclude) {
                            if tx.send(watch_event).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!("[Watcher] Notification error: {:?}", error);
                    }
                }
            }
        })?;

        debouncer.watch(root, RecursiveMode::Recursive)?;
        tracing::info!("[Watcher] Watching {}", root.display());

        Ok((
            Self {
                _debouncer: debouncer,
            },
            rx,
        ))
    }
}

/// Map one notify event to tracker events, dropping anything under `exclude`
fn translate(kind: &EventKind, paths: &[PathBuf], exclude: &Path) -> Vec<WatchEvent> {
    let relevant = paths.iter().filter(|p| !p.starts_with(exclude));

    match kind {
        EventKind::Create(CreateKind::Folder) => relevant
            .map(|p| WatchEvent::DirectoryCreated(p.clone()))
            .collect(),
        EventKind::Create(_) => relevant.map(|p| classify_path(p)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            relevant.map(|p| WatchEvent::Removed(p.clone())).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut out = Vec::new();
            if let Some(from) = paths.first().filter(|p| !p.starts_with(exclude)) {
                out.push(WatchEvent::Removed(from.clone()));
            }
            if let Some(to) = paths.get(1).filter(|p| !p.starts_with(exclude)) {
                out.push(classify_path(to));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => relevant.map(|p| classify_path(p)).collect(),
        EventKind::Modify(_) => relevant
            .filter(|p| !p.is_dir())
            .map(|p| WatchEvent::Touched(p.clone()))
            .collect(),
        EventKind::Remove(_) => relevant.map(|p| WatchEvent::Removed(p.clone())).collect(),
        _ => Vec::new(),
    }
}

/// Creation events do not always say whether the path is a directory
fn classify_path(path: &Path) -> WatchEvent {
    if path.is_dir() {
        WatchEvent::DirectoryCreated(path.to_path_buf())
    } else {
        WatchEvent::Touched(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, RemoveKind};
    use tempfile::TempDir;

    #[test]
    fn test_create_file_and_folder() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("scans");
        std::fs::create_dir(&sub).unwrap();
        let exclude = dir.path().join("out");

        assert_eq!(
            translate(
                &EventKind::Create(CreateKind::Folder),
                &[sub.clone()],
                &exclude
            ),
            vec![WatchEvent::DirectoryCreated(sub.clone())]
        );
        // Unknown create kind on a directory is still recognized
        assert_eq!(
            translate(&EventKind::Create(CreateKind::Any), &[sub.clone()], &exclude),
            vec![WatchEvent::DirectoryCreated(sub)]
        );

        let file = dir.path().join("a.pdf");
        assert_eq!(
            translate(&EventKind::Create(CreateKind::File), &[file.clone()], &exclude),
            vec![WatchEvent::Touched(file)]
        );
    }

    #[test]
    fn test_excluded_paths_are_dropped() {
        let exclude = PathBuf::from("/in/sorted");
        let events = translate(
            &EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &[PathBuf::from("/in/sorted/car/a.pdf"), PathBuf::from("/in/b.pdf")],
            &exclude,
        );
        assert_eq!(events, vec![WatchEvent::Touched(PathBuf::from("/in/b.pdf"))]);
    }

    #[test]
    fn test_rename_and_remove() {
        let exclude = PathBuf::from("/out");
        let events = translate(
            &EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[PathBuf::from("/in/a.part"), PathBuf::from("/in/a.pdf")],
            &exclude,
        );
        assert_eq!(
            events,
            vec![
                WatchEvent::Removed(PathBuf::from("/in/a.part")),
                WatchEvent::Touched(PathBuf::from("/in/a.pdf")),
            ]
        );

        assert_eq!(
            translate(
                &EventKind::Remove(RemoveKind::File),
                &[PathBuf::from("/in/x.txt")],
                &exclude
            ),
            vec![WatchEvent::Removed(PathBuf::from("/in/x.txt"))]
        );
        assert!(translate(&EventKind::Access(notify::event::AccessKind::Any), &[], &exclude).is_empty());
    }
}

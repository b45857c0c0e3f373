//! Per-file ingestion pipeline
//!
//! `EXTRACT → CLASSIFY → NAME → DEDUPE_CHECK → PLACE → CLEANUP`
//!
//! Extraction, classification and naming failures send the file to the
//! unsupported area. Filesystem failures are returned as [`PipelineError`] and
//! leave the file where it was.

mod outcome;
mod placement;

pub use outcome::{Outcome, RunSummary, SkipReason};
pub use placement::place;

use crate::categories::{CategorySet, MISC};
use crate::classifier::{build_prompt, ClassificationRequest, ClassificationResult, Classifier, Upload};
use crate::content::{self, Asset};
use crate::dedup::ContentAddressIndex;
use crate::directories::{is_sidecar_dir, is_sidecar_file, DirectoryManager};
use crate::error::{ExtractError, PipelineError};
use crate::naming;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extensions of downloads and editors still writing
const IN_PROGRESS_EXTENSIONS: &[&str] = &["tmp", "part", "crdownload", "download"];

/// Everything known about one file as it moves through the stages
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub original_path: PathBuf,
    pub working_path: Option<PathBuf>,
    pub classification: Option<ClassificationResult>,
    pub computed_name: Option<String>,
    pub final_path: Option<PathBuf>,
}

impl PipelineState {
    pub fn new(original_path: impl Into<PathBuf>) -> Self {
        Self {
            original_path: original_path.into(),
            ..Default::default()
        }
    }
}

/// Processes single files from the input tree into the output tree.
///
/// Both roots are expected to be absolute, canonical paths.
pub struct Pipeline {
    input_root: PathBuf,
    directories: DirectoryManager,
    categories: CategorySet,
    classifier: Arc<dyn Classifier>,
    index: Arc<ContentAddressIndex>,
}

impl Pipeline {
    pub fn new(
        input_root: impl Into<PathBuf>,
        categories: CategorySet,
        classifier: Arc<dyn Classifier>,
        index: Arc<ContentAddressIndex>,
    ) -> Self {
        Self {
            input_root: input_root.into(),
            directories: DirectoryManager::new(index.root()),
            categories,
            classifier,
            index,
        }
    }

    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    pub fn output_root(&self) -> &Path {
        self.directories.output_root()
    }

    pub fn index(&self) -> &Arc<ContentAddressIndex> {
        &self.index
    }

    /// Create the category folders and the unsupported area
    pub fn prepare(&self) -> Result<(), PipelineError> {
        self.directories
            .ensure_category_structure(&self.categories)
            .map_err(|e| PipelineError::fs(self.output_root(), e))
    }

    /// Reason to ignore `path` without reading it, if any
    pub fn skip_reason(&self, path: &Path) -> Option<SkipReason> {
        if path.starts_with(self.output_root()) {
            return Some(SkipReason::InOutput);
        }

        let name = path.file_name()?.to_string_lossy();
        if name.starts_with('.') || is_sidecar_file(&name) {
            return Some(SkipReason::Noise);
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if IN_PROGRESS_EXTENSIONS.contains(&ext.as_str()) {
            return Some(SkipReason::Noise);
        }

        let relative = path.strip_prefix(&self.input_root).unwrap_or(path);
        let in_sidecar = relative
            .parent()
            .map(|p| {
                p.components()
                    .any(|c| is_sidecar_dir(&c.as_os_str().to_string_lossy()))
            })
            .unwrap_or(false);
        if in_sidecar {
            return Some(SkipReason::Noise);
        }

        None
    }

    /// Run one file through every stage
    pub async fn process(&self, path: &Path) -> Result<Outcome, PipelineError> {
        if let Some(reason) = self.skip_reason(path) {
            tracing::debug!("[Pipeline] Skipping {} ({:?})", path.display(), reason);
            return Ok(Outcome::Skipped(reason));
        }
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(Outcome::Skipped(SkipReason::NotAFile)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("[Pipeline] {} vanished", path.display());
                return Ok(Outcome::Vanished);
            }
            Err(e) => return Err(PipelineError::fs(path, e)),
        }

        let mut state = PipelineState::new(path);
        tracing::info!("[Pipeline] Processing {}", self.relative(path));

        // EXTRACT
        let source = path.to_path_buf();
        let extracted = run_blocking(move || content::extract(&source)).await?;
        let asset = match extracted {
            Ok(Some(asset)) => asset,
            Ok(None) => {
                tracing::info!(
                    "[Pipeline] Unsupported file type, leaving in place: {}",
                    self.relative(path)
                );
                return Ok(Outcome::Unsupported);
            }
            Err(e) => {
                tracing::warn!("[Pipeline] Extraction failed for {}: {}", path.display(), e);
                return self.quarantine(path, e.to_string()).await;
            }
        };
        state.working_path = asset.working_path().map(Path::to_path_buf);

        // CLASSIFY
        let request = match self.build_request(path, &asset) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("[Pipeline] Could not read working copy for {}: {}", path.display(), e);
                return self.quarantine(path, e.to_string()).await;
            }
        };
        let classification = match self.classifier.classify(request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    "[Pipeline] {} classification failed for {}: {}",
                    self.classifier.name(),
                    path.display(),
                    e
                );
                return self.quarantine(path, e.to_string()).await;
            }
        };
        drop(asset);
        tracing::debug!("[Pipeline] Classification: {:?}", classification);

        // NAME
        let stem = match naming::file_stem(&classification) {
            Ok(stem) => stem,
            Err(e) => {
                tracing::warn!("[Pipeline] Naming failed for {}: {}", path.display(), e);
                return self.quarantine(path, e.to_string()).await;
            }
        };
        let computed_name = with_extension(&stem, path);
        state.classification = Some(classification);
        state.computed_name = Some(computed_name.clone());

        // DEDUPE_CHECK
        if let Some(existing) = self.find_duplicate(path, None).await? {
            tracing::info!(
                "[Pipeline] Duplicate of {}, discarding {}",
                existing.display(),
                self.relative(path)
            );
            fs::remove_file(path).map_err(|e| PipelineError::fs(path, e))?;
            self.cleanup(path);
            return Ok(Outcome::Duplicate { existing });
        }

        // PLACE
        let folder = state
            .classification
            .as_ref()
            .map(|c| c.folder.as_str())
            .unwrap_or(MISC);
        let category = self.categories.resolve(folder);
        if !self.categories.contains(&folder.trim().to_lowercase()) {
            tracing::warn!(
                "[Pipeline] Unknown category {:?} for {}, using {}",
                folder,
                self.relative(path),
                category.name
            );
        }
        let dest_dir = self.directories.category_path(category);
        let destination = self.place_blocking(path, dest_dir, computed_name).await?;
        state.final_path = Some(destination.clone());

        tracing::info!(
            "[Pipeline] Placed {} -> {}",
            self.relative(path),
            destination
                .strip_prefix(self.output_root())
                .unwrap_or(&destination)
                .display()
        );

        // CLEANUP
        self.cleanup(path);

        Ok(Outcome::Placed { destination })
    }

    /// Move a file that could not be extracted or classified to the unsupported area
    async fn quarantine(&self, path: &Path, reason: String) -> Result<Outcome, PipelineError> {
        let unsupported = self.directories.unsupported_path();

        if let Some(existing) = self.find_duplicate(path, Some(unsupported.clone())).await? {
            tracing::info!(
                "[Pipeline] Already in unsupported as {}, discarding {}",
                existing.display(),
                self.relative(path)
            );
            fs::remove_file(path).map_err(|e| PipelineError::fs(path, e))?;
            self.cleanup(path);
            return Ok(Outcome::AlreadyQuarantined { existing });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        let destination = self.place_blocking(path, unsupported, file_name).await?;
        tracing::info!(
            "[Pipeline] Moved {} to unsupported: {}",
            self.relative(path),
            reason
        );
        self.cleanup(path);

        Ok(Outcome::Quarantined {
            destination,
            reason,
        })
    }

    fn build_request(&self, path: &Path, asset: &Asset) -> Result<ClassificationRequest, ExtractError> {
        let upload = match &asset.working_copy {
            Some(copy) => Some(Upload {
                bytes: copy.read()?,
                mime_type: copy.mime_type().to_string(),
            }),
            None => None,
        };

        Ok(ClassificationRequest {
            prompt: build_prompt(&self.relative(path), &self.categories),
            content: asset.text.clone(),
            asset: upload,
        })
    }

    async fn find_duplicate(
        &self,
        path: &Path,
        scope: Option<PathBuf>,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let index = Arc::clone(&self.index);
        let candidate = path.to_path_buf();
        run_blocking(move || match scope {
            Some(scope) => index.find_duplicate_within(&candidate, &scope),
            None => index.find_duplicate(&candidate),
        })
        .await
    }

    async fn place_blocking(
        &self,
        path: &Path,
        dest_dir: PathBuf,
        file_name: String,
    ) -> Result<PathBuf, PipelineError> {
        let index = Arc::clone(&self.index);
        let source = path.to_path_buf();
        run_blocking(move || place(&source, &dest_dir, &file_name, &index)).await?
    }

    fn cleanup(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            self.directories
                .cleanup_empty_dirs(parent, &self.input_root);
        }
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.input_root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

/// `stem` plus the original file's lower-cased extension
fn with_extension(stem: &str, original: &Path) -> String {
    match original.extension() {
        Some(ext) => format!("{}.{}", stem, ext.to_string_lossy().to_lowercase()),
        None => stem.to_string(),
    }
}

async fn run_blocking<F, T>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Join(e.to_string()))
}

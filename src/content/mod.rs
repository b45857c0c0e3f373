//! Content handler registry
//!
//! Turns an input file into classifier input: plain text for the prompt and/or
//! a bounded working copy for upload. Pure Rust extraction, no system libraries.
//!
//! ## Supported Formats
//! - Image: downscaled to 1024px and re-encoded as PNG
//! - PDF: text via pdf-extract, first two pages via lopdf
//! - Text: .txt, .md, .csv, .json, ... (direct read, truncated)
//! - Word: .docx via docx-rs
//! - Excel: .xlsx, .xls via calamine (first sheet)

mod document;
mod raster;
mod pdf;
mod spreadsheet;
mod text;

#[cfg(test)]
pub(crate) use document::sample_docx;
#[cfg(test)]
pub(crate) use pdf::sample_pdf;

use crate::error::ExtractError;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Character budget for any text handed to the classifier
pub const CONTENT_CHAR_LIMIT: usize = 5_000;

/// Kind of document, decided by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    Pdf,
    Text,
    Spreadsheet,
    Document,
    Unknown,
}

type Adapter = fn(&Path) -> Result<Adapted, ExtractError>;

/// Ordered dispatch table; the first kind listing an extension wins
const REGISTRY: &[(AssetKind, &[&str])] = &[
    (
        AssetKind::Image,
        &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif", "webp"],
    ),
    (AssetKind::Document, &["docx"]),
    (AssetKind::Spreadsheet, &["xlsx", "xls"]),
    (AssetKind::Pdf, &["pdf"]),
    (
        AssetKind::Text,
        &[
            "txt", "text", "md", "markdown", "rtf", "csv", "tsv", "json", "xml", "html", "htm",
            "yaml", "yml", "log",
        ],
    ),
];

impl AssetKind {
    /// Look up the kind for an extension (case-insensitive, without the dot)
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_lowercase();
        REGISTRY
            .iter()
            .find(|(_, exts)| exts.contains(&ext.as_str()))
            .map(|(kind, _)| *kind)
            .unwrap_or(AssetKind::Unknown)
    }

    pub fn for_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(AssetKind::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Pdf => "pdf",
            AssetKind::Text => "text",
            AssetKind::Spreadsheet => "spreadsheet",
            AssetKind::Document => "document",
            AssetKind::Unknown => "unknown",
        }
    }

    fn adapter(&self) -> Option<Adapter> {
        match self {
            AssetKind::Image => Some(raster::adapt),
            AssetKind::Pdf => Some(pdf::adapt),
            AssetKind::Text => Some(text::adapt),
            AssetKind::Spreadsheet => Some(spreadsheet::adapt),
            AssetKind::Document => Some(document::adapt),
            AssetKind::Unknown => None,
        }
    }
}

/// Bounded upload file, deleted when dropped
#[derive(Debug)]
pub struct WorkingCopy {
    path: TempPath,
    mime_type: String,
}

impl WorkingCopy {
    /// Write `bytes` into a fresh temporary file with the given suffix
    pub(crate) fn from_bytes(bytes: &[u8], suffix: &str) -> Result<Self, ExtractError> {
        let mut file = tempfile::Builder::new()
            .prefix("fileai-")
            .suffix(suffix)
            .tempfile()
            .map_err(ExtractError::WorkingCopy)?;
        file.write_all(bytes).map_err(ExtractError::WorkingCopy)?;
        file.flush().map_err(ExtractError::WorkingCopy)?;
        Ok(Self::from_temp_path(file.into_temp_path()))
    }

    pub(crate) fn from_temp_path(path: TempPath) -> Self {
        let mime_type = mime_guess::from_path(&*path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self { path, mime_type }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn read(&self) -> Result<Vec<u8>, ExtractError> {
        fs::read(&*self.path).map_err(|e| ExtractError::io(self.path.to_path_buf(), e))
    }
}

/// What a handler produced
#[derive(Debug, Default)]
pub(crate) struct Adapted {
    pub text: Option<String>,
    pub working_copy: Option<WorkingCopy>,
}

/// An input file plus whatever was extracted from it.
///
/// Owns its working copy; the temporary file goes away with the asset.
#[derive(Debug)]
pub struct Asset {
    pub source: PathBuf,
    pub kind: AssetKind,
    pub text: Option<String>,
    pub working_copy: Option<WorkingCopy>,
}

impl Asset {
    pub fn working_path(&self) -> Option<&Path> {
        self.working_copy.as_ref().map(|w| w.path())
    }
}

/// Extract `path` with the handler registered for its extension.
///
/// Returns `Ok(None)` when no handler exists; the file should be left alone.
pub fn extract(path: &Path) -> Result<Option<Asset>, ExtractError> {
    let kind = AssetKind::for_path(path);
    let Some(adapter) = kind.adapter() else {
        return Ok(None);
    };

    tracing::debug!("[Content] Extracting {} as {}", path.display(), kind.as_str());
    let adapted = run_adapter(adapter, path)?;

    Ok(Some(Asset {
        source: path.to_path_buf(),
        kind,
        text: adapted.text.filter(|t| !t.trim().is_empty()),
        working_copy: adapted.working_copy,
    }))
}

/// Any parser may panic on a corrupt file; that is an extraction failure like any other
fn run_adapter(adapter: Adapter, path: &Path) -> Result<Adapted, ExtractError> {
    match catch_unwind(AssertUnwindSafe(|| adapter(path))) {
        Ok(result) => result,
        Err(_panic) => {
            tracing::warn!("[Content] Parser panicked on {}", path.display());
            Err(ExtractError::Panicked)
        }
    }
}

/// Truncate to the content budget on a char boundary
pub(crate) fn truncate_text(text: &str) -> String {
    match text.char_indices().nth(CONTENT_CHAR_LIMIT) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>, ExtractError> {
    fs::read(path).map_err(|e| ExtractError::io(path, e))
}

/// Read at most `limit` bytes from the start of the file
pub(crate) fn read_prefix(path: &Path, limit: u64) -> Result<Vec<u8>, ExtractError> {
    let file = File::open(path).map_err(|e| ExtractError::io(path, e))?;
    let mut bytes = Vec::new();
    file.take(limit)
        .read_to_end(&mut bytes)
        .map_err(|e| ExtractError::io(path, e))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_lookup_is_case_insensitive() {
        assert_eq!(AssetKind::from_extension("PDF"), AssetKind::Pdf);
        assert_eq!(AssetKind::from_extension("Jpeg"), AssetKind::Image);
        assert_eq!(AssetKind::from_extension("xls"), AssetKind::Spreadsheet);
        assert_eq!(AssetKind::from_extension("docx"), AssetKind::Document);
        assert_eq!(AssetKind::from_extension("csv"), AssetKind::Text);
        assert_eq!(AssetKind::from_extension("doc"), AssetKind::Unknown);
        assert_eq!(AssetKind::from_extension("exe"), AssetKind::Unknown);
    }

    #[test]
    fn test_for_path_without_extension() {
        assert_eq!(AssetKind::for_path(Path::new("/tmp/README")), AssetKind::Unknown);
        assert_eq!(
            AssetKind::for_path(Path::new("/tmp/Scan.PNG")),
            AssetKind::Image
        );
    }

    #[test]
    fn test_unknown_extension_has_no_handler() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.zip");
        fs::write(&path, b"PK").unwrap();
        assert!(extract(&path).unwrap().is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "ş".repeat(CONTENT_CHAR_LIMIT + 10);
        let truncated = truncate_text(&text);
        assert_eq!(truncated.chars().count(), CONTENT_CHAR_LIMIT);
        assert_eq!(truncate_text("short"), "short");
    }

    fn panicking_parser(_path: &Path) -> Result<Adapted, ExtractError> {
        panic!("corrupt table stream");
    }

    #[test]
    fn test_parser_panic_is_extraction_error() {
        let result = run_adapter(panicking_parser, Path::new("/in/broken.docx"));
        assert!(matches!(result, Err(ExtractError::Panicked)));
    }

    #[test]
    fn test_read_prefix_stops_at_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.log");
        fs::write(&path, vec![b'x'; 10_000]).unwrap();
        assert_eq!(read_prefix(&path, 64).unwrap().len(), 64);
        assert_eq!(read_prefix(&path, 20_000).unwrap().len(), 10_000);
    }

    #[test]
    fn test_working_copy_is_removed_on_drop() {
        let copy = WorkingCopy::from_bytes(b"hello", ".txt").unwrap();
        let path = copy.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(copy.mime_type(), "text/plain");
        assert_eq!(copy.read().unwrap(), b"hello");
        drop(copy);
        assert!(!path.exists());
    }
}

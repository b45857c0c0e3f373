//! Error types for each stage of the organizer.
//!
//! Every component returns its own enum so callers can decide what is fatal:
//! extraction and classification problems route a file to the unsupported
//! area, filesystem problems leave it where it is and may be retried.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while turning a file into classifier input
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to process PDF: {0}")]
    Pdf(String),

    #[error("failed to parse DOCX: {0}")]
    Docx(String),

    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("spreadsheet has no sheets")]
    EmptyWorkbook,

    #[error("failed to create working copy: {0}")]
    WorkingCopy(#[source] io::Error),

    #[error("parser panicked on malformed input")]
    Panicked,
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure talking to the classification service
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),

    #[error("classifier gave up after {0} retries")]
    RetriesExhausted(u32),
}

/// The classification produced no usable file name
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("classification yields an empty file name")]
    Empty,
}

/// Failure of the pipeline itself (as opposed to a routed outcome)
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("filesystem error on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("copy of {from} to {to} could not be verified")]
    UnverifiedCopy { from: PathBuf, to: PathBuf },

    #[error("destination {0} appeared while placing")]
    DestinationTaken(PathBuf),

    #[error("extraction task failed: {0}")]
    Join(String),
}

impl PipelineError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same file later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Filesystem { source, .. } => !matches!(source.kind(), io::ErrorKind::NotFound),
            Self::UnverifiedCopy { .. } | Self::DestinationTaken(_) => true,
            Self::Join(_) => false,
        }
    }
}

/// Startup configuration problems; these end the process
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Gemini API key is required. Pass --api-key, set \"api_key\" in {config_file}, or set GEMINI_API_KEY"
    )]
    MissingApiKey { config_file: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not determine the configuration directory")]
    NoConfigDir,

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("category name {0:?} is reserved")]
    ReservedCategory(String),

    #[error("category name {0:?} is not a plain folder name")]
    InvalidCategory(String),

    #[error("failed to set up the classifier: {0}")]
    Classifier(String),
}

/// Failures that stop the watcher from starting or running
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to start filesystem notifications: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("another organizer already holds {0}")]
    Locked(PathBuf),
}

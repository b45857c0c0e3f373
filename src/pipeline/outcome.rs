//! Per-file outcomes and the run summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Why a path was ignored without being looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// OS metadata, hidden files and unfinished downloads
    Noise,
    /// Lives inside the output tree
    InOutput,
    /// Not a regular file
    NotAFile,
}

/// Terminal state of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Copied to its category folder and the input removed
    Placed { destination: PathBuf },
    /// Identical content already stored; input removed, nothing written
    Duplicate { existing: PathBuf },
    /// No handler for this extension; left untouched
    Unsupported,
    /// Extraction, classification or naming failed; moved to the unsupported area
    Quarantined { destination: PathBuf, reason: String },
    /// Failed like `Quarantined`, but the unsupported area already holds this content
    AlreadyQuarantined { existing: PathBuf },
    Skipped(SkipReason),
    /// Disappeared before it could be processed
    Vanished,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Placed { .. } => "placed",
            Outcome::Duplicate { .. } => "duplicate",
            Outcome::Unsupported => "unsupported",
            Outcome::Quarantined { .. } => "quarantined",
            Outcome::AlreadyQuarantined { .. } => "already_quarantined",
            Outcome::Skipped(_) => "skipped",
            Outcome::Vanished => "vanished",
        }
    }
}

/// Counts of what happened during a sweep or watch session
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub by_outcome: BTreeMap<String, usize>,
    pub by_extension: BTreeMap<String, usize>,
    /// Pipeline errors (file left in place)
    pub failed: usize,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            by_outcome: BTreeMap::new(),
            by_extension: BTreeMap::new(),
            failed: 0,
        }
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: &Path, outcome: &Outcome) {
        *self
            .by_outcome
            .entry(outcome.label().to_string())
            .or_default() += 1;

        if !matches!(outcome, Outcome::Skipped(_) | Outcome::Vanished) {
            *self.by_extension.entry(extension_key(path)).or_default() += 1;
        }
    }

    pub fn record_failure(&mut self, path: &Path) {
        self.failed += 1;
        *self.by_extension.entry(extension_key(path)).or_default() += 1;
    }

    pub fn count(&self, label: &str) -> usize {
        self.by_outcome.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.by_outcome.values().sum::<usize>() + self.failed
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Log the summary at info level
    pub fn log(&self) {
        let elapsed = self
            .finished_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at);
        tracing::info!(
            "[Summary] {} files in {}s: placed={} duplicate={} quarantined={} unsupported={} skipped={} failed={}",
            self.total(),
            elapsed.num_seconds(),
            self.count("placed"),
            self.count("duplicate"),
            self.count("quarantined") + self.count("already_quarantined"),
            self.count("unsupported"),
            self.count("skipped"),
            self.failed
        );
        for (ext, count) in &self.by_extension {
            tracing::info!("[Summary]   .{}: {}", ext, count);
        }
    }
}

fn extension_key(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "(none)".to_string())
}

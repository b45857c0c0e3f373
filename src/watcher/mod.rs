//! Stability-aware watching of the input tree
//!
//! The watch loop owns the [`StabilityTracker`]; notifications arrive over a
//! channel and every "is this file ready" decision is made on the tick.

mod source;
mod stability;

pub use source::{EventSource, SourceMode, WatchEvent};
pub use stability::{
    probe, sort_deepest_first, Observation, Requeue, StabilityPolicy, StabilityTracker,
    TickReport, WatchedFileState,
};

use crate::directories::is_sidecar_dir;
use crate::error::WatchError;
use crate::pipeline::{Pipeline, RunSummary};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use walkdir::WalkDir;

/// Cooperative stop flag shared with signal handlers
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub tick: Duration,
    pub policy: StabilityPolicy,
    pub mode: SourceMode,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1000),
            policy: StabilityPolicy::default(),
            mode: SourceMode::Events,
        }
    }
}

pub struct StabilityWatcher {
    pipeline: Arc<Pipeline>,
    settings: WatchSettings,
    stop: StopSignal,
}

impl StabilityWatcher {
    pub fn new(pipeline: Arc<Pipeline>, settings: WatchSettings, stop: StopSignal) -> Self {
        Self {
            pipeline,
            settings,
            stop,
        }
    }

    /// Every existing file under the input root, deepest first, output tree excluded
    pub fn sweep_order(&self) -> Vec<PathBuf> {
        let mut files = self.existing_files(self.pipeline.input_root());
        sort_deepest_first(&mut files);
        files
    }

    /// Process every existing file once.
    ///
    /// Returns the paths that failed transiently so a watch loop can retry them.
    pub async fn initial_sweep(&self, summary: &mut RunSummary) -> Vec<PathBuf> {
        let mut tracker = StabilityTracker::new(self.settings.policy.clone());
        self.sweep(&mut tracker, summary).await
    }

    /// Sweep, settling every path that reached a final outcome in `tracker`
    async fn sweep(&self, tracker: &mut StabilityTracker, summary: &mut RunSummary) -> Vec<PathBuf> {
        let files = self.sweep_order();
        tracing::info!(
            "[Watcher] Initial sweep of {} files in {}",
            files.len(),
            self.pipeline.input_root().display()
        );

        let mut retry = Vec::new();
        for path in files {
            if self.stop.is_stopped() {
                tracing::info!("[Watcher] Stop requested, ending sweep");
                break;
            }
            let seen = probe(&path);
            match self.pipeline.process(&path).await {
                Ok(outcome) => {
                    tracker.settle(&path, seen);
                    summary.record(&path, &outcome);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("[Watcher] Will retry {}: {}", path.display(), e);
                    retry.push(path);
                }
                Err(e) => {
                    tracing::error!("[Watcher] Failed to process {}: {}", path.display(), e);
                    tracker.settle(&path, seen);
                    summary.record_failure(&path);
                }
            }
        }
        retry
    }

    /// Sweep, then watch until the stop signal is raised
    pub async fn run(&self) -> Result<RunSummary, WatchError> {
        let root = self.pipeline.input_root().to_path_buf();
        let mut summary = RunSummary::new();
        let mut tracker = StabilityTracker::new(self.settings.policy.clone());

        // Subscribe before sweeping so files arriving meanwhile are not missed
        let (_source, mut events) = match self.settings.mode {
            SourceMode::Events => {
                let (source, rx) = EventSource::spawn(&root, self.pipeline.output_root())?;
                (Some(source), Some(rx))
            }
            SourceMode::Polling => (None, None),
        };

        for path in self.sweep(&mut tracker, &mut summary).await {
            tracker.track(&path, Instant::now());
            self.log_requeue(&path, tracker.requeue(&path, Instant::now()), &mut summary);
        }

        let mut interval = tokio::time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            "[Watcher] Monitoring {} (tick {:?}, {} stable ticks)",
            root.display(),
            self.settings.tick,
            self.settings.policy.stable_ticks
        );

        while !self.stop.is_stopped() {
            tokio::select! {
                _ = interval.tick() => {
                    if self.settings.mode == SourceMode::Polling {
                        self.poll_tree(&root, &mut tracker);
                    }
                    self.on_tick(&mut tracker, &mut summary).await;
                }
                Some(event) = next_event(&mut events) => {
                    self.on_event(&mut tracker, event);
                }
            }
        }

        tracing::info!("[Watcher] Stopped; {} paths still tracked", tracker.len());
        summary.finish();
        Ok(summary)
    }

    async fn on_tick(&self, tracker: &mut StabilityTracker, summary: &mut RunSummary) {
        let report = tracker.tick(Instant::now(), probe);

        for path in &report.abandoned {
            tracing::warn!(
                "[Watcher] {} never settled, no longer tracking it",
                path.display()
            );
        }

        for path in report.ready {
            if self.stop.is_stopped() {
                tracker.forget(&path);
                continue;
            }
            match self.pipeline.process(&path).await {
                Ok(outcome) => {
                    tracker.complete(&path);
                    summary.record(&path, &outcome);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("[Watcher] Transient failure on {}: {}", path.display(), e);
                    let decision = tracker.requeue(&path, Instant::now());
                    self.log_requeue(&path, decision, summary);
                }
                Err(e) => {
                    tracing::error!("[Watcher] Failed to process {}: {}", path.display(), e);
                    tracker.complete(&path);
                    summary.record_failure(&path);
                }
            }
        }
    }

    /// Polling stand-in for notifications: new or changed files get tracked
    fn poll_tree(&self, root: &Path, tracker: &mut StabilityTracker) {
        let now = Instant::now();
        let files: HashSet<PathBuf> = self.existing_files(root).into_iter().collect();
        tracker.retain_settled(|path| files.contains(path));
        for path in &files {
            if let Some(observation) = probe(path) {
                tracker.poll(path, observation, now);
            }
        }
    }

    fn on_event(&self, tracker: &mut StabilityTracker, event: WatchEvent) {
        let now = Instant::now();
        match event {
            WatchEvent::Touched(path) => {
                if self.pipeline.skip_reason(&path).is_none() {
                    tracing::debug!("[Watcher] Change: {}", path.display());
                    tracker.observe_event(&path, now);
                }
            }
            WatchEvent::DirectoryCreated(dir) => {
                // Files may have landed before the directory's own event arrived
                for path in self.existing_files(&dir) {
                    tracker.observe_event(&path, now);
                }
            }
            WatchEvent::Removed(path) => tracker.forget(&path),
        }
    }

    fn log_requeue(&self, path: &Path, decision: Requeue, summary: &mut RunSummary) {
        match decision {
            Requeue::Retry { attempt, delay } => tracing::info!(
                "[Watcher] Retrying {} in {:?} (attempt {})",
                path.display(),
                delay,
                attempt + 1
            ),
            Requeue::Abandoned { attempts } => {
                tracing::error!(
                    "[Watcher] Giving up on {} after {} attempts",
                    path.display(),
                    attempts
                );
                summary.record_failure(path);
            }
        }
    }

    /// Regular files under `dir` that the pipeline would not skip outright
    fn existing_files(&self, dir: &Path) -> Vec<PathBuf> {
        let output_root = self.pipeline.output_root();
        WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && (e.path().starts_with(output_root)
                        || is_sidecar_dir(&e.file_name().to_string_lossy())))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| self.pipeline.skip_reason(p).is_none())
            .collect()
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<WatchEvent>>) -> Option<WatchEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

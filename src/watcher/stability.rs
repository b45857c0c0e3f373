//! Per-path stability tracking.
//!
//! A path is ready once its size and modification time have been unchanged
//! for `stable_ticks` consecutive ticks. The tracker does no I/O of its own:
//! callers pass the current instant and a probe that reads file metadata.
//!
//! Paths that finished or were abandoned are remembered as settled together
//! with what they looked like at the time. A poller re-tracks a settled path
//! only once that observation changes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Longest delay between retries of a transiently failing path
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// What a probe saw on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Read size and mtime of a regular file; `None` if it is gone or not a file
pub fn probe(path: &Path) -> Option<Observation> {
    let meta = fs::symlink_metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    Some(Observation {
        size: meta.len(),
        modified: meta.modified().ok(),
    })
}

#[derive(Debug, Clone)]
pub struct StabilityPolicy {
    /// Consecutive unchanged ticks before a path is handed off
    pub stable_ticks: u32,
    /// Paths that never settle within this window are dropped
    pub max_tracking: Duration,
    /// Handoffs allowed before a transiently failing path is dropped
    pub max_attempts: u32,
    /// Delay after the first transient failure; doubles on each further one
    pub retry_backoff: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            stable_ticks: 2,
            max_tracking: Duration::from_secs(3600),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(2000),
        }
    }
}

/// Everything remembered about one tracked path
#[derive(Debug, Clone)]
pub struct WatchedFileState {
    pub last_modified: Option<SystemTime>,
    pub last_size: Option<u64>,
    pub stable_count: u32,
    pub first_seen: Instant,
    /// Handoffs so far
    pub attempts: u32,
    /// Not checked again before this instant (retry backoff)
    pub not_before: Option<Instant>,
    /// Handed to the pipeline and not yet completed or requeued
    pub in_flight: bool,
}

impl WatchedFileState {
    fn new(now: Instant) -> Self {
        Self {
            last_modified: None,
            last_size: None,
            stable_count: 0,
            first_seen: now,
            attempts: 0,
            not_before: None,
            in_flight: false,
        }
    }
}

/// Result of one tick
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Stable paths to hand to the pipeline, deepest first
    pub ready: Vec<PathBuf>,
    /// Dropped because they never settled
    pub abandoned: Vec<PathBuf>,
    /// Gone from disk
    pub vanished: Vec<PathBuf>,
}

/// What happens to a path after a transient failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requeue {
    Retry { attempt: u32, delay: Duration },
    Abandoned { attempts: u32 },
}

impl WatchedFileState {
    fn last_observation(&self) -> Option<Observation> {
        self.last_size.map(|size| Observation {
            size,
            modified: self.last_modified,
        })
    }
}

#[derive(Debug, Default)]
pub struct StabilityTracker {
    policy: StabilityPolicy,
    files: HashMap<PathBuf, WatchedFileState>,
    /// Finished or abandoned paths; `None` until the next poll records a baseline
    settled: HashMap<PathBuf, Option<Observation>>,
}

impl StabilityTracker {
    pub fn new(policy: StabilityPolicy) -> Self {
        Self {
            policy,
            files: HashMap::new(),
            settled: HashMap::new(),
        }
    }

    /// A change notification: start tracking, or restart the stability count
    pub fn observe_event(&mut self, path: &Path, now: Instant) {
        self.settled.remove(path);
        let state = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| WatchedFileState::new(now));
        state.stable_count = 0;
    }

    /// Start tracking if not already tracked; existing state is kept
    pub fn track(&mut self, path: &Path, now: Instant) {
        self.files
            .entry(path.to_path_buf())
            .or_insert_with(|| WatchedFileState::new(now));
    }

    /// A polled path: track it unless it settled and still looks the same.
    ///
    /// Returns whether the path is tracked afterwards.
    pub fn poll(&mut self, path: &Path, observation: Observation, now: Instant) -> bool {
        match self.settled.get(path).copied() {
            Some(Some(seen)) if seen == observation => return false,
            Some(None) => {
                self.settled.insert(path.to_path_buf(), Some(observation));
                return false;
            }
            Some(Some(_)) => {
                self.settled.remove(path);
            }
            None => {}
        }
        self.track(path, now);
        true
    }

    /// Mark a path done without tracking it; `observation` is how it looked when handled
    pub fn settle(&mut self, path: &Path, observation: Option<Observation>) {
        self.files.remove(path);
        self.settled.insert(path.to_path_buf(), observation);
    }

    /// Drop settled records for paths that no longer exist
    pub fn retain_settled<F>(&mut self, mut present: F)
    where
        F: FnMut(&Path) -> bool,
    {
        self.settled.retain(|path, _| present(path));
    }

    pub fn is_settled(&self, path: &Path) -> bool {
        self.settled.contains_key(path)
    }

    pub fn forget(&mut self, path: &Path) {
        self.files.remove(path);
        self.settled.remove(path);
    }

    /// Handed-off path finished (processed or failed for good)
    pub fn complete(&mut self, path: &Path) {
        let observation = self.files.get(path).and_then(WatchedFileState::last_observation);
        self.settle(path, observation);
    }

    /// Handed-off path failed transiently: track again after a backoff
    pub fn requeue(&mut self, path: &Path, now: Instant) -> Requeue {
        let state = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| WatchedFileState::new(now));
        state.attempts = state.attempts.max(1);

        if state.attempts >= self.policy.max_attempts {
            let attempts = state.attempts;
            let observation = state.last_observation();
            self.settle(path, observation);
            return Requeue::Abandoned { attempts };
        }

        let delay = backoff(self.policy.retry_backoff, state.attempts);
        state.in_flight = false;
        state.stable_count = 0;
        state.last_size = None;
        state.last_modified = None;
        state.first_seen = now;
        state.not_before = Some(now + delay);

        Requeue::Retry {
            attempt: state.attempts,
            delay,
        }
    }

    /// Compare every tracked path with disk and decide who is ready
    pub fn tick<F>(&mut self, now: Instant, mut probe: F) -> TickReport
    where
        F: FnMut(&Path) -> Option<Observation>,
    {
        let mut report = TickReport::default();
        let mut abandoned = Vec::new();
        let stable_ticks = self.policy.stable_ticks.max(1);
        let max_tracking = self.policy.max_tracking;

        for (path, state) in self.files.iter_mut() {
            if state.in_flight {
                continue;
            }
            if state.not_before.is_some_and(|t| now < t) {
                continue;
            }

            let Some(observation) = probe(path) else {
                report.vanished.push(path.clone());
                continue;
            };

            if now.saturating_duration_since(state.first_seen) > max_tracking {
                abandoned.push((path.clone(), observation));
                continue;
            }

            let unchanged = state.last_size == Some(observation.size)
                && state.last_modified == observation.modified;
            if unchanged {
                state.stable_count += 1;
            } else {
                state.last_size = Some(observation.size);
                state.last_modified = observation.modified;
                state.stable_count = 0;
            }

            if state.stable_count >= stable_ticks {
                state.in_flight = true;
                state.attempts += 1;
                report.ready.push(path.clone());
            }
        }

        for path in &report.vanished {
            self.files.remove(path);
        }
        for (path, observation) in abandoned {
            self.settle(&path, Some(observation));
            report.abandoned.push(path);
        }
        sort_deepest_first(&mut report.ready);

        report
    }

    pub fn state(&self, path: &Path) -> Option<&WatchedFileState> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// `base * 2^(attempt-1)`, capped
fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RETRY_BACKOFF)
}

/// Deeper paths first, then lexicographic for a stable order
pub fn sort_deepest_first(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });
}

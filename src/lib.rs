//! fileai: watches an input folder, asks an LLM what each document is and
//! files it under a category folder with a descriptive name.

pub mod categories;
pub mod classifier;
pub mod config;
pub mod content;
pub mod dedup;
pub mod directories;
pub mod error;
pub mod lock;
pub mod naming;
pub mod pipeline;
pub mod watcher;

pub use categories::{Category, CategorySet};
pub use classifier::{ClassificationResult, Classifier, GeminiClassifier, RateLimitedClassifier};
pub use config::Settings;
pub use dedup::ContentAddressIndex;
pub use lock::OutputLock;
pub use pipeline::{Outcome, Pipeline, RunSummary};
pub use watcher::{StabilityWatcher, StopSignal};

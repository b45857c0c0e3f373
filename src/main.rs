//! fileai command line
//!
//! - `fileai organize <INPUT> <OUTPUT> [--watch]` files documents by content
//! - `fileai dedupe <FOLDER> [--dry-run]` removes duplicate files

use clap::{Parser, Subcommand};
use fileai::classifier::{Classifier, RateLimitedClassifier};
use fileai::config::{EnvVars, Overrides, Settings};
use fileai::dedup::{dedupe_folder, format_size, ContentAddressIndex};
use fileai::error::{ConfigError, PipelineError, WatchError};
use fileai::lock::OutputLock;
use fileai::pipeline::{Pipeline, RunSummary};
use fileai::watcher::{StabilityWatcher, StopSignal};
use fileai::GeminiClassifier;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fileai")]
#[command(about = "Classify documents with an LLM and file them into category folders")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every file under INPUT, optionally keep watching for new ones
    Organize {
        /// Folder to process recursively
        input: PathBuf,

        /// Folder receiving the category tree
        output: PathBuf,

        /// Keep monitoring INPUT after the initial sweep
        #[arg(short, long)]
        watch: bool,

        /// Gemini API key (saved to the config file)
        #[arg(long)]
        api_key: Option<String>,

        /// Model name (saved to the config file)
        #[arg(long)]
        model: Option<String>,

        /// Config file (default: <config dir>/fileai/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Poll the input tree instead of using filesystem notifications
        #[arg(long)]
        poll: bool,
    },

    /// Find and remove duplicate files in a folder
    Dedupe {
        /// Folder to deduplicate
        folder: PathBuf,

        /// Only report duplicates, do not remove them
        #[arg(long)]
        dry_run: bool,
    },
}

/// Startup failures; these end the process with exit code 1
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[tokio::main]
async fn main() -> ExitCode {
    // GEMINI_API_KEY may come from a .env in the working directory
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Organize {
            input,
            output,
            watch,
            api_key,
            model,
            config,
            poll,
        } => {
            let overrides = Overrides {
                api_key,
                model,
                config_path: config,
            };
            organize(&input, &output, watch, poll, overrides).await
        }
        Commands::Dedupe { folder, dry_run } => dedupe(&folder, dry_run),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins when set; otherwise warn for dependencies and info for fileai
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,fileai=debug"
    } else {
        "warn,fileai=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

async fn organize(
    input: &Path,
    output: &Path,
    watch: bool,
    poll: bool,
    overrides: Overrides,
) -> Result<(), CliError> {
    let mut settings = Settings::resolve(&overrides, &EnvVars::from_process())?;
    if poll {
        settings.watch.polling = true;
    }

    let input = canonical_dir(input)?;
    std::fs::create_dir_all(output).map_err(|source| WatchError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    let output = canonical_dir(output)?;

    let _lock = OutputLock::acquire(&output)?;

    let index = Arc::new(ContentAddressIndex::new(&output).ignoring(OutputLock::path_for(&output)));
    index.rescan();
    let stats = index.stats();
    tracing::info!(
        "[Startup] Output holds {} files ({} unique, {} duplicates in {} groups)",
        stats.total_files,
        stats.unique_files,
        stats.duplicate_files,
        stats.duplicate_groups
    );

    let gemini = GeminiClassifier::new(settings.gemini_config(), &settings.categories)
        .map_err(|e| ConfigError::Classifier(e.to_string()))?;
    let classifier = Arc::new(RateLimitedClassifier::new(gemini, settings.rate_limiter()));
    tracing::info!(
        "[Startup] Classifying with {} model {}",
        classifier.name(),
        classifier.inner().model()
    );

    let pipeline = Arc::new(Pipeline::new(
        &input,
        settings.categories.clone(),
        classifier,
        index,
    ));
    pipeline.prepare()?;

    let stop = StopSignal::new();
    let watcher = StabilityWatcher::new(pipeline, settings.watch_settings(), stop.clone());

    let summary = if watch {
        let signal = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("[Watcher] Interrupt received, stopping");
                signal.stop();
            }
        });
        watcher.run().await?
    } else {
        let mut summary = RunSummary::new();
        for path in watcher.initial_sweep(&mut summary).await {
            summary.record_failure(&path);
        }
        summary.finish();
        summary
    };

    summary.log();
    Ok(())
}

fn dedupe(folder: &Path, dry_run: bool) -> Result<(), CliError> {
    let folder = canonical_dir(folder)?;
    let report = dedupe_folder(&folder, dry_run);

    println!("Total files: {}", report.stats.total_files);
    println!("Unique files: {}", report.stats.unique_files);
    println!("Duplicate files: {}", report.stats.duplicate_files);
    println!("Duplicate groups: {}", report.stats.duplicate_groups);

    for group in &report.groups {
        println!();
        println!(
            "{} copies of {} ({}):",
            group.paths.len(),
            &group.sha256[..12.min(group.sha256.len())],
            format_size(group.size)
        );
        for (i, path) in group.paths.iter().enumerate() {
            let marker = if i == 0 { "keep" } else if dry_run { "dup " } else { "del " };
            println!("  [{}] {}", marker, path.display());
        }
    }

    if !dry_run {
        println!();
        println!("Removed {} files", report.removed.len());
        for (path, error) in &report.failed {
            println!("Could not remove {}: {}", path.display(), error);
        }
    }
    Ok(())
}

fn canonical_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.canonicalize() {
        Ok(p) if p.is_dir() => Ok(p),
        _ => Err(ConfigError::NotADirectory(path.to_path_buf())),
    }
}

//! Settings resolution
//!
//! Precedence for each value: explicit argument > config file > environment.
//! The config file lives at `<config_dir>/fileai/config.json` unless a path is
//! given explicitly. Explicit `api_key`/`model` values are written back to it.

use crate::categories::{Category, CategorySet};
use crate::classifier::{GeminiConfig, SlidingWindowLimiter, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::error::ConfigError;
use crate::watcher::{SourceMode, StabilityPolicy, WatchSettings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const MODEL_ENV: &str = "GEMINI_MODEL";

/// Sliding window for classifier calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_calls: usize,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_calls: 14,
            window_secs: 60,
        }
    }
}

/// Watch loop tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub tick_ms: u64,
    pub stable_ticks: u32,
    pub max_tracking_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Walk the tree each tick instead of relying on OS notifications
    pub polling: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            stable_ticks: 2,
            max_tracking_secs: 3600,
            max_attempts: 3,
            retry_backoff_ms: 2000,
            polling: false,
        }
    }
}

/// On-disk config file. Unknown keys are kept when the file is rewritten.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigFile {
    /// Read the file; a missing file is an empty config
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write via a temp file and rename
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(write_err)?;
        fs::rename(&temp_path, path).map_err(write_err)?;
        Ok(())
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub config_path: Option<PathBuf>,
}

/// Values read from the environment
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl EnvVars {
    pub fn from_process() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_key: read(API_KEY_ENV),
            model: read(MODEL_ENV),
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub categories: CategorySet,
    pub rate_limit: RateLimitSettings,
    pub watch: WatchConfig,
    pub config_path: PathBuf,
}

/// `<config_dir>/fileai/config.json`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("fileai").join("config.json"))
        .ok_or(ConfigError::NoConfigDir)
}

impl Settings {
    /// Resolve settings and persist explicitly given credentials
    pub fn resolve(overrides: &Overrides, env: &EnvVars) -> Result<Self, ConfigError> {
        let config_path = match &overrides.config_path {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        let file = ConfigFile::load(&config_path)?;

        let api_key = first_non_empty([&overrides.api_key, &file.api_key, &env.api_key]).ok_or_else(
            || ConfigError::MissingApiKey {
                config_file: config_path.display().to_string(),
            },
        )?;
        let model = first_non_empty([&overrides.model, &file.model, &env.model])
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let categories = match &file.categories {
            Some(list) => CategorySet::new(list.clone())?,
            None => CategorySet::default(),
        };

        let settings = Self {
            api_key,
            model,
            base_url: file
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            categories,
            rate_limit: file.rate_limit.unwrap_or_default(),
            watch: file.watch.unwrap_or_default(),
            config_path,
        };

        if overrides.api_key.is_some() || overrides.model.is_some() {
            if let Err(e) = persist(&settings.config_path, file, overrides) {
                tracing::warn!("[Config] Could not save configuration: {}", e);
            }
        }

        Ok(settings)
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            base_url: self.base_url.clone(),
            ..GeminiConfig::new(self.api_key.clone(), self.model.clone())
        }
    }

    pub fn rate_limiter(&self) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(
            self.rate_limit.max_calls,
            Duration::from_secs(self.rate_limit.window_secs),
        )
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            tick: Duration::from_millis(self.watch.tick_ms.max(1)),
            policy: StabilityPolicy {
                stable_ticks: self.watch.stable_ticks,
                max_tracking: Duration::from_secs(self.watch.max_tracking_secs),
                max_attempts: self.watch.max_attempts,
                retry_backoff: Duration::from_millis(self.watch.retry_backoff_ms),
            },
            mode: if self.watch.polling {
                SourceMode::Polling
            } else {
                SourceMode::Events
            },
        }
    }
}

fn first_non_empty<const N: usize>(candidates: [&Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn persist(path: &Path, mut file: ConfigFile, overrides: &Overrides) -> Result<(), ConfigError> {
    if let Some(key) = &overrides.api_key {
        file.api_key = Some(key.clone());
    }
    if let Some(model) = &overrides.model {
        file.model = Some(model.clone());
    }
    file.save(path)?;
    tracing::info!("[Config] Saved configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn overrides(dir: &TempDir, api_key: Option<&str>, model: Option<&str>) -> Overrides {
        Overrides {
            api_key: api_key.map(str::to_string),
            model: model.map(str::to_string),
            config_path: Some(dir.path().join("config.json")),
        }
    }

    fn env(api_key: Option<&str>) -> EnvVars {
        EnvVars {
            api_key: api_key.map(str::to_string),
            model: None,
        }
    }

    #[test]
    fn test_missing_key_is_error() {
        let dir = TempDir::new().unwrap();
        let err = Settings::resolve(&overrides(&dir, None, None), &env(None)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey { .. }));
    }

    #[test]
    fn test_env_is_lowest_precedence() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::resolve(&overrides(&dir, None, None), &env(Some("from-env"))).unwrap();
        assert_eq!(settings.api_key, "from-env");
        assert_eq!(settings.model, DEFAULT_MODEL);

        fs::write(dir.path().join("config.json"), r#"{"api_key": "from-file"}"#).unwrap();
        let settings = Settings::resolve(&overrides(&dir, None, None), &env(Some("from-env"))).unwrap();
        assert_eq!(settings.api_key, "from-file");
    }

    #[test]
    fn test_explicit_wins_and_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"api_key": "old", "custom": 7}"#).unwrap();

        let settings = Settings::resolve(
            &overrides(&dir, Some("new-key"), Some("gemini-x")),
            &env(Some("env-key")),
        )
        .unwrap();
        assert_eq!(settings.api_key, "new-key");
        assert_eq!(settings.model, "gemini-x");

        let saved = ConfigFile::load(&path).unwrap();
        assert_eq!(saved.api_key.as_deref(), Some("new-key"));
        assert_eq!(saved.model.as_deref(), Some("gemini-x"));
        assert_eq!(saved.extra.get("custom"), Some(&Value::from(7)));
    }

    #[test]
    fn test_file_sections_override_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{
                "api_key": "k",
                "categories": [{"name": "Legal", "description": "Contracts"}],
                "rate_limit": {"max_calls": 5},
                "watch": {"tick_ms": 250, "polling": true}
            }"#,
        )
        .unwrap();

        let settings = Settings::resolve(&overrides(&dir, None, None), &env(None)).unwrap();
        assert_eq!(settings.categories.names(), vec!["legal", "misc"]);
        assert_eq!(settings.rate_limit.max_calls, 5);
        assert_eq!(settings.rate_limit.window_secs, 60);

        let watch = settings.watch_settings();
        assert_eq!(watch.tick, Duration::from_millis(250));
        assert_eq!(watch.policy.stable_ticks, 2);
        assert_eq!(watch.mode, SourceMode::Polling);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let err = Settings::resolve(&overrides(&dir, None, None), &env(Some("k"))).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"api_key": "  "}"#).unwrap();
        let settings = Settings::resolve(&overrides(&dir, None, None), &env(Some("env"))).unwrap();
        assert_eq!(settings.api_key, "env");
    }
}

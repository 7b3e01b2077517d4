//! Configuration loading and management
//!
//! Handles parsing of `config.toml` from the nudge config directory (or an
//! explicit path). Every field has a default, so a missing file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name looked up inside a config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Language-model endpoint configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Scheduling limits
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// In-page presenter behaviour
    #[serde(default)]
    pub presenter: PresenterConfig,

    /// Platform notification sink
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Model-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifier sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the bearer key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on a single model call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.fireworks.ai/inference/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "accounts/fireworks/models/llama-v3p3-70b-instruct".to_string()
}

fn default_api_key_env() -> String {
    "NUDGE_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Fire times further than this many days ahead are rejected
    #[serde(default = "default_max_horizon_days")]
    pub max_horizon_days: i64,
}

fn default_max_horizon_days() -> i64 {
    366
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            max_horizon_days: default_max_horizon_days(),
        }
    }
}

/// Presenter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenterConfig {
    /// Seconds before a banner dismisses itself
    #[serde(default = "default_banner_secs")]
    pub banner_secs: u64,

    /// Number of title flips before the original title is restored
    #[serde(default = "default_title_flash_cycles")]
    pub title_flash_cycles: u32,

    #[serde(default = "default_title_flash_interval_ms")]
    pub title_flash_interval_ms: u64,

    /// Command used to play WAV files (receives the file path as last arg)
    #[serde(default = "default_player")]
    pub player: String,

    /// Command used for the spoken cue (receives the phrase as last arg)
    #[serde(default = "default_speaker")]
    pub speaker: String,
}

fn default_banner_secs() -> u64 {
    5
}

fn default_title_flash_cycles() -> u32 {
    6
}

fn default_title_flash_interval_ms() -> u64 {
    1000
}

fn default_player() -> String {
    if cfg!(target_os = "macos") {
        "afplay".to_string()
    } else {
        "aplay -q".to_string()
    }
}

fn default_speaker() -> String {
    if cfg!(target_os = "macos") {
        "say".to_string()
    } else {
        "espeak".to_string()
    }
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            banner_secs: default_banner_secs(),
            title_flash_cycles: default_title_flash_cycles(),
            title_flash_interval_ms: default_title_flash_interval_ms(),
            player: default_player(),
            speaker: default_speaker(),
        }
    }
}

/// Where platform notifications go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifySink {
    #[default]
    Terminal,
    Jsonl,
}

/// Notification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub sink: NotifySink,

    /// Output file for the `jsonl` sink; `-` or unset means stdout
    #[serde(default)]
    pub path: Option<String>,
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Control socket path; defaults to `<data_dir>/nudge.sock`
    #[serde(default)]
    pub socket: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path).unwrap_or_else(|err| {
                tracing::warn!(path = %config_path.display(), %err, "ignoring invalid config");
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Resolve configuration from an explicit path or the platform config dir
    ///
    /// An explicit path must exist and parse; the default location falls back
    /// to defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(default_config_dir()
                .map(|dir| Self::load_from_dir(&dir))
                .unwrap_or_default()),
        }
    }

    fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.schedule.validate()?;
        self.presenter.validate()?;
        Ok(())
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "model.api_url must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::InvalidConfig("model.model cannot be empty".to_string()));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "model.api_key_env cannot be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "model.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Read the bearer key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

impl ScheduleConfig {
    fn validate(&self) -> Result<()> {
        if self.max_horizon_days <= 0 {
            return Err(Error::InvalidConfig(
                "schedule.max_horizon_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl PresenterConfig {
    fn validate(&self) -> Result<()> {
        if self.title_flash_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "presenter.title_flash_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "nudge")
}

/// Platform config directory (e.g. `~/.config/nudge`)
pub fn default_config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Platform data directory (e.g. `~/.local/share/nudge`)
pub fn default_data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

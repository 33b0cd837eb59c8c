// Application configuration
// JSON config file with defaults for every field

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::alerts::Severity;
use crate::pipeline::ListenerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Expected source rate (Hz); sources at other rates are used as-is with a warning
    pub sample_rate: u32,

    /// Samples per capture window
    pub window_size: usize,

    /// Time between captures
    pub capture_interval_ms: u64,

    /// Minimum window level in [0, 1] worth classifying
    pub activity_threshold: f32,

    /// Classifications below this confidence are not dispatched
    pub min_confidence: f32,

    /// Time budget per classifier stage
    pub classification_timeout_ms: u64,

    /// Classifications allowed in flight at once
    pub max_pending_windows: usize,

    /// Alerts kept in memory
    pub history_capacity: usize,

    /// Remote classifier endpoint (None = local only)
    pub remote_endpoint: Option<String>,

    pub channels: ChannelsConfig,

    /// Mirror alerts to SQLite
    pub persist_history: bool,

    /// None = app data directory
    pub database_path: Option<PathBuf>,

    /// Stored alerts older than this are pruned at startup
    pub retention_days: u32,

    /// Write a JSONL trace of every listening session here
    pub trace_path: Option<PathBuf>,

    /// Used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            window_size: 2048,
            capture_interval_ms: 3000,
            activity_threshold: 0.3,
            min_confidence: 0.0,
            classification_timeout_ms: 2000,
            max_pending_windows: 4,
            history_capacity: 10,
            remote_endpoint: None,
            channels: ChannelsConfig::default(),
            persist_history: true,
            database_path: None,
            retention_days: 30,
            trace_path: None,
            log_level: "info".to_string(),
        }
    }
}

/// Per-channel toggles and intensity tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub visual: VisualConfig,
    pub haptic: HapticConfig,
    pub audible: AudibleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub enabled: bool,

    /// Severity -> `#rrggbb`
    pub colours: HashMap<Severity, String>,

    pub flash_ms: u64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            colours: HashMap::from([
                (Severity::Critical, "#ef4444".to_string()),
                (Severity::High, "#f97316".to_string()),
                (Severity::Medium, "#eab308".to_string()),
                (Severity::Low, "#22c55e".to_string()),
            ]),
            flash_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticConfig {
    pub enabled: bool,

    /// Severity -> on/off pattern in ms
    pub patterns: HashMap<Severity, Vec<u64>>,
}

impl Default for HapticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: HashMap::from([
                (Severity::Critical, vec![500, 100, 500, 100, 500, 100, 500]),
                (Severity::High, vec![300, 100, 300, 100, 300]),
                (Severity::Medium, vec![200, 100, 200]),
                (Severity::Low, vec![100]),
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudibleConfig {
    pub enabled: bool,

    /// Severity -> tone frequency in Hz
    pub frequencies: HashMap<Severity, f32>,

    pub tone_ms: u64,

    /// Output volume in [0, 1]
    pub volume: f32,
}

impl Default for AudibleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequencies: HashMap::from([
                (Severity::Critical, 800.0),
                (Severity::High, 600.0),
                (Severity::Medium, 400.0),
                (Severity::Low, 300.0),
            ]),
            tone_ms: 500,
            volume: 0.2,
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be positive".to_string()));
        }
        if self.capture_interval_ms == 0 {
            return Err(ConfigError::Invalid("capture_interval_ms must be positive".to_string()));
        }
        if self.classification_timeout_ms == 0 {
            return Err(ConfigError::Invalid("classification_timeout_ms must be positive".to_string()));
        }
        if self.max_pending_windows == 0 {
            return Err(ConfigError::Invalid("max_pending_windows must be positive".to_string()));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.activity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "activity_threshold {} outside [0, 1]",
                self.activity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence {} outside [0, 1]",
                self.min_confidence
            )));
        }
        if let Some(endpoint) = &self.remote_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::Invalid(format!("remote_endpoint '{}' is not an http(s) URL", endpoint)));
            }
        }
        Ok(())
    }

    pub fn classification_timeout(&self) -> Duration {
        Duration::from_millis(self.classification_timeout_ms)
    }

    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings {
            window_size: self.window_size,
            capture_interval: Duration::from_millis(self.capture_interval_ms),
            activity_threshold: self.activity_threshold,
            min_confidence: self.min_confidence,
            max_pending_windows: self.max_pending_windows,
        }
    }
}

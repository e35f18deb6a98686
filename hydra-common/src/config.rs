//! Configuration loading and resolution
//!
//! Config file resolution priority:
//! 1. Explicit path passed by the caller (highest priority)
//! 2. `HYDRA_CONFIG` environment variable
//! 3. `~/.config/hydra/config.toml`
//! 4. Compiled defaults (fallback, missing file is not an error)
//!
//! After the file is read, `HYDRA_VISION_API_KEY` and `HYDRA_LOG_LEVEL`
//! override the corresponding file values.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "HYDRA_CONFIG";
/// Environment variable overriding `vision.api_key`
pub const VISION_API_KEY_ENV: &str = "HYDRA_VISION_API_KEY";
/// Environment variable overriding `logging.level`
pub const LOG_LEVEL_ENV: &str = "HYDRA_LOG_LEVEL";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HydraConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub goal: GoalConfig,
    #[serde(default)]
    pub day: DayConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info", "hydra_engine=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Remote vision endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisionConfig {
    /// Chat-completion style endpoint URL
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,
    /// Multimodal model name sent in the request body
    #[serde(default = "default_vision_model")]
    pub model: String,
    /// Bearer token; remote estimation is disabled while unset
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request HTTP timeout
    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
    /// Client-side rate limit
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vision_endpoint(),
            model: default_vision_model(),
            api_key: None,
            timeout_secs: default_vision_timeout_secs(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl VisionConfig {
    /// Remote estimation is only attempted with a non-blank key
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimationConfig {
    /// Upper bound on how long a capture waits for the remote estimator
    #[serde(default = "default_remote_wait_ms")]
    pub remote_wait_ms: u64,
    /// Capacity assumed by the local classifier when the bottle size is unknown
    #[serde(default = "default_bottle_capacity_ml")]
    pub default_bottle_capacity_ml: f64,
    /// Directory holding `model_metadata.json` and `class_labels.json`
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            remote_wait_ms: default_remote_wait_ms(),
            default_bottle_capacity_ml: default_bottle_capacity_ml(),
            model_dir: None,
        }
    }
}

/// Fusion thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusionConfig {
    /// Remote result wins when its confidence is strictly above this
    #[serde(default = "default_confidence_threshold")]
    pub remote_min_confidence: f64,
    /// Fused results below this carry a low-confidence warning
    #[serde(default = "default_confidence_threshold")]
    pub low_confidence_threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            remote_min_confidence: default_confidence_threshold(),
            low_confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// Daily goal formula selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GoalConfig {
    #[serde(default)]
    pub policy: GoalPolicyName,
}

/// Named goal formula
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalPolicyName {
    /// Mifflin-St Jeor / Du Bois water balance
    #[default]
    Physiological,
    /// Legacy weight × 35 ml × activity multiplier
    WeightBased,
}

/// "Today" boundary configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DayConfig {
    /// Fixed UTC offset for local midnight; `None` uses the host timezone
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_vision_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vision_timeout_secs() -> u64 {
    30
}

fn default_requests_per_second() -> u32 {
    2
}

fn default_remote_wait_ms() -> u64 {
    8_000
}

fn default_bottle_capacity_ml() -> f64 {
    500.0
}

fn default_confidence_threshold() -> f64 {
    0.5
}

impl HydraConfig {
    /// Resolve and load configuration, falling back to defaults
    ///
    /// A missing config file logs a warning and yields defaults; a present but
    /// unparsable file is an error.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit_path) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                warn!("No config directory available, using compiled defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply `HYDRA_VISION_API_KEY` / `HYDRA_LOG_LEVEL`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(VISION_API_KEY_ENV) {
            if !key.trim().is_empty() {
                if self.vision.api_key.is_some() {
                    warn!("Vision API key found in both TOML and environment, using environment");
                }
                self.vision.api_key = Some(key);
            }
        }

        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("fusion.remote_min_confidence", self.fusion.remote_min_confidence),
            ("fusion.low_confidence_threshold", self.fusion.low_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.estimation.default_bottle_capacity_ml <= 0.0 {
            return Err(Error::Config(format!(
                "estimation.default_bottle_capacity_ml must be positive, got {}",
                self.estimation.default_bottle_capacity_ml
            )));
        }

        if self.vision.requests_per_second == 0 {
            return Err(Error::Config(
                "vision.requests_per_second must be at least 1".to_string(),
            ));
        }

        if let Some(offset) = self.day.utc_offset_minutes {
            if offset.abs() >= 24 * 60 {
                return Err(Error::Config(format!(
                    "day.utc_offset_minutes out of range: {}",
                    offset
                )));
            }
        }

        Ok(())
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))
    }
}

/// Pick the config file path following the priority order above
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path()
}

/// `~/.config/hydra/config.toml` (platform config dir)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hydra").join("config.toml"))
}

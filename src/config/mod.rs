//! Pipeline Configuration Module
//!
//! Provides pipeline configuration loaded from TOML files, replacing
//! hardcoded segmentation/training constants with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `MOTIONSENSE_CONFIG` environment variable (path to TOML file)
//! 2. `motionsense.toml` in the current working directory
//! 3. Built-in defaults (matching the original tuned values)
//!
//! The loaded config is validated once and then passed explicitly into each
//! pipeline component — there is no hidden global.

pub mod defaults;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Configuration loading/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-window feature normalization mode, applied independently to each
/// channel 5-tuple and to the SMA scalar using only that tuple's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    #[default]
    None,
    MinMax,
    ZScore,
    MaxAbs,
}

/// Which classifier family to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierKind {
    /// Margin classifier with a linear kernel over standardized features.
    Linear,
    /// 1-D convolutional network over raw (filtered) windows.
    #[default]
    Conv,
}

/// Window segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Samples per window (default 100, i.e. one second at 100 Hz).
    pub window_size: usize,
    /// Channel values per sample (accX..Z, gyroX..Z).
    pub n_channels: usize,
    /// Segmentation step. `None` means non-overlapping (step = window_size);
    /// `window_size / 2` gives the 50%-overlap variant.
    pub step: Option<usize>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: defaults::window_size(),
            n_channels: defaults::n_channels(),
            step: None,
        }
    }
}

impl WindowConfig {
    /// Effective segmentation step.
    pub fn effective_step(&self) -> usize {
        self.step.unwrap_or(self.window_size)
    }
}

/// Gravity-removal filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// EMA coefficient for the gravity estimate.
    pub gravity_alpha: f64,
    /// Whether windows are gravity-filtered before feature extraction /
    /// classification. Recorded in the artifact at train time so inference
    /// always matches training.
    pub apply_gravity_filter: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            gravity_alpha: defaults::gravity_alpha(),
            apply_gravity_filter: defaults::apply_gravity_filter(),
        }
    }
}

/// Feature extraction settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub normalization: Normalization,
}

/// Training settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub classifier: ClassifierKind,
    /// Fraction of the dataset used for training; the rest is validation.
    pub train_validation_split: f64,
    /// Seed for the reproducible shuffle behind the split.
    pub split_seed: u64,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Stop after this many non-improving validation epochs and roll back to
    /// the best checkpoint.
    pub early_stopping_patience: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierKind::default(),
            train_validation_split: defaults::train_validation_split(),
            split_seed: defaults::split_seed(),
            epochs: defaults::epochs(),
            batch_size: defaults::batch_size(),
            learning_rate: defaults::learning_rate(),
            early_stopping_patience: defaults::early_stopping_patience(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Per-request prediction timeout. On expiry the request is abandoned;
    /// nothing is partially mutated.
    pub predict_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: defaults::bind_addr(),
            predict_timeout_secs: defaults::predict_timeout_secs(),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub window: WindowConfig,
    pub filter: FilterConfig,
    pub features: FeatureConfig,
    pub training: TrainingConfig,
    pub server: ServerConfig,
}

impl PipelineConfig {
    /// Load configuration using the documented loading order, falling back to
    /// built-in defaults when no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("MOTIONSENSE_CONFIG") {
            info!(path = %path, "Loading config from MOTIONSENSE_CONFIG");
            return Self::from_file(&path);
        }

        let cwd_path = Path::new("motionsense.toml");
        if cwd_path.exists() {
            info!("Loading config from ./motionsense.toml");
            return Self::from_file(cwd_path);
        }

        info!("No config file found, using built-in defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a specific TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path_str.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path_str,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants. Called on every load path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be > 0".into()));
        }
        if self.window.n_channels == 0 {
            return Err(ConfigError::Invalid("n_channels must be > 0".into()));
        }
        if let Some(step) = self.window.step {
            if step == 0 {
                return Err(ConfigError::Invalid("step must be > 0".into()));
            }
            if step > self.window.window_size {
                warn!(
                    step,
                    window_size = self.window.window_size,
                    "step exceeds window_size; samples between windows will be discarded"
                );
            }
        }
        if !(0.0..=1.0).contains(&self.filter.gravity_alpha) {
            return Err(ConfigError::Invalid(format!(
                "gravity_alpha must be in [0, 1], got {}",
                self.filter.gravity_alpha
            )));
        }
        if !(0.0 < self.training.train_validation_split
            && self.training.train_validation_split < 1.0)
        {
            return Err(ConfigError::Invalid(format!(
                "train_validation_split must be in (0, 1), got {}",
                self.training.train_validation_split
            )));
        }
        if self.training.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.training.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid("learning_rate must be > 0".into()));
        }
        Ok(())
    }
}

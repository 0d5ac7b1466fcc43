//! # Configuration
//!
//! Run settings and the optional JSON config file.
//!
//! Layers, later wins: built-in defaults, `.hoteltune/config.json` (or an
//! explicit `--config` file), environment, command-line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth;
use crate::error::ConfigError;
use crate::judge::JudgeSettings;
use crate::models::{LlmProvider, ModelConfig, DEFAULT_JUDGE_MODEL, DEFAULT_LOCATION};
use crate::quality::RuleConfig;

pub const DEFAULT_CONFIG_PATH: &str = ".hoteltune/config.json";
pub const LOCATION_ENV: &str = "GOOGLE_CLOUD_LOCATION";

pub const DEFAULT_MIN_SCORE: u8 = 7;
pub const DEFAULT_BATCH_SIZE: usize = 12;
pub const DEFAULT_MAX_WORKERS: usize = 6;

pub const DEFAULT_SOURCE_MODEL: &str = "gemini-1.5-pro-002";
pub const DEFAULT_EPOCHS: u32 = 3;
pub const DEFAULT_LEARNING_RATE_MULTIPLIER: f64 = 1.0;
pub const DEFAULT_DISPLAY_NAME: &str = "hotel-service-assistant";
pub const DEFAULT_TUNING_LOCATION: &str = "asia-east2";
pub const DEFAULT_UPLOAD_PREFIX: &str = "hotel_tuning/";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Knobs for one filter run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Judge scores below this are dropped (1..=10)
    pub min_score: u8,
    pub batch_size: usize,
    /// Concurrent judge batches
    pub max_workers: usize,
    /// Only read this many valid entries
    pub sample_size: Option<usize>,
    /// Skip the judge stage entirely
    pub rules_only: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            sample_size: None,
            rules_only: false,
        }
    }
}

impl ProcessingConfig {
    /// Report every violation at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if !(1..=10).contains(&self.min_score) {
            problems.push(format!("min_score must be between 1 and 10, got {}", self.min_score));
        }
        if self.batch_size == 0 {
            problems.push("batch_size must be greater than 0".to_string());
        }
        if self.max_workers == 0 {
            problems.push("max_workers must be greater than 0".to_string());
        }
        if self.sample_size == Some(0) {
            problems.push("sample_size must be greater than 0".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

/// Everything needed to upload data and submit a tuning job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    pub project_id: String,
    pub location: String,
    pub bucket: String,
    pub train_path: PathBuf,
    pub validation_path: PathBuf,
    pub source_model: String,
    pub epochs: u32,
    pub learning_rate_multiplier: f64,
    pub display_name: String,
    /// Object-name prefix inside the bucket
    pub upload_prefix: String,
    /// Poll until the job ends
    pub wait: bool,
    pub poll_interval: Duration,
    pub poll_timeout: Option<Duration>,
    /// Ask the tuned endpoint a few sample questions after success
    pub smoke_test: bool,
}

impl TuningConfig {
    pub fn new(
        project_id: impl Into<String>,
        bucket: impl Into<String>,
        train_path: impl Into<PathBuf>,
        validation_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            location: DEFAULT_TUNING_LOCATION.to_string(),
            bucket: bucket.into(),
            train_path: train_path.into(),
            validation_path: validation_path.into(),
            source_model: DEFAULT_SOURCE_MODEL.to_string(),
            epochs: DEFAULT_EPOCHS,
            learning_rate_multiplier: DEFAULT_LEARNING_RATE_MULTIPLIER,
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            upload_prefix: DEFAULT_UPLOAD_PREFIX.to_string(),
            wait: true,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_timeout: None,
            smoke_test: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.project_id.trim().is_empty() {
            problems.push("project_id must not be empty".to_string());
        }
        if self.bucket.trim().is_empty() || self.bucket.starts_with("gs://") {
            problems.push(format!(
                "bucket must be a bare bucket name, got {:?}",
                self.bucket
            ));
        }
        if self.epochs == 0 {
            problems.push("epochs must be greater than 0".to_string());
        }
        if !(self.learning_rate_multiplier.is_finite() && self.learning_rate_multiplier > 0.0) {
            problems.push(format!(
                "learning_rate_multiplier must be positive, got {}",
                self.learning_rate_multiplier
            ));
        }
        if self.poll_interval.is_zero() {
            problems.push("poll_interval must be greater than 0".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Object name for a local file under the upload prefix
    pub fn object_name(&self, local: &Path) -> String {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset.jsonl".to_string());
        format!("{}{}", self.upload_prefix, file_name)
    }
}

/// Settings persisted in `.hoteltune/config.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<RuleConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuning_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_model: Option<String>,
}

impl PersistedConfig {
    /// Read a config file. A missing file is an empty config; a broken one is an error.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::File {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        serde_json::from_str(&content).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Overlay `other` on top of `self`; set fields in `other` win
    pub fn merge(&mut self, other: PersistedConfig) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            provider,
            model,
            base_url,
            project_id,
            location,
            credentials,
            min_score,
            batch_size,
            max_workers,
            rules,
            judge,
            system_instruction,
            bucket,
            tuning_location,
            source_model
        );
    }

    /// Settings taken from environment variables
    pub fn from_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            location: get(LOCATION_ENV),
            credentials: get(auth::CREDENTIALS_ENV).map(PathBuf::from),
            ..Self::default()
        }
    }

    /// Environment overrides whatever the file said
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.merge(Self::from_env(lookup));
    }

    pub fn processing_config(&self) -> ProcessingConfig {
        let defaults = ProcessingConfig::default();
        ProcessingConfig {
            min_score: self.min_score.unwrap_or(defaults.min_score),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            max_workers: self.max_workers.unwrap_or(defaults.max_workers),
            ..defaults
        }
    }

    pub fn provider(&self) -> Result<LlmProvider, ConfigError> {
        self.provider
            .as_deref()
            .map(str::parse)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Judge model settings without the project id, which needs credentials to resolve
    pub fn model_config(&self) -> Result<ModelConfig, ConfigError> {
        let mut config = ModelConfig::with_provider(
            self.provider()?,
            self.model.as_deref().unwrap_or(DEFAULT_JUDGE_MODEL),
        )
        .with_location(self.location.as_deref().unwrap_or(DEFAULT_LOCATION));
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        Ok(config)
    }
}

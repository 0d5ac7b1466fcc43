//! # Models
//!
//! Centralized configuration for the hosted Gemini model used as the quality
//! judge, and for the Vertex AI region/project it lives in.
//!
//! ## Providers
//! - Vertex AI (`vertex`) - bearer token, regional endpoint, needs a project id
//! - Gemini API (`gemini-api`) - `GEMINI_API_KEY`, global endpoint

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Default judge model
pub const DEFAULT_JUDGE_MODEL: &str = "gemini-2.5-flash";

/// Default Vertex AI region for generation calls
pub const DEFAULT_LOCATION: &str = "us-central1";

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Supported model hosting surfaces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LlmProvider {
    #[default]
    #[serde(rename = "vertex")]
    Vertex,
    #[serde(rename = "gemini-api")]
    GeminiApi,
}

impl LlmProvider {
    /// Display name for logs and reports
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Vertex => "Vertex AI",
            LlmProvider::GeminiApi => "Gemini API",
        }
    }

    /// Identifier accepted on the command line and in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Vertex => "vertex",
            LlmProvider::GeminiApi => "gemini-api",
        }
    }

    /// Whether calls are scoped to a cloud project and region
    pub fn requires_project(&self) -> bool {
        matches!(self, LlmProvider::Vertex)
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vertex" | "vertexai" | "vertex-ai" => Ok(LlmProvider::Vertex),
            "gemini-api" | "gemini" | "google-ai" => Ok(LlmProvider::GeminiApi),
            other => Err(ConfigError::Invalid(vec![format!(
                "unknown provider '{}' (expected vertex or gemini-api)",
                other
            )])),
        }
    }
}

/// Configuration for a generation model
///
/// `model` is either a publisher model id (`gemini-2.5-flash`) or a full
/// resource path (`projects/p/locations/l/endpoints/123`) for a tuned endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub model: String,
    /// Region for Vertex AI calls
    pub location: String,
    /// Resolved project id (Vertex AI only)
    pub project_id: Option<String>,
    /// Override for the API root, mostly for tests and proxies
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Vertex,
            model: DEFAULT_JUDGE_MODEL.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            project_id: None,
            base_url: None,
            temperature: 0.1,
            max_output_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

impl ModelConfig {
    /// Create a new model config with the default provider (Vertex AI)
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set base URL (for proxies and local fakes)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Root of the regional Vertex AI REST API
    pub fn vertex_api_root(&self) -> String {
        match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com/v1", self.location),
        }
    }

    /// Full `:generateContent` URL for this model
    pub fn generate_content_url(&self) -> Result<String, ConfigError> {
        match self.provider {
            LlmProvider::Vertex => {
                let root = self.vertex_api_root();
                if self.model.starts_with("projects/") {
                    return Ok(format!("{}/{}:generateContent", root, self.model));
                }
                let project = self
                    .project_id
                    .as_deref()
                    .ok_or(ConfigError::MissingProject)?;
                Ok(format!(
                    "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
                    root, project, self.location, self.model
                ))
            }
            LlmProvider::GeminiApi => {
                let root = self
                    .base_url
                    .as_deref()
                    .unwrap_or(GEMINI_API_BASE)
                    .trim_end_matches('/');
                Ok(format!(
                    "{}/v1beta/models/{}:generateContent",
                    root, self.model
                ))
            }
        }
    }

    /// Summary recorded in quality reports
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.provider.display_name().to_string(),
            model: self.model.clone(),
            project_id: self.project_id.clone(),
            location: self.provider.requires_project().then(|| self.location.clone()),
        }
    }
}

/// Which model produced the judgements
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    pub project_id: Option<String>,
    pub location: Option<String>,
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::LlmClient;
use crate::auth::{self, TokenProvider};
use crate::dataset::{Content, ROLE_USER};
use crate::error::{ApiError, ConfigError};
use crate::http;
use crate::models::{LlmProvider, ModelConfig, ModelInfo};

enum GeminiAuth {
    Bearer(Arc<dyn TokenProvider>),
    ApiKey(String),
}

/// generateContent client for Vertex AI and the Gemini API
pub struct GeminiClient {
    http: reqwest::Client,
    config: ModelConfig,
    url: String,
    auth: GeminiAuth,
}

impl GeminiClient {
    /// Vertex AI client authenticated with bearer tokens
    pub fn vertex(config: ModelConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, ConfigError> {
        Self::build(config, GeminiAuth::Bearer(tokens))
    }

    /// Gemini API client authenticated with an API key
    pub fn gemini_api(config: ModelConfig, api_key: impl Into<String>) -> Result<Self, ConfigError> {
        Self::build(config, GeminiAuth::ApiKey(api_key.into()))
    }

    /// Build a client for the configured provider, reading credentials from the environment
    pub fn from_config(config: ModelConfig, credentials_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config.provider {
            LlmProvider::Vertex => {
                let tokens = auth::token_provider(credentials_path);
                Self::vertex(config, tokens)
            }
            LlmProvider::GeminiApi => {
                let key = std::env::var(auth::API_KEY_ENV)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or(ConfigError::MissingApiKey)?;
                Self::gemini_api(config, key)
            }
        }
    }

    fn build(config: ModelConfig, auth: GeminiAuth) -> Result<Self, ConfigError> {
        let url = config.generate_content_url()?;
        let http = http::build_client(config.timeout_secs)?;
        tracing::debug!(provider = %config.provider, model = %config.model, "gemini client ready");
        Ok(Self {
            http,
            config,
            url,
            auth,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Concatenate the text parts of the first candidate
fn response_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
        let body = GenerateContentRequest {
            contents: vec![Content::text(ROLE_USER, prompt)],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let request = match &self.auth {
            GeminiAuth::Bearer(tokens) => {
                let token = tokens.access_token().await?;
                self.http.post(&self.url).bearer_auth(token)
            }
            GeminiAuth::ApiKey(key) => self.http.post(&self.url).header(http::API_KEY_HEADER, key),
        };

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(http::map_send_error)?;
        let response = http::check_status(response).await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(http::map_body_error)?;

        response_text(parsed).ok_or(ApiError::EmptyResponse)
    }

    fn model_info(&self) -> ModelInfo {
        self.config.info()
    }
}

//! # LLM Clients
//!
//! A thin text-in/text-out seam over hosted Gemini models. The judge scores
//! batches through it and the tuning workflow smoke-tests tuned endpoints
//! through it.

pub mod gemini;
pub mod scripted;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::ModelInfo;

pub use gemini::GeminiClient;
pub use scripted::ScriptedLlm;

/// Something that turns a prompt into text
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ApiError>;

    /// Which model answers, for reports and logs
    fn model_info(&self) -> ModelInfo;
}

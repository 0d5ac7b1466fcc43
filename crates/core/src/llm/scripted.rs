//! In-memory stand-in for a hosted model, used by tests and dry runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::LlmClient;
use crate::error::ApiError;
use crate::models::ModelInfo;

type Responder = Box<dyn Fn(&str) -> Result<String, ApiError> + Send + Sync>;

/// Replays queued responses, then falls back to a responder closure
pub struct ScriptedLlm {
    queue: Mutex<VecDeque<Result<String, ApiError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    /// Answers with `responses` in order; errors once they run out
    pub fn new(responses: Vec<Result<String, ApiError>>) -> Self {
        Self {
            queue: Mutex::new(responses.into()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers every prompt with `responder`
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, ApiError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt seen so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match (queued, &self.responder) {
            (Some(response), _) => response,
            (None, Some(responder)) => responder(prompt),
            (None, None) => Err(ApiError::EmptyResponse),
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "scripted".to_string(),
            model: "scripted-judge".to_string(),
            project_id: None,
            location: None,
        }
    }
}

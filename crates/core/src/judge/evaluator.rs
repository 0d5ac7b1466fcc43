use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::parse::{parse_judge_response, JudgeVerdict};
use super::prompt::build_evaluation_prompt;
use crate::dataset::QaPair;
use crate::error::{ApiError, JudgeError};
use crate::llm::LlmClient;

/// Retry policy for judge calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeSettings {
    /// Extra attempts after a transient API error
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub retry_backoff_ms: u64,
    /// Fresh requests after an unparseable response
    pub parse_retries: u32,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_backoff_ms: 2000,
            parse_retries: 1,
        }
    }
}

impl JudgeSettings {
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// The judge's decision for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// None when the response could not be parsed or had no verdict for this entry
    pub score: Option<u8>,
    pub keep: bool,
    pub reason: String,
}

impl Evaluation {
    fn rejected(reason: String) -> Self {
        Self {
            score: None,
            keep: false,
            reason,
        }
    }
}

/// Scores batches of question/answer pairs through an [`LlmClient`]
pub struct JudgeEvaluator {
    client: Arc<dyn LlmClient>,
    settings: JudgeSettings,
    min_score: u8,
}

impl JudgeEvaluator {
    pub fn new(client: Arc<dyn LlmClient>, settings: JudgeSettings, min_score: u8) -> Self {
        Self {
            client,
            settings,
            min_score,
        }
    }

    /// Score one batch. Results keep the indices and order of `entries`.
    pub async fn evaluate_batch(
        &self,
        batch_id: usize,
        entries: &[(usize, QaPair)],
    ) -> Result<Vec<(usize, Evaluation)>, JudgeError> {
        let pairs: Vec<&QaPair> = entries.iter().map(|(_, pair)| pair).collect();
        let prompt = build_evaluation_prompt(&pairs, self.min_score);

        let mut parse_attempts = 0;
        let verdicts = loop {
            let parsed = match self.generate_with_retry(batch_id, &prompt).await? {
                Some(text) => parse_judge_response(&text, entries.len()).map_err(|e| e.to_string()),
                None => Err("model returned no text".to_string()),
            };
            match parsed {
                Ok(verdicts) => break Some(verdicts),
                Err(e) if parse_attempts < self.settings.parse_retries => {
                    parse_attempts += 1;
                    tracing::warn!(batch_id, error = %e, "unparseable judge response, asking again");
                }
                Err(e) => {
                    tracing::warn!(batch_id, error = %e, "judge response still unparseable, rejecting batch");
                    break None;
                }
            }
        };

        let evaluations = match verdicts {
            Some(verdicts) => entries
                .iter()
                .zip(verdicts)
                .map(|((index, _), verdict)| (*index, evaluation_for(batch_id, verdict)))
                .collect(),
            None => entries
                .iter()
                .map(|(index, _)| {
                    (
                        *index,
                        Evaluation::rejected(format!("评估解析失败-批次{}", batch_id)),
                    )
                })
                .collect(),
        };

        Ok(evaluations)
    }

    /// `None` when the model answered without any text (blocked or empty candidate).
    async fn generate_with_retry(&self, batch_id: usize, prompt: &str) -> Result<Option<String>, JudgeError> {
        let mut attempt = 0;
        loop {
            match self.client.generate(prompt).await {
                Ok(text) => return Ok(Some(text)),
                Err(ApiError::EmptyResponse) => return Ok(None),
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    let delay = self.settings.backoff(attempt);
                    tracing::warn!(
                        batch_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient judge error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => return Err(api_error(batch_id, source)),
            }
        }
    }
}

fn api_error(batch_id: usize, source: ApiError) -> JudgeError {
    tracing::error!(batch_id, error = %source, "judge call failed");
    JudgeError::Api { batch_id, source }
}

fn evaluation_for(batch_id: usize, verdict: JudgeVerdict) -> Evaluation {
    match verdict {
        JudgeVerdict::Scored { score, keep } => Evaluation {
            score: Some(score),
            keep,
            reason: format!("AI评估-批次{}(分数:{})", batch_id, score),
        },
        JudgeVerdict::Missing => Evaluation::rejected(format!("缺少评估结果-批次{}", batch_id)),
    }
}

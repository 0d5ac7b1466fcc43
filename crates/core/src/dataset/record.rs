use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecordError;

pub const ROLE_USER: &str = "user";
pub const ROLE_MODEL: &str = "model";
pub const ROLE_SYSTEM: &str = "system";

/// Key pairs accepted for flat `{question, answer}` style records
const FLAT_KEYS: &[(&str, &str)] = &[
    ("question", "answer"),
    ("input_text", "output_text"),
    ("input", "output"),
];

/// A single customer-service question and its answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    pub fn trimmed(&self) -> Self {
        Self::new(self.question.trim(), self.answer.trim())
    }
}

/// Extract the pair from a raw JSONL entry.
///
/// Contents-shaped entries use the first text part of the first two turns;
/// flat entries use one of the known key pairs.
pub fn extract_pair(entry: &Value) -> Result<QaPair, RecordError> {
    if let Some(contents) = entry.get("contents") {
        let turns = contents
            .as_array()
            .ok_or(RecordError::MissingContents { found: 0 })?;
        if turns.len() < 2 {
            return Err(RecordError::MissingContents { found: turns.len() });
        }
        let question =
            first_part_text(&turns[0]).ok_or(RecordError::MissingText { index: 0 })?;
        let answer = first_part_text(&turns[1]).ok_or(RecordError::MissingText { index: 1 })?;
        return Ok(QaPair::new(question, answer));
    }

    FLAT_KEYS
        .iter()
        .find_map(|(q_key, a_key)| {
            let question = entry.get(*q_key)?.as_str()?;
            let answer = entry.get(*a_key)?.as_str()?;
            Some(QaPair::new(question, answer))
        })
        .ok_or(RecordError::UnsupportedShape)
}

fn first_part_text(turn: &Value) -> Option<&str> {
    turn.get("parts")?.get(0)?.get("text")?.as_str()
}

/// One text part of a conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// A conversation turn, as used by both generateContent and tuning datasets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// The training-record shape expected by supervised tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningRecord {
    pub system_instruction: Content,
    pub contents: Vec<Content>,
}

impl TuningRecord {
    pub fn new(system_instruction: &str, pair: &QaPair) -> Self {
        Self {
            system_instruction: Content::text(ROLE_SYSTEM, system_instruction),
            contents: vec![
                Content::text(ROLE_USER, pair.question.clone()),
                Content::text(ROLE_MODEL, pair.answer.clone()),
            ],
        }
    }
}

//! Reshape accepted question/answer pairs into tuning records.

use serde_json::Value;
use std::path::Path;

use crate::dataset::{extract_pair, load_jsonl, validate_tuning_file, write_jsonl, TuningRecord};
use crate::error::{RecordError, ValidationError};

/// Persona used when an entry brings no instruction of its own
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "你是一名专业的酒店客服助手，熟悉前台接待、客房服务、餐饮与会议安排等酒店业务。请用礼貌、准确、实用的中文回答客人和员工的问题。";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub system_instruction: String,
    /// Prefer an entry's own `systemInstruction` text when it has one
    pub keep_existing_instruction: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            keep_existing_instruction: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertStats {
    pub converted: usize,
    /// Malformed entries plus lines that were not JSON
    pub skipped: usize,
}

fn existing_instruction(entry: &Value) -> Option<&str> {
    entry
        .pointer("/systemInstruction/parts/0/text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Build a tuning record from a raw entry of either supported shape
pub fn convert_entry(entry: &Value, options: &ConvertOptions) -> Result<TuningRecord, RecordError> {
    let pair = extract_pair(entry)?.trimmed();
    if pair.question.is_empty() {
        return Err(RecordError::MissingText { index: 0 });
    }
    if pair.answer.is_empty() {
        return Err(RecordError::MissingText { index: 1 });
    }

    let instruction = existing_instruction(entry)
        .filter(|_| options.keep_existing_instruction)
        .unwrap_or(&options.system_instruction);

    Ok(TuningRecord::new(instruction, &pair))
}

/// Convert a whole file and check the result is valid tuning input
pub async fn convert_file(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<ConvertStats, ValidationError> {
    let loaded = load_jsonl(input, None).await?;
    let mut stats = ConvertStats {
        skipped: loaded.skipped_lines.len(),
        ..ConvertStats::default()
    };

    let mut records = Vec::with_capacity(loaded.entries.len());
    for (index, entry) in loaded.entries.iter().enumerate() {
        match convert_entry(entry, options) {
            Ok(record) => records.push(record),
            Err(e) => {
                stats.skipped += 1;
                tracing::warn!(entry = index + 1, error = %e, "skipping entry");
            }
        }
    }

    stats.converted = write_jsonl(output, &records).await?;
    validate_tuning_file(output).await?;

    tracing::info!(
        converted = stats.converted,
        skipped = stats.skipped,
        output = %output.display(),
        "conversion finished"
    );
    Ok(stats)
}

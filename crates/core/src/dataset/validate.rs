//! Structural checks for tuning-format JSONL files before upload.

use serde_json::Value;
use std::path::Path;
use tokio::fs;

use super::record::{ROLE_MODEL, ROLE_SYSTEM, ROLE_USER};
use crate::error::{DatasetError, LineIssue, ValidationError};

/// Check one parsed line against the tuning-record shape
pub fn validate_tuning_record(record: &Value) -> Result<(), LineIssue> {
    let (Some(system), Some(contents)) = (record.get("systemInstruction"), record.get("contents"))
    else {
        return Err(LineIssue::MissingFields);
    };

    if system.get("role").and_then(Value::as_str) != Some(ROLE_SYSTEM) || system.get("parts").is_none()
    {
        return Err(LineIssue::BadSystemInstruction);
    }

    let turns = contents.as_array().ok_or(LineIssue::IncompleteContents)?;
    if turns.len() < 2 {
        return Err(LineIssue::IncompleteContents);
    }

    let role = |i: usize| turns[i].get("role").and_then(Value::as_str);
    if role(0) != Some(ROLE_USER) || role(1) != Some(ROLE_MODEL) {
        return Err(LineIssue::WrongRoles);
    }

    Ok(())
}

/// Validate every non-blank line; returns the record count.
///
/// Stops at the first bad line.
pub async fn validate_tuning_file(path: &Path) -> Result<usize, ValidationError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let mut count = 0;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let line_error = |issue| ValidationError::Line {
            path: path.to_path_buf(),
            line: index + 1,
            issue,
        };

        let record: Value = serde_json::from_str(line)
            .map_err(|e| line_error(LineIssue::InvalidJson(e.to_string())))?;
        validate_tuning_record(&record).map_err(line_error)?;
        count += 1;
    }

    tracing::info!(path = %path.display(), records = count, "tuning file validated");
    Ok(count)
}

//! # JSONL I/O
//!
//! Loading and writing line-delimited JSON files.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::DatasetError;

/// Entries read from a JSONL file, in file order
#[derive(Debug, Clone, Default)]
pub struct LoadedDataset {
    pub entries: Vec<Value>,
    /// 1-based line numbers that were not valid JSON
    pub skipped_lines: Vec<usize>,
}

/// Read a JSONL file, skipping blank and malformed lines.
///
/// With `sample_size`, reading stops once that many entries were collected.
pub async fn load_jsonl(path: &Path, sample_size: Option<usize>) -> Result<LoadedDataset, DatasetError> {
    let read_err = |source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = fs::File::open(path).await.map_err(read_err)?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut dataset = LoadedDataset::default();
    let mut line_number = 0usize;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await.map_err(read_err)? == 0 {
            break;
        }
        line_number += 1;

        let parsed = std::str::from_utf8(&line)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    serde_json::from_str::<Value>(trimmed)
                        .map(Some)
                        .map_err(|e| e.to_string())
                }
            });

        match parsed {
            Ok(Some(entry)) => dataset.entries.push(entry),
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(line = line_number, "skipping invalid JSON line: {}", e);
                dataset.skipped_lines.push(line_number);
                continue;
            }
        }

        if let Some(limit) = sample_size {
            if dataset.entries.len() >= limit {
                tracing::info!("using a sample of {} entries", limit);
                break;
            }
        }
    }

    tracing::info!(
        path = %path.display(),
        entries = dataset.entries.len(),
        skipped = dataset.skipped_lines.len(),
        "loaded dataset"
    );
    Ok(dataset)
}

/// Write one compact JSON object per line. Parent directories are created.
pub async fn write_jsonl<T, I>(path: &Path, records: I) -> Result<usize, DatasetError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut buffer = String::new();
    let mut count = 0;
    for record in records {
        buffer.push_str(&serde_json::to_string(&record)?);
        buffer.push('\n');
        count += 1;
    }

    write_file(path, buffer.as_bytes()).await?;
    Ok(count)
}

/// Write a file, creating parent directories first
pub async fn write_file(path: &Path, content: &[u8]) -> Result<(), DatasetError> {
    let write_err = |source| DatasetError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }
    fs::write(path, content).await.map_err(write_err)
}

/// Where the quality report for a filtered output file goes
///
/// `out/filtered.jsonl` -> `out/filtered_quality_report.json`
pub fn report_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}_quality_report.json", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_path() {
        assert_eq!(
            report_path_for(Path::new("dataset/processed/filtered.jsonl")),
            PathBuf::from("dataset/processed/filtered_quality_report.json")
        );
        assert_eq!(
            report_path_for(Path::new("out.txt")),
            PathBuf::from("out_quality_report.json")
        );
    }

    #[tokio::test]
    async fn test_load_skips_bad_lines_and_honours_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.jsonl");
        std::fs::write(
            &path,
            "{\"a\":1}\nnot json\n\n{\"a\":2}\n{\"a\":3}\n",
        )
        .unwrap();

        let all = load_jsonl(&path, None).await.unwrap();
        assert_eq!(all.entries.len(), 3);
        assert_eq!(all.skipped_lines, vec![2]);

        let sample = load_jsonl(&path, Some(2)).await.unwrap();
        assert_eq!(sample.entries, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[tokio::test]
    async fn test_load_skips_invalid_utf8_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.jsonl");
        std::fs::write(&path, b"{\"a\":1}\n{\"a\":\"\xff\xfe\"}\n{\"a\":3}\n").unwrap();

        let loaded = load_jsonl(&path, None).await.unwrap();
        assert_eq!(loaded.entries, vec![json!({"a": 1}), json!({"a": 3})]);
        assert_eq!(loaded.skipped_lines, vec![2]);
    }

    #[tokio::test]
    async fn test_write_keeps_unicode_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.jsonl");

        let count = write_jsonl(&path, [json!({"q": "酒店"}), json!({"q": "客房"})])
            .await
            .unwrap();
        assert_eq!(count, 2);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "{\"q\":\"酒店\"}\n{\"q\":\"客房\"}\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let err = load_jsonl(Path::new("/nonexistent/raw.jsonl"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Read { .. }));
    }
}

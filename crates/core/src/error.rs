//! # Errors
//!
//! One `thiserror` enum per concern. Every error can be bucketed into an
//! [`ErrorKind`] so callers can decide between skipping, retrying and aborting.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::quality::QualityReport;

/// Coarse classification of every failure the workflow can hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input data (malformed record, invalid file). Skip or fix the data.
    Input,
    /// The hosted API hiccuped (rate limit, 5xx, timeout). Retrying may help.
    TransientApi,
    /// Missing credentials, invalid settings, rejected requests. Retrying won't help.
    FatalConfig,
}

impl ErrorKind {
    /// What the operator should do next
    pub fn hint(self) -> &'static str {
        match self {
            ErrorKind::Input => "check the input files",
            ErrorKind::TransientApi => "the API is busy or unreachable; try again later",
            ErrorKind::FatalConfig => "check credentials, project and settings",
        }
    }
}

/// A raw JSONL entry could not be turned into a question/answer pair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected at least 2 contents entries, found {found}")]
    MissingContents { found: usize },

    #[error("contents[{index}] has no text part")]
    MissingText { index: usize },

    #[error("entry is neither a contents record nor a question/answer object")]
    UnsupportedShape,
}

/// File-level I/O failures for datasets and reports.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What is wrong with a single line of a tuning-format file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineIssue {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing systemInstruction or contents")]
    MissingFields,

    #[error("systemInstruction must have role \"system\" and parts")]
    BadSystemInstruction,

    #[error("contents must hold at least a user and a model turn")]
    IncompleteContents,

    #[error("contents roles must be user then model")]
    WrongRoles,
}

/// A tuning-format file failed validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("{path}, line {line}: {issue}")]
    Line {
        path: PathBuf,
        line: usize,
        issue: LineIssue,
    },
}

/// Settings or credentials are unusable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid settings: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("no project id: pass --project-id, use a service-account file, or set GOOGLE_CLOUD_PROJECT")]
    MissingProject,

    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("credentials file {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },

    #[error("config file {path}: {reason}")]
    File { path: PathBuf, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Errors from the hosted model, tuning or storage REST APIs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("transient API failure: {0}")]
    Transient(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model returned no text")]
    EmptyResponse,

    #[error("failed to decode API response: {0}")]
    Decode(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_transient() {
            ErrorKind::TransientApi
        } else {
            ErrorKind::FatalConfig
        }
    }
}

/// A judge batch could not be scored.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("batch {batch_id}: {source}")]
    Api {
        batch_id: usize,
        #[source]
        source: ApiError,
    },

    #[error("batch {batch_id} was cancelled")]
    Cancelled { batch_id: usize },
}

/// The two-stage filter stopped before writing its output.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("{0} contains no usable records")]
    EmptyInput(PathBuf),

    #[error("no record passed the rule filter ({} examined)", .report.summary.total_entries)]
    NothingPassedRules { report: Box<QualityReport> },

    #[error("judge stage failed: {0}")]
    Judge(#[from] JudgeError),

    #[error("judge worker failed: {0}")]
    Worker(String),
}

impl FilterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FilterError::Config(_) | FilterError::Worker(_) => ErrorKind::FatalConfig,
            FilterError::Dataset(_)
            | FilterError::EmptyInput(_)
            | FilterError::NothingPassedRules { .. } => ErrorKind::Input,
            FilterError::Judge(JudgeError::Api { source, .. }) => source.kind(),
            FilterError::Judge(JudgeError::Cancelled { .. }) => ErrorKind::FatalConfig,
        }
    }
}

/// The fine-tuning workflow failed.
#[derive(Error, Debug)]
pub enum TuningError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("bucket gs://{0} does not exist or is not accessible")]
    BucketUnavailable(String),

    #[error("tuning job {name} ended in state {state}: {message}")]
    JobFailed {
        name: String,
        state: String,
        message: String,
    },

    #[error("tuning job {name} still running after {elapsed:?}")]
    Timeout { name: String, elapsed: Duration },
}

impl TuningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TuningError::Validation(_) | TuningError::Dataset(_) => ErrorKind::Input,
            TuningError::Api(api) => api.kind(),
            TuningError::Timeout { .. } => ErrorKind::TransientApi,
            TuningError::Config(_)
            | TuningError::BucketUnavailable(_)
            | TuningError::JobFailed { .. } => ErrorKind::FatalConfig,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_kinds() {
        assert_eq!(
            ApiError::Transient("503".into()).kind(),
            ErrorKind::TransientApi
        );
        assert_eq!(
            ApiError::Status {
                status: 400,
                body: "bad".into()
            }
            .kind(),
            ErrorKind::FatalConfig
        );
    }

    #[test]
    fn test_filter_error_kind_follows_api_error() {
        let err = FilterError::Judge(JudgeError::Api {
            batch_id: 3,
            source: ApiError::Transient("timeout".into()),
        });
        assert_eq!(err.kind(), ErrorKind::TransientApi);
        assert!(err.to_string().contains("batch 3"));
    }

    #[test]
    fn test_invalid_config_lists_every_violation() {
        let err = ConfigError::Invalid(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "invalid settings: a; b");
    }
}

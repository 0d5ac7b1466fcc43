use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::auth::TokenProvider;
use crate::error::{ApiError, ConfigError};
use crate::http;

const API_TIMEOUT_SECS: u64 = 60;

/// Lifecycle state of a tuning job (`JOB_STATE_*` on the wire)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TuningJobState {
    #[default]
    Unspecified,
    Queued,
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelling,
    Cancelled,
    Paused,
    Expired,
    Updating,
    PartiallySucceeded,
}

impl TuningJobState {
    /// Unknown strings map to `Unspecified`
    pub fn parse(s: &str) -> Self {
        match s {
            "JOB_STATE_QUEUED" => Self::Queued,
            "JOB_STATE_PENDING" => Self::Pending,
            "JOB_STATE_RUNNING" => Self::Running,
            "JOB_STATE_SUCCEEDED" => Self::Succeeded,
            "JOB_STATE_FAILED" => Self::Failed,
            "JOB_STATE_CANCELLING" => Self::Cancelling,
            "JOB_STATE_CANCELLED" => Self::Cancelled,
            "JOB_STATE_PAUSED" => Self::Paused,
            "JOB_STATE_EXPIRED" => Self::Expired,
            "JOB_STATE_UPDATING" => Self::Updating,
            "JOB_STATE_PARTIALLY_SUCCEEDED" => Self::PartiallySucceeded,
            _ => Self::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "JOB_STATE_UNSPECIFIED",
            Self::Queued => "JOB_STATE_QUEUED",
            Self::Pending => "JOB_STATE_PENDING",
            Self::Running => "JOB_STATE_RUNNING",
            Self::Succeeded => "JOB_STATE_SUCCEEDED",
            Self::Failed => "JOB_STATE_FAILED",
            Self::Cancelling => "JOB_STATE_CANCELLING",
            Self::Cancelled => "JOB_STATE_CANCELLED",
            Self::Paused => "JOB_STATE_PAUSED",
            Self::Expired => "JOB_STATE_EXPIRED",
            Self::Updating => "JOB_STATE_UPDATING",
            Self::PartiallySucceeded => "JOB_STATE_PARTIALLY_SUCCEEDED",
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::Failed
                | Self::Cancelled
                | Self::Expired
                | Self::PartiallySucceeded
        )
    }

    /// Ended with a usable tuned model
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallySucceeded)
    }
}

impl fmt::Display for TuningJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TuningJobState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TuningJobState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunedModel {
    /// Model resource name
    #[serde(default)]
    pub model: String,
    /// Endpoint resource name serving the tuned model
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: String,
}

/// The subset of the tuningJobs resource we read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningJob {
    pub name: String,
    #[serde(default)]
    pub state: TuningJobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuned_model_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuned_model: Option<TunedModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

impl TuningJob {
    /// Endpoint of the tuned model, once there is one
    pub fn endpoint(&self) -> Option<&str> {
        self.tuned_model
            .as_ref()
            .map(|m| m.endpoint.as_str())
            .filter(|e| !e.is_empty())
    }

    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .map(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "no error details reported".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HyperParameters {
    pub epoch_count: u32,
    pub learning_rate_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisedTuningSpec {
    pub training_dataset_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_dataset_uri: Option<String>,
    pub hyper_parameters: HyperParameters,
}

/// Body of `POST .../tuningJobs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningJobRequest {
    pub base_model: String,
    pub tuned_model_display_name: String,
    pub supervised_tuning_spec: SupervisedTuningSpec,
}

/// Create and inspect tuning jobs
#[async_trait]
pub trait TuningApi: Send + Sync {
    async fn create(&self, request: &TuningJobRequest) -> Result<TuningJob, ApiError>;

    /// `name` is a full resource name or a bare job id
    async fn get(&self, name: &str) -> Result<TuningJob, ApiError>;
}

/// Regional Vertex AI tuningJobs REST client
pub struct VertexTuningApi {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    project_id: String,
    location: String,
    base_url: Option<String>,
}

impl VertexTuningApi {
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            http: http::build_client(API_TIMEOUT_SECS)?,
            tokens,
            project_id: project_id.into(),
            location: location.into(),
            base_url: None,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn root(&self) -> String {
        match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com/v1", self.location),
        }
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/projects/{}/locations/{}/tuningJobs",
            self.root(),
            self.project_id,
            self.location
        )
    }

    fn job_url(&self, name: &str) -> String {
        if name.starts_with("projects/") {
            format!("{}/{}", self.root(), name)
        } else {
            format!("{}/{}", self.collection_url(), name)
        }
    }

    async fn decode(response: reqwest::Response) -> Result<TuningJob, ApiError> {
        let response = http::check_status(response).await?;
        response
            .json()
            .await
            .map_err(http::map_body_error)
    }
}

#[async_trait]
impl TuningApi for VertexTuningApi {
    async fn create(&self, request: &TuningJobRequest) -> Result<TuningJob, ApiError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(self.collection_url())
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(http::map_send_error)?;
        let job = Self::decode(response).await?;
        tracing::info!(job = %job.name, state = %job.state, "tuning job submitted");
        Ok(job)
    }

    async fn get(&self, name: &str) -> Result<TuningJob, ApiError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(self.job_url(name))
            .bearer_auth(token)
            .send()
            .await
            .map_err(http::map_send_error)?;
        Self::decode(response).await
    }
}

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;

use crate::auth::TokenProvider;
use crate::error::{ApiError, ConfigError};
use crate::http;

const STORAGE_API_BASE: &str = "https://storage.googleapis.com";
const UPLOAD_TIMEOUT_SECS: u64 = 600;

/// Bucket access needed by the tuning workflow
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ApiError>;

    /// Store `data` as `object` and return its `gs://` URI
    async fn upload(&self, data: Vec<u8>, bucket: &str, object: &str) -> Result<String, ApiError>;
}

pub fn gcs_uri(bucket: &str, object: &str) -> String {
    format!("gs://{}/{}", bucket, object)
}

/// Cloud Storage JSON API client
pub struct StorageClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
}

impl StorageClient {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Result<Self, ConfigError> {
        Ok(Self {
            http: http::build_client(UPLOAD_TIMEOUT_SECS)?,
            tokens,
            base_url: STORAGE_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/storage/v1/b/{}", self.base_url, bucket)
    }

    fn upload_url(&self, bucket: &str, object: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.base_url,
            bucket,
            urlencoding::encode(object)
        )
    }
}

#[async_trait]
impl ObjectStore for StorageClient {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ApiError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(self.bucket_url(bucket))
            .bearer_auth(token)
            .send()
            .await
            .map_err(http::map_send_error)?;

        // 403 means the bucket exists but we cannot use it
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            tracing::warn!(bucket, status = response.status().as_u16(), "bucket not accessible");
            return Ok(false);
        }
        http::check_status(response).await?;
        Ok(true)
    }

    async fn upload(&self, data: Vec<u8>, bucket: &str, object: &str) -> Result<String, ApiError> {
        let size = data.len();
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(self.upload_url(bucket, object))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/jsonl")
            .body(data)
            .send()
            .await
            .map_err(http::map_send_error)?;
        http::check_status(response).await?;

        let uri = gcs_uri(bucket, object);
        tracing::info!(uri = %uri, bytes = size, "uploaded");
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    fn client() -> StorageClient {
        StorageClient::new(Arc::new(StaticToken::new("t")))
            .unwrap()
            .with_base_url("http://localhost:9000/")
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.bucket_url("hotel-data"),
            "http://localhost:9000/storage/v1/b/hotel-data"
        );
        assert_eq!(
            client.upload_url("hotel-data", "hotel_tuning/train set.jsonl"),
            "http://localhost:9000/upload/storage/v1/b/hotel-data/o?uploadType=media&name=hotel_tuning%2Ftrain%20set.jsonl"
        );
    }

    #[test]
    fn test_gcs_uri() {
        assert_eq!(
            gcs_uri("hotel-data", "hotel_tuning/train.jsonl"),
            "gs://hotel-data/hotel_tuning/train.jsonl"
        );
    }
}

//! Shared reqwest plumbing for the Google REST surfaces.

use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::error::{ApiError, ConfigError};

pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Header carrying a Gemini API key; keeps the key out of request URLs.
pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";

/// Map a send failure: timeouts and connection resets are worth retrying.
///
/// The URL is stripped from the message so query parameters never reach logs.
pub(crate) fn map_send_error(err: reqwest::Error) -> ApiError {
    let transient = err.is_timeout() || err.is_connect() || err.is_request();
    let message = err.without_url().to_string();
    if transient {
        ApiError::Transient(message)
    } else {
        ApiError::Decode(message)
    }
}

/// Map a failure while reading or decoding a response body.
pub(crate) fn map_body_error(err: reqwest::Error) -> ApiError {
    let timed_out = err.is_timeout();
    let message = err.without_url().to_string();
    if timed_out {
        ApiError::Transient(message)
    } else {
        ApiError::Decode(message)
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Pass successful responses through, turn everything else into an [`ApiError`].
pub(crate) async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if is_retryable_status(status) {
        Err(ApiError::Transient(format!("{}: {}", status.as_u16(), body)))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(ApiError::Auth(format!("{}: {}", status.as_u16(), body)))
    } else {
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

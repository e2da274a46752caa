use pillar_db::repositories::RepositoryError;
use pillar_slack::SlackApiError;
use reqwest::Response;
use serde_json::Value;
use thiserror::Error;

use pillar_core::text::truncate_chars;

const ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },
    #[error("user `{user_id}` has not connected a Google account")]
    NotAuthenticated { user_id: String },
    #[error("{service} request failed: {message}")]
    Http { service: &'static str, message: String },
    #[error("{service} returned HTTP {status}: {body}")]
    Status { service: &'static str, status: u16, body: String },
    #[error("{service} response could not be decoded: {message}")]
    Decode { service: &'static str, message: String },
    #[error("text extraction failed: {0}")]
    Extraction(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Slack(#[from] SlackApiError),
}

impl IntegrationError {
    pub(crate) fn http(service: &'static str, error: reqwest::Error) -> Self {
        Self::Http { service, message: error.to_string() }
    }
}

/// Fails on non-2xx statuses, keeping the start of the body for the log line.
pub(crate) async fn read_json(
    service: &'static str,
    response: Response,
) -> Result<Value, IntegrationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IntegrationError::Status {
            service,
            status: status.as_u16(),
            body: truncate_chars(&body, ERROR_BODY_CHARS).to_string(),
        });
    }

    response
        .json()
        .await
        .map_err(|error| IntegrationError::Decode { service, message: error.to_string() })
}

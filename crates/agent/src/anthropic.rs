use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pillar_core::config::LlmConfig;
use pillar_core::text::truncate_chars;

use crate::llm::{ContentBlock, LlmClient, LlmError, ModelRequest, ModelResponse, ToolDefinition, Turn};

const API_VERSION: &str = "2023-06-01";
const ERROR_BODY_CHARS: usize = 500;

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl AnthropicClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Http(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(
            &config.base_url,
            config.api_key.clone(),
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [Turn],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, LlmError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: &request.turns,
            tools: &request.tools,
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Http(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "anthropic messages call failed");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: truncate_chars(&body, ERROR_BODY_CHARS).to_string(),
            });
        }

        let data: MessagesResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        debug!(
            model = %self.model,
            stop_reason = data.stop_reason.as_deref().unwrap_or("unknown"),
            blocks = data.content.len(),
            "anthropic messages call completed"
        );

        Ok(ModelResponse { content: data.content, stop_reason: data.stop_reason })
    }
}

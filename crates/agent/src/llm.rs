//! Model-facing types. Content blocks serialize in the Anthropic Messages
//! wire shape so the transcript can be sent as-is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Block kinds this client does not act on (thinking, server tools).
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentBlock::Text { text: text.into() }] }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        let content =
            content.into_iter().filter(|block| !matches!(block, ContentBlock::Unknown)).collect();
        Self { role: Role::Assistant, content }
    }

    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        let content = results
            .into_iter()
            .map(|result| ContentBlock::ToolResult {
                tool_use_id: result.tool_use_id,
                content: result.content,
            })
            .collect();
        Self { role: Role::User, content }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

impl ModelRequest {
    /// A single user prompt with no tools, as used by the content generators.
    pub fn prompt(text: impl Into<String>, max_tokens: u32) -> Self {
        Self { system: None, turns: vec![Turn::user_text(text)], tools: Vec::new(), max_tokens }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            stop_reason: Some("end_turn".to_string()),
        }
    }

    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some(ToolCall { id: id.clone(), name: name.clone(), input: input.clone() })
                }
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Http(String),
    #[error("model API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
    #[error("model returned no text")]
    EmptyResponse,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, LlmError>;

    /// One-shot prompt returning the first text block.
    async fn prompt(&self, text: String, max_tokens: u32) -> Result<String, LlmError> {
        let response = self.complete(ModelRequest::prompt(text, max_tokens)).await?;
        response.first_text().map(str::to_string).ok_or(LlmError::EmptyResponse)
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ContentBlock, ModelResponse, Turn};

    #[test]
    fn blocks_use_the_messages_wire_shape() {
        let turn = Turn::assistant(vec![
            ContentBlock::Text { text: "Let me look.".into() },
            ContentBlock::ToolUse { id: "tu_1".into(), name: "view_agenda".into(), input: json!({}) },
        ]);
        assert_eq!(
            serde_json::to_value(&turn).expect("serialize"),
            json!({
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Let me look."},
                    {"type": "tool_use", "id": "tu_1", "name": "view_agenda", "input": {}}
                ]
            })
        );
    }

    #[test]
    fn unknown_blocks_are_tolerated_and_dropped_from_history() {
        let content: Vec<ContentBlock> = serde_json::from_value(json!([
            {"type": "thinking", "thinking": "hmm", "signature": "abc"},
            {"type": "text", "text": "Done."}
        ]))
        .expect("deserialize");
        let response = ModelResponse { content, stop_reason: None };

        assert_eq!(response.first_text(), Some("Done."));
        assert_eq!(Turn::assistant(response.content).content.len(), 1);
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use pillar_db::repositories::RepositoryError;
use pillar_integrations::IntegrationError;
use pillar_slack::SlackApiError;

use crate::context::AgentContext;
use crate::llm::ToolDefinition;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Failed(String),
}

impl From<IntegrationError> for ToolError {
    fn from(error: IntegrationError) -> Self {
        Self::Failed(error.to_string())
    }
}

impl From<RepositoryError> for ToolError {
    fn from(error: RepositoryError) -> Self {
        Self::Failed(error.to_string())
    }
}

impl From<SlackApiError> for ToolError {
    fn from(error: SlackApiError) -> Self {
        Self::Failed(error.to_string())
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn definition(&self) -> ToolDefinition;

    /// Progress line shown to the user before the tool runs.
    fn status_message(&self, _input: &Value) -> String {
        "Working...".to_string()
    }

    async fn execute(&self, input: &Value, context: &mut AgentContext) -> Result<String, ToolError>;
}

/// Tools keyed by name. Definitions are reported in registration order so the
/// model always sees the same tool list.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order.iter().filter_map(|name| self.tools.get(name)).map(|tool| tool.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Optional string field; blank values count as missing.
pub(crate) fn string_input<'a>(input: &'a Value, field: &str) -> Option<&'a str> {
    input.get(field).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
}

use std::sync::Arc;

use async_trait::async_trait;
use tera::Context;
use tracing::{debug, info, warn};

use pillar_core::config::AgentConfig;
use pillar_core::text::truncate_chars;

use crate::content::PromptLibrary;
use crate::context::AgentContext;
use crate::llm::{LlmClient, ModelRequest, ToolCall, ToolResult, Turn};
use crate::tools::ToolRegistry;
use crate::AgentError;

const STEP_MAX_TOKENS: u32 = 4096;
const FINAL_ANSWER_MAX_TOKENS: u32 = 2000;
const FINAL_ANSWER_REQUEST: &str =
    "Please provide your final answer based on the information gathered so far.";
const NO_ANSWER: &str = "I couldn't find the information you need.";
const INCOMPLETE_ANSWER: &str =
    "I gathered some information but couldn't formulate a complete answer.";

/// Receives progress lines while tools run.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn status(&self, message: &str);
}

/// Bounded tool-use loop: the model either answers in plain text or asks for
/// tools, whose results are fed back until the step budget runs out.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptLibrary>,
    system_prompt: String,
    max_steps: u32,
    max_tool_result_chars: usize,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptLibrary>,
        config: &AgentConfig,
    ) -> Result<Self, AgentError> {
        let system_prompt = prompts.system_prompt()?;
        Ok(Self {
            llm,
            tools,
            prompts,
            system_prompt,
            max_steps: config.max_steps,
            max_tool_result_chars: config.max_tool_result_chars,
        })
    }

    pub async fn run(
        &self,
        request: &str,
        context: &mut AgentContext,
        status: Option<&dyn StatusSink>,
    ) -> Result<String, AgentError> {
        let mut opening = Context::new();
        opening.insert("context", &context.describe());
        opening.insert("request", request);
        let mut turns = vec![Turn::user_text(self.prompts.render("agent_request.txt", &opening)?)];

        for step in 0..self.max_steps {
            let response = self
                .llm
                .complete(ModelRequest {
                    system: Some(self.system_prompt.clone()),
                    turns: turns.clone(),
                    tools: self.tools.definitions(),
                    max_tokens: STEP_MAX_TOKENS,
                })
                .await?;

            let calls = response.tool_calls();
            if calls.is_empty() {
                debug!(step, channel_id = %context.channel_id, "agent answered without tools");
                return Ok(response.first_text().unwrap_or(NO_ANSWER).to_string());
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let content = self.execute(call, context, status).await;
                results.push(ToolResult { tool_use_id: call.id.clone(), content });
            }

            turns.push(Turn::assistant(response.content));
            turns.push(Turn::tool_results(results));
        }

        warn!(
            max_steps = self.max_steps,
            channel_id = %context.channel_id,
            "agent step budget exhausted, forcing a final answer"
        );
        turns.push(Turn::user_text(FINAL_ANSWER_REQUEST));
        let response = self
            .llm
            .complete(ModelRequest {
                system: Some(self.system_prompt.clone()),
                turns,
                tools: Vec::new(),
                max_tokens: FINAL_ANSWER_MAX_TOKENS,
            })
            .await?;

        Ok(response.first_text().unwrap_or(INCOMPLETE_ANSWER).to_string())
    }

    /// Runs one tool call. Failures become the tool result text so the loop
    /// can continue.
    async fn execute(
        &self,
        call: &ToolCall,
        context: &mut AgentContext,
        status: Option<&dyn StatusSink>,
    ) -> String {
        let tool = self.tools.get(&call.name);

        if let Some(sink) = status {
            let message = tool
                .map(|tool| tool.status_message(&call.input))
                .unwrap_or_else(|| "Working...".to_string());
            sink.status(&format!("_{message}_")).await;
        }

        let output = match tool {
            Some(tool) => match tool.execute(&call.input, context).await {
                Ok(output) => output,
                Err(error) => {
                    warn!(tool = %call.name, error = %error, "tool execution failed");
                    format!("Error: {error}")
                }
            },
            None => format!("Tool '{}' is not available.", call.name),
        };

        let content = truncate_chars(&output, self.max_tool_result_chars).to_string();
        info!(
            event_name = "agent.tool.executed",
            tool = %call.name,
            channel_id = %context.channel_id,
            user_id = %context.user_id,
            result_chars = content.chars().count(),
            "agent tool executed"
        );
        content
    }
}

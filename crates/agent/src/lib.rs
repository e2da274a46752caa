//! Model-facing side of Pillar.
//!
//! - `llm` / `anthropic`: the Messages API contract and its HTTP client
//! - `runtime`: the bounded tool-use loop behind every @mention
//! - `tools` / `executors`: the tools the model may call and their registry
//! - `context`: per-run state and the collaborators tools reach through it
//! - `content`: fixed prompts for summaries, agendas and LP letters
//! - `research`: web search synthesis
//!
//! The model never writes to storage directly. Every side effect goes
//! through a tool executor, and tool failures come back to the model as text.

use thiserror::Error;

pub mod anthropic;
pub mod content;
pub mod context;
pub mod executors;
pub mod llm;
pub mod research;
pub mod runtime;
pub mod tools;

pub use anthropic::AnthropicClient;
pub use content::{ContentGenerator, PromptLibrary, CATCHUP_CONTEXT};
pub use context::{AgentContext, AgentServices};
pub use executors::pillar_tools;
pub use llm::{LlmClient, LlmError, ModelRequest, ModelResponse};
pub use research::ResearchService;
pub use runtime::{AgentRuntime, StatusSink};
pub use tools::{Tool, ToolError, ToolRegistry};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("prompt template failed: {0}")]
    Template(#[from] tera::Error),
}

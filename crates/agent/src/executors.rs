//! The tools the assistant exposes to the model. Every tool reports problems
//! the user can act on as plain text; only collaborator failures surface as
//! [`ToolError`] and reach the model as `Error: ...`.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use pillar_core::domain::agenda::{group_by_category, AgendaCategory, NewAgendaItem};
use pillar_core::domain::chat::{ChatFile, ChatMessage};
use pillar_core::domain::portfolio::channel_name_for_company;
use pillar_core::text::{truncate_chars, truncate_with_marker};

use crate::context::AgentContext;
use crate::llm::ToolDefinition;
use crate::tools::{string_input, Tool, ToolError, ToolRegistry};

const DEFAULT_HISTORY_HOURS: u64 = 24;
const MAX_HISTORY_HOURS: u64 = 168;
const ATTACHED_FILE_CHARS: usize = 30_000;
const DOCUMENT_CHARS: usize = 50_000;

/// Registry holding every assistant tool, in the order the model sees them.
pub fn pillar_tools() -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(AddToAgenda);
    registry.register(ViewAgenda);
    registry.register(ReadFiles);
    registry.register(GetChannelHistory);
    registry.register(ReadFileByName);
    registry.register(FetchUrl);
    registry.register(SearchWeb);
    registry.register(GetPortfolioCompanyChannel);
    registry
}

fn definition(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn history_lines(messages: &[ChatMessage]) -> String {
    messages.iter().map(ChatMessage::history_line).collect::<Vec<_>>().join("\n")
}

fn requested_hours(input: &Value) -> u64 {
    let hours = input
        .get("hours")
        .and_then(|value| value.as_u64().or_else(|| value.as_f64().map(|hours| hours.max(0.0) as u64)))
        .unwrap_or(DEFAULT_HISTORY_HOURS);
    hours.clamp(1, MAX_HISTORY_HOURS)
}

pub struct AddToAgenda;

#[async_trait]
impl Tool for AddToAgenda {
    fn name(&self) -> &'static str {
        "add_to_agenda"
    }

    fn definition(&self) -> ToolDefinition {
        definition(
            self.name(),
            "Add an item to the Monday Investment Review meeting agenda. Use this when someone asks to add something to the agenda, or says 'agenda this', 'add to monday meeting', etc. The item will be stored and included in the next agenda document.",
            json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "The agenda item content - what should be discussed"
                    },
                    "category": {
                        "type": "string",
                        "enum": AgendaCategory::TOOL_VALUES,
                        "description": "Category for the agenda item"
                    }
                },
                "required": ["content", "category"]
            }),
        )
    }

    fn status_message(&self, _input: &Value) -> String {
        "Adding to Monday agenda...".to_string()
    }

    async fn execute(&self, input: &Value, context: &mut AgentContext) -> Result<String, ToolError> {
        let Some(content) = string_input(input, "content") else {
            return Ok("No content provided for the agenda item.".to_string());
        };
        let category = AgendaCategory::from_tool_value(string_input(input, "category").unwrap_or_default());

        let item = NewAgendaItem::new(&context.user_id, &context.channel_id, category, content)
            .map_err(|error| ToolError::InvalidInput(error.to_string()))?;
        let stored = context.services.agenda.add(item).await?;

        Ok(format!("Added to Monday agenda under '{}': {}", stored.category.label(), stored.content))
    }
}

pub struct ViewAgenda;

#[async_trait]
impl Tool for ViewAgenda {
    fn name(&self) -> &'static str {
        "view_agenda"
    }

    fn definition(&self) -> ToolDefinition {
        definition(
            self.name(),
            "View all pending items on the Monday Investment Review agenda. Use when someone asks to see the agenda, what's on the agenda, etc.",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    fn status_message(&self, _input: &Value) -> String {
        "Checking the agenda...".to_string()
    }

    async fn execute(&self, _input: &Value, context: &mut AgentContext) -> Result<String, ToolError> {
        let items = context.services.agenda.list_pending().await?;
        if items.is_empty() {
            return Ok("The Monday agenda is empty. No items have been added yet.".to_string());
        }

        let mut lines = vec!["Current Monday Investment Review Agenda:".to_string(), String::new()];
        for (category, bucket) in group_by_category(&items) {
            lines.push(format!("{}:", category.label()));
            lines.extend(bucket.iter().map(|item| format!("  - {}", item.content)));
            lines.push(String::new());
        }
        Ok(lines.join("\n"))
    }
}

pub struct ReadFiles;

#[async_trait]
impl Tool for ReadFiles {
    fn name(&self) -> &'static str {
        "read_files"
    }

    fn definition(&self) -> ToolDefinition {
        definition(
            self.name(),
            "Read and analyze files that are attached to the current Slack message or thread. Returns the text content of PDFs and documents, or describes images.",
            json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "What to look for or extract from the files"
                    }
                },
                "required": ["question"]
            }),
        )
    }

    fn status_message(&self, _input: &Value) -> String {
        "Reading attached files...".to_string()
    }

    async fn execute(&self, _input: &Value, context: &mut AgentContext) -> Result<String, ToolError> {
        if context.files.is_empty() {
            return Ok(
                "No files are attached to this message. Use get_channel_history to find files shared earlier."
                    .to_string(),
            );
        }

        let mut sections = Vec::with_capacity(context.files.len());
        for file in &context.files {
            if file.is_image() {
                sections.push(format!("[Image: {}] - Image file attached, use vision to analyze", file.name));
                continue;
            }

            match extract(context, file).await {
                Some(text) => sections.push(format!(
                    "=== {} ===\n{}",
                    file.name,
                    truncate_with_marker(&text, ATTACHED_FILE_CHARS)
                )),
                None => sections.push(format!("[{}] - Could not extract text", file.name)),
            }
        }
        Ok(sections.join("\n\n"))
    }
}

/// Extraction failures are logged and reported to the model as missing text.
async fn extract(context: &AgentContext, file: &ChatFile) -> Option<String> {
    match context.services.files.extract_text(file).await {
        Ok(Some(text)) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(error) => {
            warn!(file = %file.name, error = %error, "file text extraction failed");
            None
        }
    }
}

pub struct GetChannelHistory;

#[async_trait]
impl Tool for GetChannelHistory {
    fn name(&self) -> &'static str {
        "get_channel_history"
    }

    fn definition(&self) -> ToolDefinition {
        definition(
            self.name(),
            "Get recent message history from the current Slack channel. Use this to see what's been discussed, find shared files, or understand context. Returns messages with timestamps, authors, and any file attachments.",
            json!({
                "type": "object",
                "properties": {
                    "hours": {
                        "type": "integer",
                        "description": "How many hours of history to fetch (default 24, max 168)",
                        "default": DEFAULT_HISTORY_HOURS
                    }
                },
                "required": []
            }),
        )
    }

    fn status_message(&self, input: &Value) -> String {
        format!("Scanning last {} hours of channel history...", requested_hours(input))
    }

    async fn execute(&self, input: &Value, context: &mut AgentContext) -> Result<String, ToolError> {
        let hours = requested_hours(input) as u32;
        let messages = context.services.gateway.channel_history(&context.channel_id, hours).await?;
        if messages.is_empty() {
            return Ok("No messages found in the specified time period.".to_string());
        }

        for file in messages.iter().flat_map(|message| message.files.iter()) {
            context.remember_file(file);
        }
        Ok(history_lines(&messages))
    }
}

pub struct ReadFileByName;

#[async_trait]
impl Tool for ReadFileByName {
    fn name(&self) -> &'static str {
        "read_file_by_name"
    }

    fn definition(&self) -> ToolDefinition {
        definition(
            self.name(),
            "Read a specific file from the channel history by its name. Use this after get_channel_history if you need to read a file that was shared earlier in the channel.",
            json!({
                "type": "object",
                "properties": {
                    "file_name": {
                        "type": "string",
                        "description": "The name of the file to read (or partial match)"
                    },
                    "question": {
                        "type": "string",
                        "description": "What to look for in this file"
                    }
                },
                "required": ["file_name"]
            }),
        )
    }

    fn status_message(&self, input: &Value) -> String {
        format!("Reading {}...", string_input(input, "file_name").unwrap_or("file"))
    }

    async fn execute(&self, input: &Value, context: &mut AgentContext) -> Result<String, ToolError> {
        let Some(wanted) = string_input(input, "file_name") else {
            return Ok("Please specify a file name.".to_string());
        };

        let file = match context.cached_file(wanted).cloned() {
            Some(file) => Some(file),
            None => scan_history(context, wanted).await?,
        };
        let Some(file) = file else {
            return Ok(format!(
                "Could not find a file matching '{wanted}'. Try get_channel_history first to see available files."
            ));
        };

        if file.is_image() {
            return Ok(format!(
                "[{}] is an image. To analyze images, they need to be attached to the current message.",
                file.name
            ));
        }

        match extract(context, &file).await {
            Some(text) => Ok(format!("=== {} ===\n{}", file.name, truncate_with_marker(&text, DOCUMENT_CHARS))),
            None => Ok(format!("Could not extract text from {}.", file.name)),
        }
    }
}

/// Full-week scan used when the cache has no match.
async fn scan_history(context: &AgentContext, wanted: &str) -> Result<Option<ChatFile>, ToolError> {
    let wanted = wanted.to_lowercase();
    let messages =
        context.services.gateway.channel_history(&context.channel_id, MAX_HISTORY_HOURS as u32).await?;

    Ok(messages.into_iter().flat_map(|message| message.files).find(|file| {
        let name = file.name.to_lowercase();
        name.contains(&wanted) || wanted.contains(&name)
    }))
}

pub struct FetchUrl;

#[async_trait]
impl Tool for FetchUrl {
    fn name(&self) -> &'static str {
        "fetch_url"
    }

    fn definition(&self) -> ToolDefinition {
        definition(
            self.name(),
            "Fetch and read content from a URL or webpage. Returns the page text content.",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "The URL to fetch"}
                },
                "required": ["url"]
            }),
        )
    }

    fn status_message(&self, input: &Value) -> String {
        format!("Fetching {}...", truncate_chars(string_input(input, "url").unwrap_or_default(), 50))
    }

    async fn execute(&self, input: &Value, context: &mut AgentContext) -> Result<String, ToolError> {
        let Some(url) = string_input(input, "url") else {
            return Ok("Please provide a URL.".to_string());
        };

        match context.services.pages.fetch_text(url).await {
            Ok(text) if !text.trim().is_empty() => Ok(truncate_with_marker(&text, DOCUMENT_CHARS)),
            Ok(_) => Ok(unreachable_page(url)),
            Err(error) => {
                warn!(url, error = %error, "page fetch failed");
                Ok(unreachable_page(url))
            }
        }
    }
}

fn unreachable_page(url: &str) -> String {
    format!("Could not fetch content from {url}. The page may be blocked or unavailable.")
}

pub struct SearchWeb;

#[async_trait]
impl Tool for SearchWeb {
    fn name(&self) -> &'static str {
        "search_web"
    }

    fn definition(&self) -> ToolDefinition {
        definition(
            self.name(),
            "Search the web for current/real-time information. Use for stock prices, recent news, current events, or anything requiring up-to-date information.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query"}
                },
                "required": ["query"]
            }),
        )
    }

    fn status_message(&self, input: &Value) -> String {
        format!("Searching: {}...", truncate_chars(string_input(input, "query").unwrap_or_default(), 30))
    }

    async fn execute(&self, input: &Value, context: &mut AgentContext) -> Result<String, ToolError> {
        let Some(query) = string_input(input, "query") else {
            return Ok("Please provide a search query.".to_string());
        };
        let Some(research) = context.services.research.clone() else {
            return Ok("Web search is not configured. TAVILY_API_KEY is required.".to_string());
        };

        research.answer(query).await.map_err(|error| ToolError::Failed(error.to_string()))
    }
}

pub struct GetPortfolioCompanyChannel;

#[async_trait]
impl Tool for GetPortfolioCompanyChannel {
    fn name(&self) -> &'static str {
        "get_portfolio_company_channel"
    }

    fn definition(&self) -> ToolDefinition {
        definition(
            self.name(),
            "Get recent updates from a portfolio company's dedicated Slack channel.",
            json!({
                "type": "object",
                "properties": {
                    "company_name": {"type": "string", "description": "Name of the portfolio company"}
                },
                "required": ["company_name"]
            }),
        )
    }

    fn status_message(&self, input: &Value) -> String {
        format!("Getting updates on {}...", string_input(input, "company_name").unwrap_or("company"))
    }

    async fn execute(&self, input: &Value, context: &mut AgentContext) -> Result<String, ToolError> {
        let Some(company) = string_input(input, "company_name") else {
            return Ok("Please specify a company name.".to_string());
        };

        let services = &context.services;
        let channel_name = channel_name_for_company(&services.portfolio_prefix, company);
        let Some(channel_id) = services.gateway.find_channel_id(&channel_name).await? else {
            return Ok(format!("Could not find a channel for '{company}'. Expected channel: #{channel_name}"));
        };

        let messages = services.gateway.channel_history(&channel_id, MAX_HISTORY_HOURS as u32).await?;
        if messages.is_empty() {
            return Ok(format!("No recent messages in #{channel_name}."));
        }
        Ok(format!("Recent messages from #{channel_name}:\n{}", history_lines(&messages)))
    }
}

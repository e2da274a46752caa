use std::sync::Arc;

use serde::Serialize;
use tera::{Context, Tera};

use pillar_core::domain::agenda::AgendaItem;
use pillar_core::domain::chat::{format_transcript, ChatMessage};
use pillar_core::domain::portfolio::CompanyRecord;

use crate::llm::LlmClient;
use crate::AgentError;

pub const SUMMARY_MAX_TOKENS: u32 = 1000;
pub const ACTION_ITEMS_MAX_TOKENS: u32 = 800;
pub const AGENDA_MAX_TOKENS: u32 = 1000;
pub const PORTFOLIO_UPDATE_MAX_TOKENS: u32 = 800;
pub const LP_SECTION_MAX_TOKENS: u32 = 800;
pub const LP_LETTER_MAX_TOKENS: u32 = 4000;

pub const CATCHUP_CONTEXT: &str = "This is a personal catch-up for a team member who has been away. \
Focus on decisions made, action items that might involve them, and important updates.";

const MEETING_TYPE: &str = "Monday Investment Review";

/// Every prompt the assistant sends, compiled into the binary.
pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn load() -> Result<Self, AgentError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("tone.txt", include_str!("../../../templates/prompts/tone.txt")),
            ("system.txt", include_str!("../../../templates/prompts/system.txt")),
            ("agent_request.txt", include_str!("../../../templates/prompts/agent_request.txt")),
            ("summary.txt", include_str!("../../../templates/prompts/summary.txt")),
            ("action_items.txt", include_str!("../../../templates/prompts/action_items.txt")),
            ("meeting_agenda.txt", include_str!("../../../templates/prompts/meeting_agenda.txt")),
            ("portfolio_update.txt", include_str!("../../../templates/prompts/portfolio_update.txt")),
            ("lp_section.txt", include_str!("../../../templates/prompts/lp_section.txt")),
            ("lp_letter.txt", include_str!("../../../templates/prompts/lp_letter.txt")),
            ("research.txt", include_str!("../../../templates/prompts/research.txt")),
        ])?;
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String, AgentError> {
        Ok(self.tera.render(name, context)?.trim().to_string())
    }

    pub fn system_prompt(&self) -> Result<String, AgentError> {
        self.render("system.txt", &Context::new())
    }
}

#[derive(Serialize)]
struct AgendaLine<'a> {
    category: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct LetterSection<'a> {
    company: &'a str,
    text: &'a str,
}

/// Single-prompt generators for summaries, action items, agendas and LP material.
pub struct ContentGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl ContentGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    pub async fn summarize(
        &self,
        messages: &[ChatMessage],
        extra_context: Option<&str>,
    ) -> Result<String, AgentError> {
        let mut context = Context::new();
        context.insert("transcript", &format_transcript(messages));
        context.insert("context", extra_context.unwrap_or_default());
        self.generate("summary.txt", &context, SUMMARY_MAX_TOKENS).await
    }

    pub async fn action_items(
        &self,
        messages: &[ChatMessage],
        user_filter: Option<&str>,
    ) -> Result<String, AgentError> {
        let mut context = Context::new();
        context.insert("transcript", &format_transcript(messages));
        context.insert("user_filter", user_filter.unwrap_or_default());
        self.generate("action_items.txt", &context, ACTION_ITEMS_MAX_TOKENS).await
    }

    pub async fn meeting_agenda(&self, items: &[AgendaItem]) -> Result<String, AgentError> {
        let lines: Vec<AgendaLine<'_>> = items
            .iter()
            .map(|item| AgendaLine { category: item.category.label(), content: &item.content })
            .collect();

        let mut context = Context::new();
        context.insert("meeting_type", MEETING_TYPE);
        context.insert("items", &lines);
        self.generate("meeting_agenda.txt", &context, AGENDA_MAX_TOKENS).await
    }

    pub async fn portfolio_update(
        &self,
        company: &str,
        messages: &[ChatMessage],
        record: Option<&CompanyRecord>,
    ) -> Result<String, AgentError> {
        let mut context = Context::new();
        context.insert("company", company);
        context.insert("transcript", &format_transcript(messages));
        match record {
            Some(record) => {
                context.insert("stage", record.stage.as_deref().unwrap_or("?"));
                context.insert("last_board", record.last_board_meeting.as_deref().unwrap_or("?"));
                context.insert("details", &record.prompt_details());
            }
            None => {
                context.insert("stage", "");
                context.insert("last_board", "");
                context.insert("details", "");
            }
        }
        self.generate("portfolio_update.txt", &context, PORTFOLIO_UPDATE_MAX_TOKENS).await
    }

    pub async fn lp_section(&self, company: &str, updates: &str) -> Result<String, AgentError> {
        let mut context = Context::new();
        context.insert("company", company);
        context.insert("updates", updates);
        self.generate("lp_section.txt", &context, LP_SECTION_MAX_TOKENS).await
    }

    /// `sections` pairs each company with its LP section, in letter order.
    pub async fn lp_letter(
        &self,
        quarter: &str,
        sections: &[(String, String)],
    ) -> Result<String, AgentError> {
        let sections: Vec<LetterSection<'_>> = sections
            .iter()
            .map(|(company, text)| LetterSection { company, text })
            .collect();

        let mut context = Context::new();
        context.insert("quarter", quarter);
        context.insert("sections", &sections);
        self.generate("lp_letter.txt", &context, LP_LETTER_MAX_TOKENS).await
    }

    async fn generate(&self, template: &str, context: &Context, max_tokens: u32) -> Result<String, AgentError> {
        let prompt = self.prompts.render(template, context)?;
        Ok(self.llm.prompt(prompt, max_tokens).await?)
    }
}

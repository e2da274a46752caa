use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use pillar_core::domain::agenda::AgendaCategory;
use pillar_core::period::parse_time_period;
use pillar_core::text::first_user_mention;

use crate::blocks::{self, MessageTemplate};

pub const PILLAR_COMMAND: &str = "/pillar";

pub const AGENDA_ADD_USAGE: &str =
    "Usage: `/pillar agenda add [category] [item]`\nCategories: investment, pipeline, portfolio, other";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: Option<String>,
    pub response_url: Option<String>,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub verb: String,
    pub args: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: Option<String>,
    pub response_url: Option<String>,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PillarCommand {
    Summarize { hours: Option<u32> },
    Catchup,
    Actions { user_id: Option<String>, hours: Option<u32> },
    Agenda(AgendaCommand),
    Portfolio { company: Option<String> },
    LpLetter { quarter: Option<String> },
    Help,
    Unknown { verb: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgendaCommand {
    Prompt,
    Add { category: AgendaCategory, content: String },
    AddUsage,
    Finalize,
    View,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

/// Splits off the first whitespace-delimited word, leaving the rest of the
/// text as typed.
fn split_first_word(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (text, ""),
    }
}

/// Drops one pair of enclosing quotes, straight or typographic.
fn strip_enclosing_quotes(text: &str) -> &str {
    let text = text.trim();
    for (open, close) in [('"', '"'), ('\u{201c}', '\u{201d}')] {
        if let Some(inner) = text.strip_prefix(open).and_then(|rest| rest.strip_suffix(close)) {
            if !inner.trim().is_empty() {
                return inner.trim();
            }
        }
    }
    text
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub fn normalize_pillar_command(
    payload: SlashCommandPayload,
) -> Result<CommandEnvelope, CommandParseError> {
    if payload.command != PILLAR_COMMAND {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let (verb, args) = split_first_word(&payload.text);
    let verb = if verb.is_empty() { "help".to_string() } else { verb.to_lowercase() };

    Ok(CommandEnvelope {
        verb,
        args: args.to_string(),
        channel_id: payload.channel_id,
        user_id: payload.user_id,
        trigger_id: payload.trigger_id,
        response_url: payload.response_url,
        request_id: payload.request_id,
    })
}

pub fn parse_pillar_command(input: &str) -> PillarCommand {
    let (verb, args) = split_first_word(input);
    if verb.is_empty() {
        return PillarCommand::Help;
    }
    classify_pillar_command(&verb.to_lowercase(), args)
}

fn classify_pillar_command(verb: &str, args: &str) -> PillarCommand {
    match verb {
        "summarize" => PillarCommand::Summarize { hours: parse_time_period(args) },
        "catchup" => PillarCommand::Catchup,
        "actions" => PillarCommand::Actions {
            user_id: first_user_mention(args),
            hours: parse_time_period(args),
        },
        "agenda" => PillarCommand::Agenda(classify_agenda_command(args)),
        "portfolio" => PillarCommand::Portfolio { company: non_empty(args) },
        "lp-letter" => PillarCommand::LpLetter { quarter: non_empty(args) },
        "help" => PillarCommand::Help,
        other => PillarCommand::Unknown { verb: other.to_string() },
    }
}

fn classify_agenda_command(args: &str) -> AgendaCommand {
    let (sub, rest) = split_first_word(args);
    match sub.to_lowercase().as_str() {
        "add" => {
            let (category, content) = split_first_word(rest);
            if category.is_empty() || content.is_empty() {
                return AgendaCommand::AddUsage;
            }
            AgendaCommand::Add {
                category: AgendaCategory::from_alias(category),
                content: strip_enclosing_quotes(content).to_string(),
            }
        }
        "finalize" => AgendaCommand::Finalize,
        "view" => AgendaCommand::View,
        _ => AgendaCommand::Prompt,
    }
}

/// Subcommands that talk to the outside world. Help, usage errors and the
/// agenda prompt are answered by the router itself.
#[async_trait]
pub trait PillarCommandService: Send + Sync {
    async fn summarize(
        &self,
        hours: Option<u32>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn catchup(&self, envelope: &CommandEnvelope)
        -> Result<MessageTemplate, CommandRouteError>;

    async fn action_items(
        &self,
        user_id: Option<String>,
        hours: Option<u32>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn add_agenda_item(
        &self,
        category: AgendaCategory,
        content: String,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn finalize_agenda(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn view_agenda(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn portfolio(
        &self,
        company: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn lp_letter(
        &self,
        quarter: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;
}

pub struct CommandRouter<S: ?Sized> {
    service: Arc<S>,
}

impl<S> CommandRouter<S>
where
    S: PillarCommandService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        match classify_pillar_command(&envelope.verb, &envelope.args) {
            PillarCommand::Summarize { hours } => self.service.summarize(hours, &envelope).await,
            PillarCommand::Catchup => self.service.catchup(&envelope).await,
            PillarCommand::Actions { user_id, hours } => {
                self.service.action_items(user_id, hours, &envelope).await
            }
            PillarCommand::Agenda(AgendaCommand::Add { category, content }) => {
                self.service.add_agenda_item(category, content, &envelope).await
            }
            PillarCommand::Agenda(AgendaCommand::AddUsage) => {
                Ok(blocks::error_message(AGENDA_ADD_USAGE))
            }
            PillarCommand::Agenda(AgendaCommand::Finalize) => {
                self.service.finalize_agenda(&envelope).await
            }
            PillarCommand::Agenda(AgendaCommand::View) => self.service.view_agenda(&envelope).await,
            PillarCommand::Agenda(AgendaCommand::Prompt) => Ok(blocks::agenda_prompt_message()),
            PillarCommand::Portfolio { company } => self.service.portfolio(company, &envelope).await,
            PillarCommand::LpLetter { quarter } => self.service.lp_letter(quarter, &envelope).await,
            PillarCommand::Help => Ok(blocks::help_message()),
            PillarCommand::Unknown { verb } => Ok(blocks::error_message(&format!(
                "Unknown command: `{verb}`. Use `/pillar help` for available commands."
            ))),
        }
    }
}

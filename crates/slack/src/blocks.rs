use serde::Serialize;
use serde_json::{json, Value};

use pillar_core::domain::agenda::{group_by_category, AgendaCategory, AgendaItem};
use pillar_core::domain::portfolio::{CompanyRecord, PortfolioChannel};
use pillar_core::text::truncate_chars;

use crate::mrkdwn::{chunk_text, markdown_to_slack};

/// Slack rejects section text longer than this.
pub const SECTION_TEXT_LIMIT: usize = 3000;

pub const AGENDA_MODAL_CALLBACK_ID: &str = "agenda_item_modal";
pub const AGENDA_CONTENT_BLOCK_ID: &str = "agenda_content";
pub const AGENDA_CONTENT_ACTION_ID: &str = "content";
pub const GOOGLE_AUTH_ACTION_ID: &str = "google_auth";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
            url: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlainTextInputElement {
    pub action_id: String,
    pub multiline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<TextObject>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockElement {
    Button(ButtonElement),
    PlainTextInput(PlainTextInputElement),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { block_id: String, text: TextObject },
    Section { block_id: String, text: TextObject },
    Divider { block_id: String },
    Actions { block_id: String, elements: Vec<BlockElement> },
    Context { block_id: String, elements: Vec<TextObject> },
    Input { block_id: String, label: TextObject, element: BlockElement },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    /// A bare text reply without blocks.
    pub fn text(text: impl Into<String>) -> Self {
        Self { fallback_text: text.into(), blocks: Vec::new() }
    }

    /// Body accepted by `chat.postMessage` and response URLs.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({ "text": self.fallback_text });
        if !self.blocks.is_empty() {
            payload["blocks"] = json!(self.blocks);
        }
        payload
    }

    /// Every piece of visible text, in block order. Handy for assertions.
    pub fn visible_text(&self) -> String {
        let mut parts = vec![self.fallback_text.clone()];
        for block in &self.blocks {
            match block {
                Block::Header { text, .. } | Block::Section { text, .. } => {
                    parts.push(text.text().to_string());
                }
                Block::Context { elements, .. } => {
                    parts.extend(elements.iter().map(|element| element.text().to_string()));
                }
                Block::Actions { elements, .. } => {
                    parts.extend(elements.iter().filter_map(|element| match element {
                        BlockElement::Button(button) => Some(button.text.text().to_string()),
                        BlockElement::PlainTextInput(_) => None,
                    }));
                }
                Block::Input { label, .. } => parts.push(label.text().to_string()),
                Block::Divider { .. } => {}
            }
        }
        parts.join("\n")
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn header(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { block_id: block_id.into(), text: TextObject::plain(text) });
        self
    }

    pub fn divider(mut self, block_id: impl Into<String>) -> Self {
        self.blocks.push(Block::Divider { block_id: block_id.into() });
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    /// Splits long mrkdwn into consecutive sections of at most
    /// [`SECTION_TEXT_LIMIT`] characters, keeping at most `max_sections`.
    pub fn long_text(mut self, block_prefix: &str, text: &str, max_sections: usize) -> Self {
        for (index, chunk) in
            chunk_text(text, SECTION_TEXT_LIMIT).into_iter().take(max_sections).enumerate()
        {
            self.blocks.push(Block::Section {
                block_id: format!("{block_prefix}.{}", index + 1),
                text: TextObject::mrkdwn(chunk),
            });
        }
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<BlockElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(BlockElement::Button(button));
        self
    }

    fn build(self) -> Vec<BlockElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// `views.open` payload for a modal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModalView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub callback_id: String,
    pub private_metadata: String,
    pub title: TextObject,
    pub submit: TextObject,
    pub blocks: Vec<Block>,
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Pillar VC Bot Help")
        .header("pillar.help.header", "Pillar VC Bot - Help")
        .section("pillar.help.title", |section| {
            section.mrkdwn("*Available Commands:*");
        })
        .section("pillar.help.commands", |section| {
            section.mrkdwn(
                "`/pillar summarize [time]` - Summarize this channel (default: 24h)\n\
                 `/pillar catchup` - Personal catch-up since your last visit\n\
                 `/pillar actions [@user]` - Extract action items\n\
                 `/pillar agenda` - Start building Monday meeting agenda\n\
                 `/pillar agenda add [category] [item]` - Add item to agenda\n\
                 `/pillar agenda view` - Show pending agenda items\n\
                 `/pillar agenda finalize` - Generate agenda Google Doc\n\
                 `/pillar portfolio [company]` - Get portfolio company update\n\
                 `/pillar lp-letter [quarter]` - Generate LP letter draft\n\
                 `/pillar help` - Show this help message",
            );
        })
        .divider("pillar.help.divider")
        .section("pillar.help.mentions", |section| {
            section.mrkdwn(
                "*Mention Commands:*\nYou can also @mention me with natural language:\n\
                 - \"@PillarBot summarize the last week\"\n\
                 - \"@PillarBot what action items are there?\"\n\
                 - \"@PillarBot catch me up\"",
            );
        })
        .build()
}

pub fn error_message(message: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Error: {message}"))
        .section("pillar.error", |section| {
            section.mrkdwn(format!("*Error:* {message}"));
        })
        .build()
}

pub fn loading_message(action: &str) -> MessageTemplate {
    MessageBuilder::new(format!("{action}..."))
        .section("pillar.loading", |section| {
            section.mrkdwn(format!("_{action}..._"));
        })
        .build()
}

/// Model output for a thread reply: short answers go out as plain text, long
/// ones as up to three sections with a clipped fallback.
pub fn answer_message(markdown: &str) -> MessageTemplate {
    let text = markdown_to_slack(markdown);
    if text.chars().count() <= SECTION_TEXT_LIMIT {
        return MessageTemplate::text(text);
    }

    MessageBuilder::new(truncate_chars(&text, 200)).long_text("pillar.answer", &text, 3).build()
}

pub fn summary_message(channel_name: &str, period: &str, summary: &str) -> MessageTemplate {
    let summary = markdown_to_slack(summary);
    MessageBuilder::new(format!("Summary of #{channel_name} ({period})"))
        .header("pillar.summary.header", format!("Summary: #{channel_name}"))
        .context("pillar.summary.period", |context| {
            context.mrkdwn(format!("Period: {period}"));
        })
        .divider("pillar.summary.divider")
        .long_text("pillar.summary.body", &summary, 2)
        .build()
}

pub fn action_items_message(action_items: &str, channel_name: Option<&str>) -> MessageTemplate {
    let header = match channel_name {
        Some(channel_name) => format!("Action Items: #{channel_name}"),
        None => "Action Items".to_string(),
    };
    let action_items = markdown_to_slack(action_items);

    MessageBuilder::new(header.clone())
        .header("pillar.actions.header", header)
        .divider("pillar.actions.divider")
        .long_text("pillar.actions.body", &action_items, 1)
        .build()
}

pub fn agenda_confirmation_message(category: AgendaCategory, content: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Added to agenda: {}...", truncate_chars(content, 50)))
        .section("pillar.agenda.added", |section| {
            section.mrkdwn(format!("Added to Monday agenda under *{}*:", category.label()));
        })
        .section("pillar.agenda.added.content", |section| {
            section.mrkdwn(format!(">{content}"));
        })
        .build()
}

pub fn agenda_prompt_message() -> MessageTemplate {
    MessageBuilder::new("Monday Meeting Agenda Builder")
        .header("pillar.agenda.prompt.header", "Monday Meeting Agenda Builder")
        .section("pillar.agenda.prompt.body", |section| {
            section.mrkdwn("Add items to this week's agenda by selecting a category:");
        })
        .actions("pillar.agenda.prompt.categories", |actions| {
            for (category, label, value) in [
                (AgendaCategory::InvestmentDecisions, "Investment Decision", "investment_decision"),
                (AgendaCategory::PipelineReview, "Pipeline Update", "pipeline_update"),
                (AgendaCategory::PortfolioUpdates, "Portfolio Update", "portfolio_update"),
                (AgendaCategory::OtherBusiness, "Other", "other"),
            ] {
                actions.button(ButtonElement::new(category.action_id(), label).value(value));
            }
        })
        .context("pillar.agenda.prompt.hint", |context| {
            context.mrkdwn("Or use `/pillar agenda add [category] [item]` to add directly");
        })
        .build()
}

/// Pending items grouped by category, or `None` when nothing is pending.
pub fn pending_agenda_message(items: &[AgendaItem]) -> Option<MessageTemplate> {
    if items.is_empty() {
        return None;
    }

    let mut text = String::from("*Pending Agenda Items:*\n\n");
    for (category, bucket) in group_by_category(items) {
        text.push_str(&format!("*{}*\n", category.label()));
        for item in bucket {
            text.push_str(&format!("  - {}\n", item.content));
        }
        text.push('\n');
    }

    Some(MessageTemplate::text(text))
}

pub fn doc_created_message(title: &str, url: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Created: {title}"))
        .section("pillar.doc.created", |section| {
            section.mrkdwn(format!("Created Google Doc: *<{url}|{title}>*"));
        })
        .build()
}

pub fn google_auth_prompt(auth_url: &str) -> MessageTemplate {
    MessageBuilder::new("Please connect your Google account")
        .section("pillar.google.auth.body", |section| {
            section.mrkdwn("To create Google Docs, I need access to your Google account.");
        })
        .actions("pillar.google.auth.actions", |actions| {
            actions.button(
                ButtonElement::new(GOOGLE_AUTH_ACTION_ID, "Connect Google Account")
                    .style(ButtonStyle::Primary)
                    .url(auth_url),
            );
        })
        .build()
}

pub fn portfolio_update_message(
    company_name: &str,
    update: &str,
    record: Option<&CompanyRecord>,
) -> MessageTemplate {
    let title = format!("Portfolio Update: {company_name}");
    let mut builder = MessageBuilder::new(title.clone()).header("pillar.portfolio.header", title);

    if let Some(record) = record {
        let fields: Vec<String> = [
            ("Stage", &record.stage),
            ("Sector", &record.sector),
            ("Lead", &record.lead_partner),
        ]
        .iter()
        .filter_map(|(label, value)| match value {
            Some(value) if !value.is_empty() => Some(format!("*{label}:* {value}")),
            _ => None,
        })
        .collect();

        if !fields.is_empty() {
            builder = builder.context("pillar.portfolio.fields", |context| {
                context.mrkdwn(fields.join(" | "));
            });
        }
    }

    builder
        .divider("pillar.portfolio.divider")
        .long_text("pillar.portfolio.body", &markdown_to_slack(update), 1)
        .build()
}

pub fn portfolio_companies_message(companies: &[CompanyRecord]) -> MessageTemplate {
    let mut text = String::from("*Portfolio Companies:*\n");
    for company in companies {
        text.push_str(&format!("  - {}", company.name));
        if let Some(sector) = company.sector.as_deref().filter(|sector| !sector.is_empty()) {
            text.push_str(&format!(" ({sector})"));
        }
        text.push('\n');
    }
    text.push_str("\nUse `/pillar portfolio [company name]` for details.");
    MessageTemplate::text(text)
}

pub fn portfolio_channels_message(channels: &[PortfolioChannel]) -> MessageTemplate {
    let mut text = String::from("*Portfolio Channels:*\n");
    for channel in channels {
        text.push_str(&format!("  - #{} ({})\n", channel.name, channel.company_name));
    }
    text.push_str("\nUse `/pillar portfolio [company name]` for details.");
    MessageTemplate::text(text)
}

pub fn portfolio_welcome_message(company_name: &str) -> MessageTemplate {
    MessageTemplate::text(format!(
        "Welcome to the {company_name} portfolio channel! Use `/pillar summarize` to catch up \
         on recent activity, or `/pillar portfolio {company_name}` for a comprehensive update."
    ))
}

/// Modal asking for the agenda item text; the category rides along in the
/// private metadata.
pub fn agenda_item_modal(category: AgendaCategory) -> ModalView {
    ModalView {
        kind: "modal",
        callback_id: AGENDA_MODAL_CALLBACK_ID.to_string(),
        private_metadata: category.label().to_string(),
        title: TextObject::plain("Add Agenda Item"),
        submit: TextObject::plain("Add"),
        blocks: vec![
            Block::Section {
                block_id: "agenda_category".to_string(),
                text: TextObject::mrkdwn(format!("*Category:* {}", category.label())),
            },
            Block::Input {
                block_id: AGENDA_CONTENT_BLOCK_ID.to_string(),
                label: TextObject::plain("Item Details"),
                element: BlockElement::PlainTextInput(PlainTextInputElement {
                    action_id: AGENDA_CONTENT_ACTION_ID.to_string(),
                    multiline: true,
                    placeholder: Some(TextObject::plain("Describe the agenda item...")),
                }),
            },
        ],
    }
}

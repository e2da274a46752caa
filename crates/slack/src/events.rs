use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use pillar_core::domain::chat::ChatFile;

use crate::{
    api::parse_files,
    blocks::MessageTemplate,
    commands::{
        normalize_pillar_command, CommandParseError, CommandRouteError, CommandRouter,
        PillarCommandService, SlashCommandPayload,
    },
};

/// Message subtypes that never count as a person being active.
const IGNORED_MESSAGE_SUBTYPES: &[&str] = &["bot_message", "message_changed", "message_deleted"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    AppMention(AppMentionEvent),
    Message(MessageEvent),
    MemberJoined(MemberJoinedEvent),
    BlockAction(BlockActionEvent),
    ViewSubmission(ViewSubmissionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::Message(_) => SlackEventType::Message,
            Self::MemberJoined(_) => SlackEventType::MemberJoined,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Where a handler's reply goes, if anywhere.
    pub fn reply_target(&self) -> Option<ReplyTarget> {
        match self {
            Self::SlashCommand(payload) => {
                payload.response_url.clone().map(ReplyTarget::ResponseUrl)
            }
            Self::AppMention(event) => Some(ReplyTarget::Channel {
                channel_id: event.channel_id.clone(),
                thread_ts: Some(event.reply_thread_ts().to_string()),
            }),
            Self::MemberJoined(event) => {
                Some(ReplyTarget::Channel { channel_id: event.channel_id.clone(), thread_ts: None })
            }
            Self::BlockAction(event) => event.response_url.clone().map(ReplyTarget::ResponseUrl),
            Self::Message(_) | Self::ViewSubmission(_) | Self::Unsupported { .. } => None,
        }
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(payload) => Some(&payload.channel_id),
            Self::AppMention(event) => Some(&event.channel_id),
            Self::Message(event) => Some(&event.channel_id),
            Self::MemberJoined(event) => Some(&event.channel_id),
            Self::BlockAction(event) => event.channel_id.as_deref(),
            Self::ViewSubmission(_) | Self::Unsupported { .. } => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(payload) => Some(&payload.user_id),
            Self::AppMention(event) => Some(&event.user_id),
            Self::Message(event) => event.user_id.as_deref(),
            Self::MemberJoined(event) => Some(&event.user_id),
            Self::BlockAction(event) => Some(&event.user_id),
            Self::ViewSubmission(event) => Some(&event.user_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    AppMention,
    Message,
    MemberJoined,
    BlockAction,
    ViewSubmission,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyTarget {
    ResponseUrl(String),
    Channel { channel_id: String, thread_ts: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppMentionEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub files: Vec<ChatFile>,
}

impl AppMentionEvent {
    /// Replies always land in a thread: the existing one or a new one under
    /// the mention.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    pub fn is_thread_reply(&self) -> bool {
        self.thread_ts.as_deref().is_some_and(|thread_ts| thread_ts != self.ts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: Option<String>,
    pub subtype: Option<String>,
    pub text: String,
    pub ts: String,
}

impl MessageEvent {
    /// Ordinary human messages; edits, deletions and bot posts are not.
    pub fn is_user_activity(&self) -> bool {
        let ignored = self
            .subtype
            .as_deref()
            .is_some_and(|subtype| IGNORED_MESSAGE_SUBTYPES.contains(&subtype));
        !ignored && self.user_id.as_deref().is_some_and(|user_id| !user_id.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberJoinedEvent {
    pub channel_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub user_id: String,
    pub channel_id: Option<String>,
    pub trigger_id: Option<String>,
    pub response_url: Option<String>,
    pub action_id: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewSubmissionEvent {
    pub user_id: String,
    pub callback_id: String,
    pub private_metadata: String,
    pub state_values: Value,
}

impl ViewSubmissionEvent {
    pub fn input_value(&self, block_id: &str, action_id: &str) -> Option<&str> {
        self.state_values[block_id][action_id]["value"].as_str()
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

fn optional_field(value: &Value, key: &str) -> Option<String> {
    value[key].as_str().filter(|text| !text.is_empty()).map(str::to_string)
}

/// Turns a raw Socket Mode frame into an envelope. Frames without an
/// envelope id (`hello`, `disconnect`) are not envelopes.
pub fn parse_envelope(frame: &Value) -> Option<SlackEnvelope> {
    let envelope_id = frame["envelope_id"].as_str()?.to_string();
    let payload = &frame["payload"];

    let event = match frame["type"].as_str().unwrap_or_default() {
        "slash_commands" => SlackEvent::SlashCommand(SlashCommandPayload {
            command: string_field(payload, "command"),
            text: string_field(payload, "text"),
            channel_id: string_field(payload, "channel_id"),
            user_id: string_field(payload, "user_id"),
            trigger_id: optional_field(payload, "trigger_id"),
            response_url: optional_field(payload, "response_url"),
            request_id: envelope_id.clone(),
        }),
        "events_api" => parse_events_api(&payload["event"]),
        "interactive" => parse_interactive(payload),
        other => SlackEvent::Unsupported { event_type: other.to_string() },
    };

    Some(SlackEnvelope { envelope_id, event })
}

fn parse_events_api(event: &Value) -> SlackEvent {
    match event["type"].as_str().unwrap_or_default() {
        "app_mention" => SlackEvent::AppMention(AppMentionEvent {
            channel_id: string_field(event, "channel"),
            user_id: string_field(event, "user"),
            text: string_field(event, "text"),
            ts: string_field(event, "ts"),
            thread_ts: optional_field(event, "thread_ts"),
            files: parse_files(&event["files"]),
        }),
        "message" => SlackEvent::Message(MessageEvent {
            channel_id: string_field(event, "channel"),
            user_id: optional_field(event, "user"),
            subtype: optional_field(event, "subtype"),
            text: string_field(event, "text"),
            ts: string_field(event, "ts"),
        }),
        "member_joined_channel" => SlackEvent::MemberJoined(MemberJoinedEvent {
            channel_id: string_field(event, "channel"),
            user_id: string_field(event, "user"),
        }),
        other => SlackEvent::Unsupported { event_type: other.to_string() },
    }
}

fn parse_interactive(payload: &Value) -> SlackEvent {
    let user_id = string_field(&payload["user"], "id");
    match payload["type"].as_str().unwrap_or_default() {
        "block_actions" => {
            let action = &payload["actions"][0];
            SlackEvent::BlockAction(BlockActionEvent {
                user_id,
                channel_id: optional_field(&payload["channel"], "id"),
                trigger_id: optional_field(payload, "trigger_id"),
                response_url: optional_field(payload, "response_url"),
                action_id: string_field(action, "action_id"),
                value: optional_field(action, "value"),
            })
        }
        "view_submission" => {
            let view = &payload["view"];
            SlackEvent::ViewSubmission(ViewSubmissionEvent {
                user_id,
                callback_id: string_field(view, "callback_id"),
                private_metadata: string_field(view, "private_metadata"),
                state_values: view["state"]["values"].clone(),
            })
        }
        other => SlackEvent::Unsupported { event_type: other.to_string() },
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

impl From<Option<MessageTemplate>> for HandlerResult {
    fn from(message: Option<MessageTemplate>) -> Self {
        match message {
            Some(message) => Self::Responded(message),
            None => Self::Processed,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Route(#[from] CommandRouteError),
    #[error("mention handler failure: {0}")]
    Mention(String),
    #[error("channel event handler failure: {0}")]
    ChannelEvent(String),
    #[error("interaction handler failure: {0}")]
    Interaction(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Registers every handler against one service object that implements all of
/// the handler seams.
pub fn pillar_dispatcher<S>(service: Arc<S>) -> EventDispatcher
where
    S: PillarCommandService + MentionService + ChannelEventService + InteractionService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(service.clone()));
    dispatcher.register(AppMentionHandler::new(service.clone()));
    dispatcher.register(MessageHandler::new(service.clone()));
    dispatcher.register(MemberJoinedHandler::new(service.clone()));
    dispatcher.register(BlockActionHandler::new(service.clone()));
    dispatcher.register(ViewSubmissionHandler::new(service));
    dispatcher
}

pub struct SlashCommandHandler<S: ?Sized> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: PillarCommandService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: PillarCommandService + ?Sized + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let normalized = normalize_pillar_command(payload.clone())?;
        let message = self.router.route(normalized).await?;
        Ok(HandlerResult::Responded(message))
    }
}

#[async_trait]
pub trait MentionService: Send + Sync {
    /// Returns the final answer for the thread; progress messages are the
    /// service's own business.
    async fn handle_mention(
        &self,
        event: &AppMentionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;
}

pub struct AppMentionHandler<S: ?Sized> {
    service: Arc<S>,
}

impl<S> AppMentionHandler<S>
where
    S: MentionService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for AppMentionHandler<S>
where
    S: MentionService + ?Sized + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppMention
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppMention(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(self.service.handle_mention(event, ctx).await?.into())
    }
}

#[async_trait]
pub trait ChannelEventService: Send + Sync {
    async fn record_activity(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;

    async fn member_joined(
        &self,
        event: &MemberJoinedEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;
}

pub struct MessageHandler<S: ?Sized> {
    service: Arc<S>,
}

impl<S> MessageHandler<S>
where
    S: ChannelEventService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: ChannelEventService + ?Sized + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if !event.is_user_activity() {
            return Ok(HandlerResult::Ignored);
        }

        self.service.record_activity(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct MemberJoinedHandler<S: ?Sized> {
    service: Arc<S>,
}

impl<S> MemberJoinedHandler<S>
where
    S: ChannelEventService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MemberJoinedHandler<S>
where
    S: ChannelEventService + ?Sized + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::MemberJoined
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::MemberJoined(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(self.service.member_joined(event, ctx).await?.into())
    }
}

#[async_trait]
pub trait InteractionService: Send + Sync {
    async fn handle_block_action(
        &self,
        event: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;

    async fn handle_view_submission(
        &self,
        event: &ViewSubmissionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;
}

pub struct BlockActionHandler<S: ?Sized> {
    service: Arc<S>,
}

impl<S> BlockActionHandler<S>
where
    S: InteractionService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionHandler<S>
where
    S: InteractionService + ?Sized + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(self.service.handle_block_action(event, ctx).await?.into())
    }
}

pub struct ViewSubmissionHandler<S: ?Sized> {
    service: Arc<S>,
}

impl<S> ViewSubmissionHandler<S>
where
    S: InteractionService + ?Sized,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ViewSubmissionHandler<S>
where
    S: InteractionService + ?Sized + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(self.service.handle_view_submission(event, ctx).await?.into())
    }
}

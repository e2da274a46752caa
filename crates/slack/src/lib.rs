//! Slack interface for the Pillar assistant.
//!
//! - **Socket Mode** (`socket`) - websocket connection to Slack, acks and reply delivery
//! - **Events** (`events`) - envelope parsing and the handler seams the server implements
//! - **Slash Commands** (`commands`) - `/pillar summarize`, `/pillar agenda add`, ...
//! - **Web API** (`api`) - history, users, channels, posting and file downloads
//! - **Block Kit** (`blocks`) - message and modal builders plus the canned replies
//!
//! ```text
//! Slack ─ws─> SocketModeRunner ─> EventDispatcher ─> handlers ─> server services
//!                    ^                                                │
//!                    └──────────── ChatGateway <── MessageTemplate ───┘
//! ```

pub mod api;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod mrkdwn;
pub mod socket;

pub use api::{ChannelSummary, ChatGateway, SlackApiError, SlackWebClient};
pub use blocks::{MessageBuilder, MessageTemplate, ModalView};
pub use commands::{CommandEnvelope, CommandRouteError, PillarCommand, PillarCommandService};
pub use events::{
    pillar_dispatcher, ChannelEventService, EventContext, EventDispatcher, EventHandlerError,
    InteractionService, MentionService,
};
pub use socket::{ReconnectPolicy, SocketModeRunner, SocketTransport, WebSocketTransport};

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{net::TcpStream, sync::Mutex, task::JoinSet};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::{
    api::{ChatGateway, SlackApiError},
    blocks::{error_message, MessageTemplate},
    events::{
        parse_envelope, EventContext, EventDispatcher, HandlerResult, ReplyTarget, SlackEnvelope,
    },
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Slack rotates socket connections every few hours; a closed stream is
    /// normally followed by a fresh connection.
    pub reconnect_on_close: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000, reconnect_on_close: true }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a real websocket. The URL comes from
/// `apps.connections.open` and changes on every connect.
pub struct WebSocketTransport {
    http: Client,
    api_base_url: String,
    app_token: SecretString,
    reader: Mutex<Option<SplitStream<SocketStream>>>,
    writer: Mutex<Option<SplitSink<SocketStream, WsMessage>>>,
}

impl WebSocketTransport {
    pub fn new(
        api_base_url: impl Into<String>,
        app_token: SecretString,
    ) -> Result<Self, SlackApiError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            app_token,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        })
    }

    async fn open_connection(&self) -> Result<String, TransportError> {
        let response = self
            .http
            .post(format!("{}/apps.connections.open", self.api_base_url))
            .bearer_auth(self.app_token.expose_secret())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        let body: Value =
            response.json().await.map_err(|error| TransportError::Connect(error.to_string()))?;
        if body["ok"].as_bool() != Some(true) {
            let error = body["error"].as_str().unwrap_or("unknown");
            return Err(TransportError::Connect(format!("apps.connections.open failed: {error}")));
        }

        body["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::Connect("missing url in connection response".to_owned()))
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.open_connection().await?;
        let (stream, _) =
            connect_async(url.as_str()).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        let (writer, reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.reader.lock().await;
        let reader =
            guard.as_mut().ok_or_else(|| TransportError::Receive("not connected".to_owned()))?;

        loop {
            let Some(frame) = reader.next().await else {
                return Ok(None);
            };
            let frame = frame.map_err(|error| TransportError::Receive(error.to_string()))?;
            let text = match frame {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => return Ok(None),
                _ => continue,
            };

            let value: Value = match serde_json::from_str(text.as_str()) {
                Ok(value) => value,
                Err(error) => {
                    warn!(error = %error, "skipping undecodable socket mode frame");
                    continue;
                }
            };

            match value["type"].as_str() {
                Some("disconnect") => {
                    info!(
                        reason = value["reason"].as_str().unwrap_or("unknown"),
                        "slack requested socket mode disconnect"
                    );
                    return Ok(None);
                }
                Some("hello") => {
                    debug!("socket mode hello received");
                    continue;
                }
                _ => {}
            }

            if let Some(envelope) = parse_envelope(&value) {
                return Ok(Some(envelope));
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer =
            guard.as_mut().ok_or_else(|| TransportError::Acknowledge("not connected".to_owned()))?;
        let ack = json!({ "envelope_id": envelope_id });
        writer
            .send(WsMessage::Text(ack.to_string().into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.reader.lock().await.take();
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };
        writer.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    replies: Option<Arc<dyn ChatGateway>>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), replies: None, reconnect_policy }
    }

    /// Handler responses are delivered through `gateway`; without one they
    /// are only logged.
    pub fn with_replies(mut self, gateway: Arc<dyn ChatGateway>) -> Self {
        self.replies = Some(gateway);
        self
    }

    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.connect_and_pump(attempt).await {
                Ok(()) => {
                    if !self.reconnect_policy.reconnect_on_close {
                        return Ok(());
                    }
                    info!("socket mode stream closed; reconnecting");
                    attempt = 0;
                }
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt, "socket mode transport connected");

        let mut in_flight = JoinSet::new();
        let outcome = self.pump(&mut in_flight).await;

        // Let work that was already acknowledged finish before the socket goes away.
        while in_flight.join_next().await.is_some() {}

        match outcome {
            Ok(()) => {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await
            }
            Err(error) => Err(error),
        }
    }

    async fn pump(&self, in_flight: &mut JoinSet<()>) -> Result<(), TransportError> {
        loop {
            while in_flight.try_join_next().is_some() {}

            let Some(envelope) = self.transport.next_envelope().await? else {
                return Ok(());
            };
            let channel_id = envelope.event.channel_id().unwrap_or("unknown").to_owned();
            let user_id = envelope.event.user_id().unwrap_or("unknown").to_owned();

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = %channel_id,
                user_id = %user_id,
                "received slack envelope"
            );

            // Slack retries envelopes that are not acknowledged within three
            // seconds, so the ack goes out before any handler work.
            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let dispatcher = self.dispatcher.clone();
            let replies = self.replies.clone();
            in_flight.spawn(async move {
                process_envelope(dispatcher, replies, envelope).await;
            });
        }
    }
}

async fn process_envelope(
    dispatcher: Arc<EventDispatcher>,
    replies: Option<Arc<dyn ChatGateway>>,
    envelope: SlackEnvelope,
) {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    let reply = match dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(message)) => message,
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => return,
        Err(error) => {
            warn!(
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "event dispatch failed; continuing socket loop"
            );
            error_message(&error.to_string())
        }
    };

    let (Some(gateway), Some(target)) = (replies, envelope.event.reply_target()) else {
        debug!(
            envelope_id = %envelope.envelope_id,
            "handler reply has no delivery target"
        );
        return;
    };

    if let Err(error) = deliver_reply(gateway.as_ref(), &target, &reply).await {
        warn!(
            event_name = "egress.slack.reply_failed",
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            error = %error,
            "failed to deliver handler reply"
        );
    }
}

pub async fn deliver_reply(
    gateway: &dyn ChatGateway,
    target: &ReplyTarget,
    message: &MessageTemplate,
) -> Result<(), SlackApiError> {
    match target {
        ReplyTarget::ResponseUrl(url) => gateway.respond(url, message).await,
        ReplyTarget::Channel { channel_id, thread_ts } => {
            gateway.post_message(channel_id, message, thread_ts.as_deref()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::{ReconnectPolicy, SocketModeRunner, SocketTransport, TransportError};
    use crate::api::{ChannelSummary, ChatGateway, SlackApiError};
    use crate::blocks::{MessageTemplate, ModalView};
    use crate::events::{
        parse_envelope, pillar_dispatcher, tests::RecordingService, EventDispatcher,
        SlackEnvelope, SlackEvent,
    };
    use pillar_core::domain::chat::ChatMessage;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        disconnect_results: VecDeque<Result<(), TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
            disconnect_results: Vec<Result<(), TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    disconnect_results: disconnect_results.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            state.disconnect_results.pop_front().unwrap_or(Ok(()))
        }
    }

    /// Captures outbound replies; reads are never exercised here.
    #[derive(Default)]
    struct CapturingGateway {
        posts: std::sync::Mutex<Vec<(String, Option<String>, String)>>,
        responses: std::sync::Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatGateway for CapturingGateway {
        async fn channel_history(
            &self,
            _channel_id: &str,
            _hours: u32,
        ) -> Result<Vec<ChatMessage>, SlackApiError> {
            Ok(Vec::new())
        }

        async fn thread_parent(
            &self,
            _channel_id: &str,
            _thread_ts: &str,
        ) -> Result<Option<ChatMessage>, SlackApiError> {
            Ok(None)
        }

        async fn user_name(&self, user_id: &str) -> String {
            user_id.to_owned()
        }

        async fn channel_name(&self, channel_id: &str) -> Result<String, SlackApiError> {
            Ok(channel_id.to_owned())
        }

        async fn list_channels(&self) -> Result<Vec<ChannelSummary>, SlackApiError> {
            Ok(Vec::new())
        }

        async fn post_message(
            &self,
            channel_id: &str,
            message: &MessageTemplate,
            thread_ts: Option<&str>,
        ) -> Result<(), SlackApiError> {
            self.posts.lock().expect("lock").push((
                channel_id.to_owned(),
                thread_ts.map(str::to_owned),
                message.fallback_text.clone(),
            ));
            Ok(())
        }

        async fn respond(
            &self,
            response_url: &str,
            message: &MessageTemplate,
        ) -> Result<(), SlackApiError> {
            self.responses
                .lock()
                .expect("lock")
                .push((response_url.to_owned(), message.fallback_text.clone()));
            Ok(())
        }

        async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError> {
            Ok(format!("D-{user_id}"))
        }

        async fn open_view(&self, _trigger_id: &str, _view: &ModalView) -> Result<(), SlackApiError> {
            Ok(())
        }

        async fn download_file(&self, _url: &str) -> Result<Vec<u8>, SlackApiError> {
            Ok(Vec::new())
        }
    }

    fn single_pass() -> ReconnectPolicy {
        ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0, reconnect_on_close: false }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: SlackEvent::Unsupported { event_type: "test".to_owned() },
                })),
                Ok(None),
            ],
            vec![Ok(())],
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), EventDispatcher::default(), single_pass());

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
            vec![],
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), EventDispatcher::default(), single_pass());

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn closed_streams_reconnect_when_policy_allows() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Err(TransportError::Connect("gone".to_owned()))],
            vec![Ok(None)],
            vec![Ok(())],
        ));
        let policy = ReconnectPolicy { max_retries: 0, reconnect_on_close: true, ..single_pass() };

        let runner = SocketModeRunner::new(transport.clone(), EventDispatcher::default(), policy);
        runner.start().await.expect("runner should stop after the failed reconnect");

        assert_eq!(transport.connect_attempts().await, 2);
    }

    #[tokio::test]
    async fn handler_replies_go_to_response_url_or_thread() {
        let slash = parse_envelope(&json!({
            "envelope_id": "env-slash",
            "type": "slash_commands",
            "payload": {
                "command": "/pillar",
                "text": "help",
                "channel_id": "C1",
                "user_id": "U1",
                "response_url": "https://hooks.slack.test/1"
            }
        }))
        .expect("slash envelope");
        let mention = parse_envelope(&json!({
            "envelope_id": "env-mention",
            "type": "events_api",
            "payload": {"event": {
                "type": "app_mention",
                "channel": "C2",
                "user": "U2",
                "text": "<@UBOT> what's new",
                "ts": "1700000000.000100"
            }}
        }))
        .expect("mention envelope");

        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(slash)), Ok(Some(mention)), Ok(None)],
            vec![Ok(())],
        ));
        let gateway = Arc::new(CapturingGateway::default());
        let service = Arc::new(RecordingService::default());

        let runner =
            SocketModeRunner::new(transport.clone(), pillar_dispatcher(service), single_pass())
                .with_replies(gateway.clone());
        runner.start().await.expect("runner");

        assert_eq!(transport.acknowledgements().await, vec!["env-slash", "env-mention"]);

        let responses = gateway.responses.lock().expect("lock").clone();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].0, "https://hooks.slack.test/1");
        assert_eq!(responses[0].1, "Pillar VC Bot Help");

        let posts = gateway.posts.lock().expect("lock").clone();
        assert_eq!(
            posts,
            vec![(
                "C2".to_owned(),
                Some("1700000000.000100".to_owned()),
                "answer".to_owned()
            )]
        );
    }

    #[tokio::test]
    async fn dispatch_failures_are_reported_back_to_the_user() {
        let bad_command = parse_envelope(&json!({
            "envelope_id": "env-bad",
            "type": "slash_commands",
            "payload": {
                "command": "/other",
                "text": "",
                "channel_id": "C1",
                "user_id": "U1",
                "response_url": "https://hooks.slack.test/2"
            }
        }))
        .expect("envelope");

        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(bad_command)), Ok(None)],
            vec![Ok(())],
        ));
        let gateway = Arc::new(CapturingGateway::default());
        let runner = SocketModeRunner::new(
            transport,
            pillar_dispatcher(Arc::new(RecordingService::default())),
            single_pass(),
        )
        .with_replies(gateway.clone());
        runner.start().await.expect("runner");

        let responses = gateway.responses.lock().expect("lock").clone();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].1.starts_with("Error: "));
    }
}

//! Slack Web API gateway.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use pillar_core::domain::chat::{parse_slack_ts, to_slack_ts, ChatFile, ChatMessage};
use pillar_core::domain::portfolio::{company_name_from_channel, PortfolioChannel};

use crate::blocks::{MessageTemplate, ModalView};

const HISTORY_PAGE_SIZE: usize = 200;
const CHANNEL_PAGE_SIZE: usize = 200;
const SKIPPED_SUBTYPES: &[&str] = &["channel_join", "channel_leave"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack http request failed: {0}")]
    Http(String),
    #[error("slack method `{method}` returned error `{error}`")]
    Api { method: String, error: String },
    #[error("slack response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SlackApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSummary {
    pub id: String,
    pub name: String,
}

/// Everything the assistant needs from the chat platform.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Messages from the last `hours`, oldest first, mentions resolved.
    async fn channel_history(
        &self,
        channel_id: &str,
        hours: u32,
    ) -> Result<Vec<ChatMessage>, SlackApiError>;

    async fn thread_parent(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Option<ChatMessage>, SlackApiError>;

    /// Display name, falling back to the id when the lookup fails.
    async fn user_name(&self, user_id: &str) -> String;

    async fn channel_name(&self, channel_id: &str) -> Result<String, SlackApiError>;

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, SlackApiError>;

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
        thread_ts: Option<&str>,
    ) -> Result<(), SlackApiError>;

    async fn respond(&self, response_url: &str, message: &MessageTemplate)
        -> Result<(), SlackApiError>;

    /// Opens (or reuses) the direct-message channel with a user.
    async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError>;

    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError>;

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackApiError>;

    async fn find_channel_id(&self, channel_name: &str) -> Result<Option<String>, SlackApiError> {
        let wanted = channel_name.trim_start_matches('#');
        Ok(self
            .list_channels()
            .await?
            .into_iter()
            .find(|channel| channel.name == wanted)
            .map(|channel| channel.id))
    }

    async fn portfolio_channels(
        &self,
        prefix: &str,
    ) -> Result<Vec<PortfolioChannel>, SlackApiError> {
        Ok(self
            .list_channels()
            .await?
            .into_iter()
            .filter_map(|channel| {
                let company_name = company_name_from_channel(prefix, &channel.name)?;
                Some(PortfolioChannel { id: channel.id, name: channel.name, company_name })
            })
            .collect())
    }
}

pub(crate) fn parse_file(value: &Value) -> ChatFile {
    ChatFile {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        name: value["name"].as_str().unwrap_or("file").to_string(),
        filetype: value["filetype"].as_str().unwrap_or_default().to_string(),
        mimetype: value["mimetype"].as_str().unwrap_or_default().to_string(),
        url_private: value["url_private"].as_str().map(str::to_string),
        size: value["size"].as_u64().unwrap_or_default(),
    }
}

pub(crate) fn parse_files(value: &Value) -> Vec<ChatFile> {
    value.as_array().map(|files| files.iter().map(parse_file).collect()).unwrap_or_default()
}

fn mention_pattern() -> Option<&'static Regex> {
    static PATTERN: std::sync::OnceLock<Option<Regex>> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<@([A-Z0-9]+)>").ok()).as_ref()
}

pub struct SlackWebClient {
    http: Client,
    base_url: String,
    bot_token: SecretString,
    max_messages: usize,
    user_names: RwLock<HashMap<String, String>>,
}

impl SlackWebClient {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        max_messages: usize,
    ) -> Result<Self, SlackApiError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token,
            max_messages: max_messages.max(1),
            user_names: RwLock::new(HashMap::new()),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.bot_token.expose_secret())
    }

    async fn get(&self, method: &str, query: &[(&str, String)]) -> Result<Value, SlackApiError> {
        let response = self
            .http
            .get(self.method_url(method))
            .header("Authorization", self.bearer())
            .query(query)
            .send()
            .await?;
        let body: Value =
            response.json().await.map_err(|error| SlackApiError::Decode(error.to_string()))?;
        check_ok(method, body)
    }

    async fn post(&self, method: &str, body: &Value) -> Result<Value, SlackApiError> {
        let response = self
            .http
            .post(self.method_url(method))
            .header("Authorization", self.bearer())
            .json(body)
            .send()
            .await?;
        let body: Value =
            response.json().await.map_err(|error| SlackApiError::Decode(error.to_string()))?;
        check_ok(method, body)
    }

    async fn resolve_mentions(&self, text: &str) -> String {
        let Some(pattern) = mention_pattern() else {
            return text.to_string();
        };

        let mentions: Vec<(usize, usize, String)> = pattern
            .captures_iter(text)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let id = captures.get(1)?;
                Some((whole.start(), whole.end(), id.as_str().to_string()))
            })
            .collect();

        let mut resolved = String::with_capacity(text.len());
        let mut last = 0;
        for (start, end, id) in mentions {
            resolved.push_str(&text[last..start]);
            resolved.push('@');
            resolved.push_str(&self.user_name(&id).await);
            last = end;
        }
        resolved.push_str(&text[last..]);
        resolved
    }

    async fn to_chat_message(&self, raw: &Value) -> Option<ChatMessage> {
        let ts = raw["ts"].as_str()?.to_string();
        let posted_at = parse_slack_ts(&ts)?;
        let user_id = raw["user"].as_str().map(str::to_string);
        let user_name = match user_id.as_deref() {
            Some(user_id) => self.user_name(user_id).await,
            None => "Unknown".to_string(),
        };

        Some(ChatMessage {
            user_id,
            user_name,
            text: self.resolve_mentions(raw["text"].as_str().unwrap_or_default()).await,
            ts,
            posted_at,
            files: parse_files(&raw["files"]),
        })
    }
}

fn check_ok(method: &str, body: Value) -> Result<Value, SlackApiError> {
    if body["ok"].as_bool() == Some(true) {
        return Ok(body);
    }
    let error = body["error"].as_str().unwrap_or("unknown_error").to_string();
    warn!(method, error = %error, "slack api call failed");
    Err(SlackApiError::Api { method: method.to_string(), error })
}

fn next_cursor(body: &Value) -> Option<String> {
    body["response_metadata"]["next_cursor"]
        .as_str()
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ChatGateway for SlackWebClient {
    async fn channel_history(
        &self,
        channel_id: &str,
        hours: u32,
    ) -> Result<Vec<ChatMessage>, SlackApiError> {
        let oldest = to_slack_ts(Utc::now() - chrono::Duration::hours(i64::from(hours)));
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;

        while messages.len() < self.max_messages {
            let limit = HISTORY_PAGE_SIZE.min(self.max_messages - messages.len());
            let mut query = vec![
                ("channel", channel_id.to_string()),
                ("oldest", oldest.clone()),
                ("limit", limit.to_string()),
            ];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }

            let body = self.get("conversations.history", &query).await?;
            for raw in body["messages"].as_array().into_iter().flatten() {
                let subtype = raw["subtype"].as_str().unwrap_or_default();
                if SKIPPED_SUBTYPES.contains(&subtype) {
                    continue;
                }
                if let Some(message) = self.to_chat_message(raw).await {
                    messages.push(message);
                }
            }

            if body["has_more"].as_bool() != Some(true) {
                break;
            }
            cursor = next_cursor(&body);
            if cursor.is_none() {
                break;
            }
        }

        debug!(channel_id, hours, count = messages.len(), "fetched channel history");
        messages.reverse();
        Ok(messages)
    }

    async fn thread_parent(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Option<ChatMessage>, SlackApiError> {
        let body = self
            .get(
                "conversations.replies",
                &[
                    ("channel", channel_id.to_string()),
                    ("ts", thread_ts.to_string()),
                    ("limit", "1".to_string()),
                    ("inclusive", "true".to_string()),
                ],
            )
            .await?;

        match body["messages"].as_array().and_then(|messages| messages.first()) {
            Some(raw) => Ok(self.to_chat_message(raw).await),
            None => Ok(None),
        }
    }

    async fn user_name(&self, user_id: &str) -> String {
        if user_id.is_empty() {
            return "Unknown".to_string();
        }
        if let Some(name) = self.user_names.read().await.get(user_id) {
            return name.clone();
        }

        match self.get("users.info", &[("user", user_id.to_string())]).await {
            Ok(body) => {
                let user = &body["user"];
                let name = [user["real_name"].as_str(), user["name"].as_str()]
                    .into_iter()
                    .flatten()
                    .find(|name| !name.is_empty())
                    .unwrap_or(user_id)
                    .to_string();
                self.user_names.write().await.insert(user_id.to_string(), name.clone());
                name
            }
            Err(_) => user_id.to_string(),
        }
    }

    async fn channel_name(&self, channel_id: &str) -> Result<String, SlackApiError> {
        let body = self.get("conversations.info", &[("channel", channel_id.to_string())]).await?;
        body["channel"]["name"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SlackApiError::Decode("conversations.info missing channel name".into()))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, SlackApiError> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![
                ("types", "public_channel,private_channel".to_string()),
                ("limit", CHANNEL_PAGE_SIZE.to_string()),
            ];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }

            let body = self.get("conversations.list", &query).await?;
            for raw in body["channels"].as_array().into_iter().flatten() {
                if let (Some(id), Some(name)) = (raw["id"].as_str(), raw["name"].as_str()) {
                    channels.push(ChannelSummary { id: id.to_string(), name: name.to_string() });
                }
            }

            cursor = next_cursor(&body);
            if cursor.is_none() {
                break;
            }
        }

        Ok(channels)
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
        thread_ts: Option<&str>,
    ) -> Result<(), SlackApiError> {
        let mut body = message.to_payload();
        body["channel"] = json!(channel_id);
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }
        self.post("chat.postMessage", &body).await.map(|_| ())
    }

    async fn respond(
        &self,
        response_url: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let response = self.http.post(response_url).json(&message.to_payload()).send().await?;
        if !response.status().is_success() {
            return Err(SlackApiError::Api {
                method: "response_url".to_string(),
                error: response.status().to_string(),
            });
        }
        Ok(())
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError> {
        let body = self.post("conversations.open", &json!({ "users": user_id })).await?;
        body["channel"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SlackApiError::Decode("conversations.open missing channel id".into()))
    }

    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError> {
        self.post("views.open", &json!({ "trigger_id": trigger_id, "view": view }))
            .await
            .map(|_| ())
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackApiError> {
        let response = self.http.get(url).header("Authorization", self.bearer()).send().await?;
        if !response.status().is_success() {
            return Err(SlackApiError::Http(format!("file download returned {}", response.status())));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pillar_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::CommandResult;

/// One reported setting: dotted key, display value and overriding variable.
struct Entry {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

impl Entry {
    fn new(key: &'static str, value: impl Into<String>, env_key: &'static str) -> Self {
        Self { key, value: value.into(), env_key }
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        Entry::new("database.url", &config.database.url, "PILLAR_DATABASE_URL"),
        Entry::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "PILLAR_DATABASE_MAX_CONNECTIONS",
        ),
        Entry::new(
            "slack.app_token",
            redact_token(config.slack.app_token.expose_secret()),
            "PILLAR_SLACK_APP_TOKEN",
        ),
        Entry::new(
            "slack.bot_token",
            redact_token(config.slack.bot_token.expose_secret()),
            "PILLAR_SLACK_BOT_TOKEN",
        ),
        Entry::new("slack.api_base_url", &config.slack.api_base_url, "PILLAR_SLACK_API_BASE_URL"),
        Entry::new("llm.model", &config.llm.model, "PILLAR_LLM_MODEL"),
        Entry::new("llm.base_url", &config.llm.base_url, "PILLAR_LLM_BASE_URL"),
        Entry::new("llm.api_key", presence(Some(&config.llm.api_key)), "PILLAR_LLM_API_KEY"),
        Entry::new("agent.max_steps", config.agent.max_steps.to_string(), "PILLAR_AGENT_MAX_STEPS"),
        Entry::new(
            "agent.max_tool_result_chars",
            config.agent.max_tool_result_chars.to_string(),
            "PILLAR_AGENT_MAX_TOOL_RESULT_CHARS",
        ),
        Entry::new(
            "search.tavily_api_key",
            presence(config.search.tavily_api_key.as_ref()),
            "PILLAR_SEARCH_TAVILY_API_KEY",
        ),
        Entry::new(
            "google.client_id",
            config.google.client_id.as_deref().unwrap_or("<unset>"),
            "PILLAR_GOOGLE_CLIENT_ID",
        ),
        Entry::new(
            "google.client_secret",
            presence(config.google.client_secret.as_ref()),
            "PILLAR_GOOGLE_CLIENT_SECRET",
        ),
        Entry::new("google.redirect_url", &config.google.redirect_url, "PILLAR_GOOGLE_REDIRECT_URL"),
        Entry::new(
            "airtable.api_key",
            presence(config.airtable.api_key.as_ref()),
            "PILLAR_AIRTABLE_API_KEY",
        ),
        Entry::new(
            "airtable.base_id",
            config.airtable.base_id.as_deref().unwrap_or("<unset>"),
            "PILLAR_AIRTABLE_BASE_ID",
        ),
        Entry::new(
            "portfolio.channel_prefix",
            &config.portfolio.channel_prefix,
            "PILLAR_PORTFOLIO_CHANNEL_PREFIX",
        ),
        Entry::new(
            "portfolio.max_messages",
            config.portfolio.max_messages.to_string(),
            "PILLAR_PORTFOLIO_MAX_MESSAGES",
        ),
        Entry::new("server.bind_address", &config.server.bind_address, "PILLAR_SERVER_BIND_ADDRESS"),
        Entry::new("server.port", config.server.port.to_string(), "PILLAR_SERVER_PORT"),
        Entry::new("logging.level", &config.logging.level, "PILLAR_LOGGING_LEVEL"),
        Entry::new("logging.format", format!("{:?}", config.logging.format), "PILLAR_LOGGING_FORMAT"),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["pillar.toml", "config/pillar.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn presence(secret: Option<&SecretString>) -> &'static str {
    match secret {
        Some(secret) if !secret.expose_secret().is_empty() => "<redacted>",
        _ => "<unset>",
    }
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

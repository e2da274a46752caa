use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub search: SearchConfig,
    pub google: GoogleConfig,
    pub airtable: AirtableConfig,
    pub portfolio: PortfolioConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub api_base_url: String,
}

/// Anthropic Messages API settings.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_steps: u32,
    pub max_tool_result_chars: usize,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub tavily_api_key: Option<SecretString>,
    pub base_url: String,
    pub max_results: u32,
}

#[derive(Clone, Debug)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub redirect_url: String,
}

#[derive(Clone, Debug)]
pub struct AirtableConfig {
    pub api_key: Option<SecretString>,
    pub base_id: Option<String>,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct PortfolioConfig {
    pub channel_prefix: String,
    pub default_lookback_hours: u32,
    pub max_lookback_hours: u32,
    pub max_messages: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub server_port: Option<u16>,
    pub portfolio_channel_prefix: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://pillar.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                api_base_url: "https://slack.com/api".to_string(),
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                timeout_secs: 120,
            },
            agent: AgentConfig { max_steps: 5, max_tool_result_chars: 50_000 },
            search: SearchConfig {
                tavily_api_key: None,
                base_url: "https://api.tavily.com".to_string(),
                max_results: 5,
            },
            google: GoogleConfig {
                client_id: None,
                client_secret: None,
                redirect_url: "http://localhost:8080/oauth/callback".to_string(),
            },
            airtable: AirtableConfig {
                api_key: None,
                base_id: None,
                base_url: "https://api.airtable.com/v0".to_string(),
            },
            portfolio: PortfolioConfig {
                channel_prefix: "portfolio-".to_string(),
                default_lookback_hours: 24,
                max_lookback_hours: 168,
                max_messages: 500,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl GoogleConfig {
    /// Document creation is only offered once both OAuth client halves are present.
    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

impl AirtableConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.base_id.is_some()
    }
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        self.tavily_api_key.is_some()
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pillar.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(app_token) = slack.app_token {
                self.slack.app_token = secret_value(app_token);
            }
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = secret_value(api_key);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_steps) = agent.max_steps {
                self.agent.max_steps = max_steps;
            }
            if let Some(max_tool_result_chars) = agent.max_tool_result_chars {
                self.agent.max_tool_result_chars = max_tool_result_chars;
            }
        }

        if let Some(search) = patch.search {
            if let Some(api_key) = search.tavily_api_key {
                self.search.tavily_api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = search.base_url {
                self.search.base_url = base_url;
            }
            if let Some(max_results) = search.max_results {
                self.search.max_results = max_results;
            }
        }

        if let Some(google) = patch.google {
            if let Some(client_id) = google.client_id {
                self.google.client_id = Some(client_id);
            }
            if let Some(client_secret) = google.client_secret {
                self.google.client_secret = Some(secret_value(client_secret));
            }
            if let Some(redirect_url) = google.redirect_url {
                self.google.redirect_url = redirect_url;
            }
        }

        if let Some(airtable) = patch.airtable {
            if let Some(api_key) = airtable.api_key {
                self.airtable.api_key = Some(secret_value(api_key));
            }
            if let Some(base_id) = airtable.base_id {
                self.airtable.base_id = Some(base_id);
            }
            if let Some(base_url) = airtable.base_url {
                self.airtable.base_url = base_url;
            }
        }

        if let Some(portfolio) = patch.portfolio {
            if let Some(channel_prefix) = portfolio.channel_prefix {
                self.portfolio.channel_prefix = channel_prefix;
            }
            if let Some(hours) = portfolio.default_lookback_hours {
                self.portfolio.default_lookback_hours = hours;
            }
            if let Some(hours) = portfolio.max_lookback_hours {
                self.portfolio.max_lookback_hours = hours;
            }
            if let Some(max_messages) = portfolio.max_messages {
                self.portfolio.max_messages = max_messages;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PILLAR_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PILLAR_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PILLAR_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PILLAR_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PILLAR_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PILLAR_SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env("PILLAR_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("PILLAR_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        if let Some(value) = read_env("PILLAR_LLM_API_KEY") {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("PILLAR_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("PILLAR_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PILLAR_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PILLAR_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PILLAR_AGENT_MAX_STEPS") {
            self.agent.max_steps = parse_u32("PILLAR_AGENT_MAX_STEPS", &value)?;
        }
        if let Some(value) = read_env("PILLAR_AGENT_MAX_TOOL_RESULT_CHARS") {
            self.agent.max_tool_result_chars =
                parse_usize("PILLAR_AGENT_MAX_TOOL_RESULT_CHARS", &value)?;
        }

        if let Some(value) = read_env("PILLAR_SEARCH_TAVILY_API_KEY") {
            self.search.tavily_api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PILLAR_SEARCH_BASE_URL") {
            self.search.base_url = value;
        }
        if let Some(value) = read_env("PILLAR_SEARCH_MAX_RESULTS") {
            self.search.max_results = parse_u32("PILLAR_SEARCH_MAX_RESULTS", &value)?;
        }

        if let Some(value) = read_env("PILLAR_GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(value);
        }
        if let Some(value) = read_env("PILLAR_GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("PILLAR_GOOGLE_REDIRECT_URL") {
            self.google.redirect_url = value;
        }

        if let Some(value) = read_env("PILLAR_AIRTABLE_API_KEY") {
            self.airtable.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PILLAR_AIRTABLE_BASE_ID") {
            self.airtable.base_id = Some(value);
        }
        if let Some(value) = read_env("PILLAR_AIRTABLE_BASE_URL") {
            self.airtable.base_url = value;
        }

        if let Some(value) = read_env("PILLAR_PORTFOLIO_CHANNEL_PREFIX") {
            self.portfolio.channel_prefix = value;
        }
        if let Some(value) = read_env("PILLAR_PORTFOLIO_DEFAULT_LOOKBACK_HOURS") {
            self.portfolio.default_lookback_hours =
                parse_u32("PILLAR_PORTFOLIO_DEFAULT_LOOKBACK_HOURS", &value)?;
        }
        if let Some(value) = read_env("PILLAR_PORTFOLIO_MAX_LOOKBACK_HOURS") {
            self.portfolio.max_lookback_hours =
                parse_u32("PILLAR_PORTFOLIO_MAX_LOOKBACK_HOURS", &value)?;
        }
        if let Some(value) = read_env("PILLAR_PORTFOLIO_MAX_MESSAGES") {
            self.portfolio.max_messages = parse_usize("PILLAR_PORTFOLIO_MAX_MESSAGES", &value)?;
        }

        if let Some(value) = read_env("PILLAR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PILLAR_SERVER_PORT") {
            self.server.port = parse_u16("PILLAR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PILLAR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PILLAR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("PILLAR_LOGGING_LEVEL").or_else(|| read_env("PILLAR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PILLAR_LOGGING_FORMAT").or_else(|| read_env("PILLAR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = secret_value(llm_api_key);
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(prefix) = overrides.portfolio_channel_prefix {
            self.portfolio.channel_prefix = prefix;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_google(&self.google)?;
        validate_airtable(&self.airtable)?;
        validate_portfolio(&self.portfolio)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pillar.toml"), PathBuf::from("config/pillar.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    require_http_url("slack.api_base_url", &slack.api_base_url)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.api_key is required. Create one at https://console.anthropic.com".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    require_http_url("llm.base_url", &llm.base_url)
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_steps == 0 {
        return Err(ConfigError::Validation(
            "agent.max_steps must be greater than zero".to_string(),
        ));
    }

    if agent.max_tool_result_chars == 0 {
        return Err(ConfigError::Validation(
            "agent.max_tool_result_chars must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_google(google: &GoogleConfig) -> Result<(), ConfigError> {
    if google.client_id.is_some() != google.client_secret.is_some() {
        return Err(ConfigError::Validation(
            "google.client_id and google.client_secret must be set together".to_string(),
        ));
    }

    require_http_url("google.redirect_url", &google.redirect_url)
}

fn validate_airtable(airtable: &AirtableConfig) -> Result<(), ConfigError> {
    if airtable.api_key.is_some() && airtable.base_id.is_none() {
        return Err(ConfigError::Validation(
            "airtable.base_id is required when airtable.api_key is set".to_string(),
        ));
    }

    require_http_url("airtable.base_url", &airtable.base_url)
}

fn validate_portfolio(portfolio: &PortfolioConfig) -> Result<(), ConfigError> {
    if portfolio.channel_prefix.trim().is_empty() {
        return Err(ConfigError::Validation(
            "portfolio.channel_prefix must not be empty".to_string(),
        ));
    }

    if portfolio.default_lookback_hours == 0 {
        return Err(ConfigError::Validation(
            "portfolio.default_lookback_hours must be greater than zero".to_string(),
        ));
    }

    if portfolio.max_lookback_hours < portfolio.default_lookback_hours {
        return Err(ConfigError::Validation(
            "portfolio.max_lookback_hours must be at least portfolio.default_lookback_hours"
                .to_string(),
        ));
    }

    if portfolio.max_messages == 0 {
        return Err(ConfigError::Validation(
            "portfolio.max_messages must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn require_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    search: Option<SearchPatch>,
    google: Option<GooglePatch>,
    airtable: Option<AirtablePatch>,
    portfolio: Option<PortfolioPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_steps: Option<u32>,
    max_tool_result_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    tavily_api_key: Option<String>,
    base_url: Option<String>,
    max_results: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct GooglePatch {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AirtablePatch {
    api_key: Option<String>,
    base_id: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PortfolioPatch {
    channel_prefix: Option<String>,
    default_lookback_hours: Option<u32>,
    max_lookback_hours: Option<u32>,
    max_messages: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

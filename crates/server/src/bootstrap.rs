use std::sync::Arc;

use pillar_agent::{
    pillar_tools, AgentError, AgentRuntime, AgentServices, AnthropicClient, ContentGenerator,
    LlmClient, LlmError, PromptLibrary, ResearchService,
};
use pillar_core::config::{AppConfig, ConfigError, LoadOptions};
use pillar_db::repositories::{
    SqlActivityRepository, SqlAgendaRepository, SqlCredentialRepository,
    SqlSummaryCacheRepository,
};
use pillar_db::{connect_with_settings, migrations, DbPool};
use pillar_integrations::{
    AirtableClient, DocumentService, GoogleDocsClient, IntegrationError, RecordsService,
    SearchProvider, SlackFileReader, TavilyClient, WebClient,
};
use pillar_slack::{
    pillar_dispatcher, ChatGateway, ReconnectPolicy, SlackApiError, SlackWebClient,
    SocketModeRunner, WebSocketTransport,
};
use thiserror::Error;
use tracing::info;

use crate::services::PillarService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub documents: Option<Arc<dyn DocumentService>>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("slack client setup failed: {0}")]
    Slack(#[from] SlackApiError),
    #[error("model client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("agent setup failed: {0}")]
    Agent(#[from] AgentError),
    #[error("integration setup failed: {0}")]
    Integration(#[from] IntegrationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let gateway: Arc<dyn ChatGateway> = Arc::new(SlackWebClient::new(
        &config.slack.api_base_url,
        config.slack.bot_token.clone(),
        config.portfolio.max_messages,
    )?);

    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::from_config(&config.llm)?);
    let prompts = Arc::new(PromptLibrary::load()?);

    let research = TavilyClient::from_config(&config.search)?.map(|search| {
        let search: Arc<dyn SearchProvider> = Arc::new(search);
        Arc::new(ResearchService::new(search, llm.clone(), prompts.clone()))
    });
    let credentials = Arc::new(SqlCredentialRepository::new(db_pool.clone()));
    let documents = GoogleDocsClient::from_config(&config.google, credentials)?
        .map(|client| Arc::new(client) as Arc<dyn DocumentService>);
    let records = AirtableClient::from_config(&config.airtable)?
        .map(|client| Arc::new(client) as Arc<dyn RecordsService>);
    info!(
        event_name = "system.bootstrap.integrations",
        correlation_id = "bootstrap",
        search = research.is_some(),
        google_docs = documents.is_some(),
        airtable = records.is_some(),
        "optional integrations resolved"
    );

    let agenda = Arc::new(SqlAgendaRepository::new(db_pool.clone()));
    let agent_services = AgentServices {
        gateway: gateway.clone(),
        agenda: agenda.clone(),
        files: Arc::new(SlackFileReader::new(gateway.clone())),
        pages: Arc::new(WebClient::new()?),
        research,
        portfolio_prefix: config.portfolio.channel_prefix.clone(),
    };
    let agent =
        AgentRuntime::new(llm.clone(), Arc::new(pillar_tools()), prompts.clone(), &config.agent)?;

    let service = Arc::new(PillarService {
        gateway: gateway.clone(),
        activity: Arc::new(SqlActivityRepository::new(db_pool.clone())),
        agenda,
        summaries: Arc::new(SqlSummaryCacheRepository::new(db_pool.clone())),
        documents: documents.clone(),
        records,
        content: ContentGenerator::new(llm, prompts),
        agent,
        agent_services,
        portfolio: config.portfolio.clone(),
    });

    let transport =
        Arc::new(WebSocketTransport::new(&config.slack.api_base_url, config.slack.app_token.clone())?);
    let slack_runner =
        SocketModeRunner::new(transport, pillar_dispatcher(service), ReconnectPolicy::default())
            .with_replies(gateway);
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        "slack runner assembled"
    );

    Ok(Application { config, db_pool, documents, slack_runner })
}

#[cfg(test)]
mod tests {
    use pillar_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str, app_token: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                slack_app_token: Some(app_token.to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                llm_api_key: Some("sk-ant-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_socket_mode_token() {
        let result = bootstrap(overrides("sqlite::memory:", "not-an-app-token")).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_assembles_the_runner() {
        let app = bootstrap(overrides("sqlite::memory:", "xapp-test")).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('user_activity', 'oauth_token', 'agenda_item', 'summary_cache')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("table count");
        assert_eq!(table_count, 4);
        assert!(app.documents.is_none());

        app.db_pool.close().await;
    }
}

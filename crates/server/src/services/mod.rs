//! The assistant's behaviour behind every Slack entry point.
//!
//! `PillarService` implements all four handler seams from `pillar-slack`, so
//! one `Arc` feeds the whole dispatcher. Slash commands live in `commands`,
//! @mentions in `mentions`, and passive channel events plus Block Kit
//! interactions in `events`.

mod commands;
mod events;
mod mentions;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use pillar_agent::{AgentError, AgentRuntime, AgentServices, ContentGenerator, CATCHUP_CONTEXT};
use pillar_core::config::PortfolioConfig;
use pillar_core::domain::activity::UserActivity;
use pillar_core::domain::portfolio::CompanyRecord;
use pillar_core::domain::summary::SummaryCacheEntry;
use pillar_core::period::{period_label, CatchupWindow};
use pillar_db::repositories::{
    ActivityRepository, AgendaRepository, RepositoryError, SummaryCacheRepository,
};
use pillar_integrations::{DocumentService, IntegrationError, RecordsService};
use pillar_slack::blocks::{error_message, google_auth_prompt, loading_message, summary_message};
use pillar_slack::{
    ChatGateway, CommandEnvelope, CommandRouteError, MessageTemplate, SlackApiError,
};

pub(crate) const NO_MESSAGES: &str = "No messages found in the specified time period.";
pub(crate) const ALL_CAUGHT_UP: &str =
    "You're all caught up! No new messages since your last visit.";
pub(crate) const GOOGLE_NOT_CONFIGURED: &str =
    "Google Docs is not configured. Ask an admin to set the Google OAuth client credentials.";

pub struct PillarService {
    pub gateway: Arc<dyn ChatGateway>,
    pub activity: Arc<dyn ActivityRepository>,
    pub agenda: Arc<dyn AgendaRepository>,
    pub summaries: Arc<dyn SummaryCacheRepository>,
    pub documents: Option<Arc<dyn DocumentService>>,
    pub records: Option<Arc<dyn RecordsService>>,
    pub content: ContentGenerator,
    pub agent: AgentRuntime,
    pub agent_services: AgentServices,
    pub portfolio: PortfolioConfig,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl From<ServiceError> for CommandRouteError {
    fn from(error: ServiceError) -> Self {
        CommandRouteError::Service(error.to_string())
    }
}

/// Outcome of checking whether a user can write Google Docs.
pub(crate) enum DocumentAccess<'a> {
    Ready(&'a dyn DocumentService),
    Reply(MessageTemplate),
}

impl PillarService {
    /// Progress note sent through the slash command's response URL. Failing
    /// to send it never stops the command.
    pub(crate) async fn send_loading(&self, envelope: &CommandEnvelope, action: &str) {
        let Some(response_url) = envelope.response_url.as_deref() else {
            return;
        };
        if let Err(error) = self.gateway.respond(response_url, &loading_message(action)).await {
            warn!(
                event_name = "pillar.command.loading_failed",
                correlation_id = %envelope.request_id,
                error = %error,
                "could not post loading message"
            );
        }
    }

    pub(crate) async fn touch_user(&self, user_id: &str) {
        let activity = UserActivity::new(user_id, Utc::now());
        if let Err(error) = self.activity.record_activity(activity).await {
            warn!(user_id, error = %error, "could not record user activity");
        }
    }

    pub(crate) async fn channel_label(&self, channel_id: &str) -> String {
        self.gateway.channel_name(channel_id).await.unwrap_or_else(|error| {
            debug!(channel_id, error = %error, "channel name lookup failed");
            channel_id.to_string()
        })
    }

    /// Summary of the last `hours` of a channel. Identical message windows
    /// reuse the stored summary instead of asking the model again.
    pub(crate) async fn summarize_channel(
        &self,
        channel_id: &str,
        user_id: &str,
        hours: u32,
    ) -> Result<MessageTemplate, ServiceError> {
        let messages = self.gateway.channel_history(channel_id, hours).await?;
        let (Some(first), Some(last)) = (messages.first(), messages.last()) else {
            return Ok(error_message(NO_MESSAGES));
        };
        let (period_start, period_end) = (first.posted_at, last.posted_at);

        let cached = self.summaries.find(channel_id, period_start, period_end).await.unwrap_or_else(
            |error| {
                warn!(channel_id, error = %error, "summary cache lookup failed");
                None
            },
        );

        let summary = match cached {
            Some(entry) => {
                debug!(channel_id, "summary served from cache");
                entry.summary
            }
            None => {
                let summary = self.content.summarize(&messages, None).await?;
                let entry = SummaryCacheEntry {
                    channel_id: channel_id.to_string(),
                    period_start,
                    period_end,
                    summary: summary.clone(),
                    created_at: Utc::now(),
                };
                if let Err(error) = self.summaries.save(entry).await {
                    warn!(channel_id, error = %error, "could not cache summary");
                }
                summary
            }
        };

        let channel_name = self.channel_label(channel_id).await;
        self.touch_user(user_id).await;
        Ok(summary_message(&channel_name, &period_label(hours), &summary))
    }

    /// Personal summary of everything since the user was last seen.
    pub(crate) async fn catch_up(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<MessageTemplate, ServiceError> {
        let last_active = self.activity.last_active(user_id).await?;
        let window =
            CatchupWindow::since(last_active, Utc::now(), self.portfolio.max_lookback_hours);

        let messages = self.gateway.channel_history(channel_id, window.hours).await?;
        if messages.is_empty() {
            return Ok(MessageTemplate::text(ALL_CAUGHT_UP));
        }

        let summary = self.content.summarize(&messages, Some(CATCHUP_CONTEXT)).await?;
        let channel_name = self.channel_label(channel_id).await;
        self.touch_user(user_id).await;
        Ok(summary_message(&channel_name, &window.label, &summary))
    }

    /// Airtable row for a company when records are configured. Lookup
    /// failures degrade to "no record".
    pub(crate) async fn company_record(&self, company: &str) -> Option<CompanyRecord> {
        let records = self.records.as_ref()?;
        match records.find_company(company).await {
            Ok(record) => record,
            Err(error) => {
                warn!(company, error = %error, "company record lookup failed");
                None
            }
        }
    }

    pub(crate) async fn document_access(
        &self,
        user_id: &str,
    ) -> Result<DocumentAccess<'_>, ServiceError> {
        let Some(documents) = self.documents.as_deref() else {
            return Ok(DocumentAccess::Reply(error_message(GOOGLE_NOT_CONFIGURED)));
        };
        if !documents.is_authenticated(user_id).await? {
            let url = documents.authorization_url(user_id);
            return Ok(DocumentAccess::Reply(google_auth_prompt(&url)));
        }
        Ok(DocumentAccess::Ready(documents))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use pillar_agent::{
        pillar_tools, AgentRuntime, AgentServices, ContentGenerator, LlmClient, LlmError,
        ModelRequest, ModelResponse, PromptLibrary,
    };
    use pillar_core::config::{AgentConfig, PortfolioConfig};
    use pillar_core::domain::chat::{ChatFile, ChatMessage};
    use pillar_core::domain::portfolio::CompanyRecord;
    use pillar_db::repositories::{
        InMemoryActivityRepository, InMemoryAgendaRepository, InMemorySummaryCacheRepository,
    };
    use pillar_integrations::{
        CreatedDocument, DocumentService, FileExtractor, IntegrationError, PageFetcher,
        RecordsService,
    };
    use pillar_slack::{ChannelSummary, ChatGateway, MessageTemplate, ModalView, SlackApiError};

    use super::PillarService;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Posted {
        pub channel_id: String,
        pub text: String,
        pub thread_ts: Option<String>,
    }

    #[derive(Default)]
    pub(crate) struct FakeSlack {
        pub channels: Vec<ChannelSummary>,
        pub histories: HashMap<String, Vec<ChatMessage>>,
        pub parents: HashMap<String, ChatMessage>,
        pub posted: Mutex<Vec<Posted>>,
        pub responded: Mutex<Vec<String>>,
        pub views: Mutex<Vec<(String, ModalView)>>,
    }

    impl FakeSlack {
        pub fn with_channel(mut self, id: &str, name: &str, messages: Vec<ChatMessage>) -> Self {
            self.channels.push(ChannelSummary { id: id.to_string(), name: name.to_string() });
            self.histories.insert(id.to_string(), messages);
            self
        }

        pub fn posted(&self) -> Vec<Posted> {
            self.posted.lock().expect("posted lock").clone()
        }

        pub fn responded(&self) -> Vec<String> {
            self.responded.lock().expect("responded lock").clone()
        }
    }

    #[async_trait]
    impl ChatGateway for FakeSlack {
        async fn channel_history(
            &self,
            channel_id: &str,
            _hours: u32,
        ) -> Result<Vec<ChatMessage>, SlackApiError> {
            Ok(self.histories.get(channel_id).cloned().unwrap_or_default())
        }

        async fn thread_parent(
            &self,
            _channel_id: &str,
            thread_ts: &str,
        ) -> Result<Option<ChatMessage>, SlackApiError> {
            Ok(self.parents.get(thread_ts).cloned())
        }

        async fn user_name(&self, user_id: &str) -> String {
            match user_id {
                "U2" => "Dana".to_string(),
                other => other.to_string(),
            }
        }

        async fn channel_name(&self, channel_id: &str) -> Result<String, SlackApiError> {
            self.channels
                .iter()
                .find(|channel| channel.id == channel_id)
                .map(|channel| channel.name.clone())
                .ok_or_else(|| SlackApiError::Api {
                    method: "conversations.info".to_string(),
                    error: "channel_not_found".to_string(),
                })
        }

        async fn list_channels(&self) -> Result<Vec<ChannelSummary>, SlackApiError> {
            Ok(self.channels.clone())
        }

        async fn post_message(
            &self,
            channel_id: &str,
            message: &MessageTemplate,
            thread_ts: Option<&str>,
        ) -> Result<(), SlackApiError> {
            self.posted.lock().expect("posted lock").push(Posted {
                channel_id: channel_id.to_string(),
                text: message.visible_text(),
                thread_ts: thread_ts.map(str::to_string),
            });
            Ok(())
        }

        async fn respond(
            &self,
            _response_url: &str,
            message: &MessageTemplate,
        ) -> Result<(), SlackApiError> {
            self.responded.lock().expect("responded lock").push(message.visible_text());
            Ok(())
        }

        async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError> {
            Ok(format!("D-{user_id}"))
        }

        async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError> {
            self.views.lock().expect("views lock").push((trigger_id.to_string(), view.clone()));
            Ok(())
        }

        async fn download_file(&self, _url: &str) -> Result<Vec<u8>, SlackApiError> {
            Ok(Vec::new())
        }
    }

    /// Answers every model call with the next queued text, then with `"ok"`.
    #[derive(Default)]
    pub(crate) struct QueuedLlm {
        pub answers: Mutex<VecDeque<String>>,
        pub requests: Mutex<Vec<ModelRequest>>,
    }

    impl QueuedLlm {
        pub fn answering(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().map(|answer| answer.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().expect("requests lock").len()
        }

        pub fn prompt_text(&self, index: usize) -> String {
            let requests = self.requests.lock().expect("requests lock");
            serde_json::to_string(&requests[index].turns).expect("serialize turns")
        }
    }

    #[async_trait]
    impl LlmClient for QueuedLlm {
        async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, LlmError> {
            self.requests.lock().expect("requests lock").push(request);
            let answer =
                self.answers.lock().expect("answers lock").pop_front().unwrap_or_else(|| "ok".to_string());
            Ok(ModelResponse::text(answer))
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeDocs {
        pub authenticated: bool,
        pub fail: bool,
        pub created: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DocumentService for FakeDocs {
        fn authorization_url(&self, user_id: &str) -> String {
            format!("https://accounts.test/auth?state={user_id}")
        }

        async fn is_authenticated(&self, _user_id: &str) -> Result<bool, IntegrationError> {
            Ok(self.authenticated)
        }

        async fn exchange_code(&self, _user_id: &str, _code: &str) -> Result<(), IntegrationError> {
            Ok(())
        }

        async fn create_document(
            &self,
            _user_id: &str,
            title: &str,
            content: &str,
        ) -> Result<CreatedDocument, IntegrationError> {
            if self.fail {
                return Err(IntegrationError::Status {
                    service: "google",
                    status: 403,
                    body: "forbidden".to_string(),
                });
            }
            self.created.lock().expect("created lock").push((title.to_string(), content.to_string()));
            Ok(CreatedDocument {
                document_id: "doc-1".to_string(),
                title: title.to_string(),
                url: "https://docs.google.com/document/d/doc-1/edit".to_string(),
            })
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeRecords {
        pub companies: Vec<CompanyRecord>,
    }

    #[async_trait]
    impl RecordsService for FakeRecords {
        async fn find_company(&self, name: &str) -> Result<Option<CompanyRecord>, IntegrationError> {
            Ok(self
                .companies
                .iter()
                .find(|company| company.name.eq_ignore_ascii_case(name))
                .cloned())
        }

        async fn list_companies(&self) -> Result<Vec<CompanyRecord>, IntegrationError> {
            Ok(self.companies.clone())
        }

        async fn pipeline_deals(
            &self,
            _status: Option<&str>,
        ) -> Result<Vec<pillar_core::domain::portfolio::PipelineDeal>, IntegrationError> {
            Ok(Vec::new())
        }
    }

    struct NoFiles;

    #[async_trait]
    impl FileExtractor for NoFiles {
        async fn extract_text(&self, _file: &ChatFile) -> Result<Option<String>, IntegrationError> {
            Ok(None)
        }
    }

    struct NoPages;

    #[async_trait]
    impl PageFetcher for NoPages {
        async fn fetch_text(&self, _url: &str) -> Result<String, IntegrationError> {
            Err(IntegrationError::Status { service: "web", status: 404, body: String::new() })
        }
    }

    pub(crate) struct Harness {
        pub service: Arc<PillarService>,
        pub slack: Arc<FakeSlack>,
        pub llm: Arc<QueuedLlm>,
        pub agenda: Arc<InMemoryAgendaRepository>,
        pub activity: Arc<InMemoryActivityRepository>,
    }

    pub(crate) struct HarnessBuilder {
        slack: FakeSlack,
        llm: QueuedLlm,
        docs: Option<FakeDocs>,
        records: Option<FakeRecords>,
    }

    impl HarnessBuilder {
        pub fn new(slack: FakeSlack) -> Self {
            Self { slack, llm: QueuedLlm::default(), docs: None, records: None }
        }

        pub fn llm(mut self, llm: QueuedLlm) -> Self {
            self.llm = llm;
            self
        }

        pub fn docs(mut self, docs: FakeDocs) -> Self {
            self.docs = Some(docs);
            self
        }

        pub fn records(mut self, records: FakeRecords) -> Self {
            self.records = Some(records);
            self
        }

        pub fn build(self) -> Harness {
            let slack = Arc::new(self.slack);
            let llm = Arc::new(self.llm);
            let agenda = Arc::new(InMemoryAgendaRepository::default());
            let activity = Arc::new(InMemoryActivityRepository::default());
            let prompts = Arc::new(PromptLibrary::load().expect("templates"));
            let portfolio = PortfolioConfig {
                channel_prefix: "portfolio-".to_string(),
                default_lookback_hours: 24,
                max_lookback_hours: 168,
                max_messages: 100,
            };
            let agent_services = AgentServices {
                gateway: slack.clone(),
                agenda: agenda.clone(),
                files: Arc::new(NoFiles),
                pages: Arc::new(NoPages),
                research: None,
                portfolio_prefix: portfolio.channel_prefix.clone(),
            };
            let agent = AgentRuntime::new(
                llm.clone(),
                Arc::new(pillar_tools()),
                prompts.clone(),
                &AgentConfig { max_steps: 3, max_tool_result_chars: 4000 },
            )
            .expect("agent runtime");

            let service = Arc::new(PillarService {
                gateway: slack.clone(),
                activity: activity.clone(),
                agenda: agenda.clone(),
                summaries: Arc::new(InMemorySummaryCacheRepository::default()),
                documents: self.docs.map(|docs| Arc::new(docs) as Arc<dyn DocumentService>),
                records: self.records.map(|records| Arc::new(records) as Arc<dyn RecordsService>),
                content: ContentGenerator::new(llm.clone(), prompts),
                agent,
                agent_services,
                portfolio,
            });

            Harness { service, slack, llm, agenda, activity }
        }
    }

    pub(crate) fn message(user: &str, text: &str, minutes_ago: i64) -> ChatMessage {
        let posted_at = Utc::now() - Duration::minutes(minutes_ago);
        ChatMessage {
            user_id: Some(format!("U-{user}")),
            user_name: user.to_string(),
            text: text.to_string(),
            ts: format!("{}.000100", posted_at.timestamp()),
            posted_at,
            files: Vec::new(),
        }
    }
}

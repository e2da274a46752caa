use std::collections::HashMap;
use std::sync::Arc;

use pillar_core::domain::chat::ChatFile;
use pillar_db::repositories::AgendaRepository;
use pillar_integrations::{FileExtractor, PageFetcher};
use pillar_slack::ChatGateway;

use crate::research::ResearchService;

/// Collaborators every tool can reach. Built once at startup and shared by
/// all runs.
#[derive(Clone)]
pub struct AgentServices {
    pub gateway: Arc<dyn ChatGateway>,
    pub agenda: Arc<dyn AgendaRepository>,
    pub files: Arc<dyn FileExtractor>,
    pub pages: Arc<dyn PageFetcher>,
    pub research: Option<Arc<ResearchService>>,
    pub portfolio_prefix: String,
}

/// Per-run state handed to every tool executor. Dropped when the run ends.
pub struct AgentContext {
    pub channel_id: String,
    pub user_id: String,
    pub files: Vec<ChatFile>,
    pub urls: Vec<String>,
    pub parent_message: Option<String>,
    /// Files seen by `get_channel_history`, keyed by lower-cased full name and
    /// by lower-cased name without extension.
    pub file_cache: HashMap<String, ChatFile>,
    pub services: AgentServices,
}

impl AgentContext {
    pub fn new(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        services: AgentServices,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            files: Vec::new(),
            urls: Vec::new(),
            parent_message: None,
            file_cache: HashMap::new(),
            services,
        }
    }

    pub fn remember_file(&mut self, file: &ChatFile) {
        self.file_cache.insert(file.name.to_lowercase(), file.clone());
        self.file_cache.insert(file.base_name(), file.clone());
    }

    /// Exact cache hit first, then a substring match in either direction.
    pub fn cached_file(&self, wanted: &str) -> Option<&ChatFile> {
        let wanted = wanted.to_lowercase();
        if let Some(file) = self.file_cache.get(&wanted) {
            return Some(file);
        }

        let mut keys: Vec<&String> = self.file_cache.keys().collect();
        keys.sort();
        keys.into_iter()
            .find(|key| key.contains(wanted.as_str()) || wanted.contains(key.as_str()))
            .and_then(|key| self.file_cache.get(key))
    }

    /// The situation block that opens every agent transcript.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(parent) = &self.parent_message {
            parts.push(format!("User is replying to this message: \"{parent}\""));
        }
        if !self.files.is_empty() {
            let names: Vec<&str> = self.files.iter().map(|file| file.name.as_str()).collect();
            parts.push(format!("Files attached: {}", names.join(", ")));
        }
        if !self.urls.is_empty() {
            parts.push(format!("URLs in message: {}", self.urls.join(", ")));
        }

        if parts.is_empty() {
            "No files or URLs in the current message.".to_string()
        } else {
            parts.join("\n")
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use pillar_core::domain::chat::{ChatFile, ChatMessage};
    use pillar_db::repositories::InMemoryAgendaRepository;
    use pillar_integrations::{FileExtractor, IntegrationError, PageFetcher};
    use pillar_slack::{ChannelSummary, ChatGateway, MessageTemplate, ModalView, SlackApiError};

    use super::{AgentContext, AgentServices};

    /// Chat gateway backed by fixed channel histories.
    #[derive(Default)]
    pub(crate) struct FakeGateway {
        pub(crate) channels: Vec<ChannelSummary>,
        pub(crate) histories: HashMap<String, Vec<ChatMessage>>,
        pub(crate) history_calls: Mutex<Vec<(String, u32)>>,
    }

    #[async_trait]
    impl ChatGateway for FakeGateway {
        async fn channel_history(
            &self,
            channel_id: &str,
            hours: u32,
        ) -> Result<Vec<ChatMessage>, SlackApiError> {
            self.history_calls.lock().expect("lock").push((channel_id.to_string(), hours));
            Ok(self.histories.get(channel_id).cloned().unwrap_or_default())
        }

        async fn thread_parent(
            &self,
            _channel_id: &str,
            _thread_ts: &str,
        ) -> Result<Option<ChatMessage>, SlackApiError> {
            Ok(None)
        }

        async fn user_name(&self, user_id: &str) -> String {
            user_id.to_string()
        }

        async fn channel_name(&self, channel_id: &str) -> Result<String, SlackApiError> {
            Ok(channel_id.to_string())
        }

        async fn list_channels(&self) -> Result<Vec<ChannelSummary>, SlackApiError> {
            Ok(self.channels.clone())
        }

        async fn post_message(
            &self,
            _channel_id: &str,
            _message: &MessageTemplate,
            _thread_ts: Option<&str>,
        ) -> Result<(), SlackApiError> {
            Ok(())
        }

        async fn respond(
            &self,
            _response_url: &str,
            _message: &MessageTemplate,
        ) -> Result<(), SlackApiError> {
            Ok(())
        }

        async fn open_dm(&self, user_id: &str) -> Result<String, SlackApiError> {
            Ok(format!("D{user_id}"))
        }

        async fn open_view(&self, _trigger_id: &str, _view: &ModalView) -> Result<(), SlackApiError> {
            Ok(())
        }

        async fn download_file(&self, _url: &str) -> Result<Vec<u8>, SlackApiError> {
            Ok(Vec::new())
        }
    }

    /// Returns canned text per file name; unknown names extract nothing.
    #[derive(Default)]
    pub(crate) struct FakeFiles {
        pub(crate) texts: HashMap<String, String>,
    }

    #[async_trait]
    impl FileExtractor for FakeFiles {
        async fn extract_text(&self, file: &ChatFile) -> Result<Option<String>, IntegrationError> {
            Ok(self.texts.get(&file.name).cloned())
        }
    }

    #[derive(Default)]
    pub(crate) struct FakePages {
        pub(crate) pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for FakePages {
        async fn fetch_text(&self, url: &str) -> Result<String, IntegrationError> {
            self.pages.get(url).cloned().ok_or(IntegrationError::Status {
                service: "web",
                status: 404,
                body: String::new(),
            })
        }
    }

    pub(crate) fn services_with(
        gateway: FakeGateway,
        files: FakeFiles,
        pages: FakePages,
    ) -> (AgentServices, Arc<InMemoryAgendaRepository>) {
        let agenda = Arc::new(InMemoryAgendaRepository::default());
        let services = AgentServices {
            gateway: Arc::new(gateway),
            agenda: agenda.clone(),
            files: Arc::new(files),
            pages: Arc::new(pages),
            research: None,
            portfolio_prefix: "portfolio-".to_string(),
        };
        (services, agenda)
    }

    pub(crate) fn context_with(services: AgentServices) -> AgentContext {
        AgentContext::new("C1", "U1", services)
    }
}

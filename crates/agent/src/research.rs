use std::sync::Arc;

use tera::Context;
use tracing::warn;

use pillar_integrations::{format_hits, SearchProvider};

use crate::content::PromptLibrary;
use crate::llm::LlmClient;
use crate::AgentError;

const RESEARCH_MAX_TOKENS: u32 = 1500;
const NO_RESULTS: &str = "No results found.";

/// Answers questions from live web search results.
pub struct ResearchService {
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl ResearchService {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
    ) -> Self {
        Self { search, llm, prompts }
    }

    pub async fn answer(&self, question: &str) -> Result<String, AgentError> {
        let results = match self.search.search(question).await {
            Ok(hits) if hits.is_empty() => return Ok(not_found(NO_RESULTS)),
            Ok(hits) => format_hits(&hits),
            Err(error) => {
                warn!(error = %error, "web search failed");
                return Ok(not_found(&format!("Search error: {error}")));
            }
        };

        let mut context = Context::new();
        context.insert("question", question);
        context.insert("results", &results);
        let prompt = self.prompts.render("research.txt", &context)?;
        Ok(self.llm.prompt(prompt, RESEARCH_MAX_TOKENS).await?)
    }
}

fn not_found(detail: &str) -> String {
    format!("I couldn't find information about that. Search returned: {detail}")
}

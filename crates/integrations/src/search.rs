use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use pillar_core::config::SearchConfig;

use crate::error::{read_json, IntegrationError};

const SERVICE: &str = "tavily";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub content: String,
    pub url: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, IntegrationError>;
}

pub struct TavilyClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    max_results: u32,
}

impl TavilyClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        max_results: u32,
    ) -> Result<Self, IntegrationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| IntegrationError::http(SERVICE, error))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            max_results: max_results.max(1),
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &SearchConfig) -> Result<Option<Self>, IntegrationError> {
        match &config.tavily_api_key {
            Some(key) => Self::new(&config.base_url, key.clone(), config.max_results).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, IntegrationError> {
        let body = json!({
            "api_key": self.api_key.expose_secret(),
            "query": query,
            "search_depth": "basic",
            "max_results": self.max_results,
        });
        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|error| IntegrationError::http(SERVICE, error))?;
        let data = read_json(SERVICE, response).await?;

        let text = |value: &Value, key: &str| value[key].as_str().unwrap_or_default().to_string();
        Ok(data["results"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|hit| SearchHit {
                title: text(hit, "title"),
                content: text(hit, "content"),
                url: text(hit, "url"),
            })
            .collect())
    }
}

/// Search hits as the prompt block handed to the model.
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("Title: {}\nContent: {}\nSource: {}", hit.title, hit.content, hit.url))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{format_hits, SearchHit, SearchProvider, TavilyClient};

    #[tokio::test]
    async fn basic_search_returns_hits_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({"query": "acme series b", "search_depth": "basic", "max_results": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "Acme raises", "content": "Acme closed a $40M B.", "url": "https://news.test/acme"},
                    {"title": "Acme blog", "content": "We are hiring.", "url": "https://acme.test/blog"}
                ]
            })))
            .mount(&server)
            .await;

        let client =
            TavilyClient::new(server.uri(), "tvly-test".to_string().into(), 5).expect("client");
        let hits = client.search("acme series b").await.expect("search");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Acme raises");
        assert_eq!(hits[1].url, "https://acme.test/blog");
    }

    #[tokio::test]
    async fn upstream_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client =
            TavilyClient::new(server.uri(), "tvly-test".to_string().into(), 5).expect("client");
        let error = client.search("anything").await.unwrap_err();
        assert!(error.to_string().contains("401"));
    }

    #[test]
    fn hits_are_joined_with_separators() {
        let hits = vec![
            SearchHit { title: "A".into(), content: "one".into(), url: "https://a.test".into() },
            SearchHit { title: "B".into(), content: "two".into(), url: "https://b.test".into() },
        ];
        assert_eq!(
            format_hits(&hits),
            "Title: A\nContent: one\nSource: https://a.test\n\n---\n\nTitle: B\nContent: two\nSource: https://b.test"
        );
    }
}

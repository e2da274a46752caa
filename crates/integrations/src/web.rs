//! Page retrieval for links people drop into Slack.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::warn;

use crate::error::IntegrationError;

const SERVICE: &str = "web";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const NOISE_TAGS: &[&str] = &["script", "style", "noscript", "header", "footer", "nav"];

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Readable text of the page at `url`.
    async fn fetch_text(&self, url: &str) -> Result<String, IntegrationError>;
}

pub struct WebClient {
    http: Client,
}

impl WebClient {
    pub fn new() -> Result<Self, IntegrationError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|error| IntegrationError::http(SERVICE, error))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for WebClient {
    async fn fetch_text(&self, url: &str) -> Result<String, IntegrationError> {
        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, ACCEPT)
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|error| {
                warn!(url, error = %error, "page fetch failed");
                IntegrationError::http(SERVICE, error)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntegrationError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = response.text().await.map_err(|error| IntegrationError::http(SERVICE, error))?;

        if content_type.contains("text/plain") || content_type.contains("application/json") {
            Ok(body)
        } else {
            Ok(html_to_text(&body))
        }
    }
}

/// Visible text of an HTML document with page chrome removed and whitespace
/// collapsed to single spaces.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let noise: Vec<Selector> =
        NOISE_TAGS.iter().filter_map(|tag| Selector::parse(tag).ok()).collect();

    let mut parts = Vec::new();
    collect_text(document.root_element(), &noise, &mut parts);
    parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text<'a>(element: ElementRef<'a>, noise: &[Selector], parts: &mut Vec<&'a str>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
            }
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if noise.iter().any(|selector| selector.matches(&child)) {
                    continue;
                }
                collect_text(child, noise, parts);
            }
            _ => {}
        }
    }
}

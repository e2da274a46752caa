//! Outside services the assistant reads from and writes to: Google Docs,
//! Airtable, arbitrary web pages, Tavily search and files shared in Slack.
//!
//! Each service is a trait so the server can run without the optional ones
//! and tests can swap in fakes.

pub mod airtable;
pub mod error;
pub mod files;
pub mod google;
pub mod search;
pub mod web;

pub use airtable::{AirtableClient, RecordsService};
pub use error::IntegrationError;
pub use files::{FileExtractor, SlackFileReader};
pub use google::{CreatedDocument, DocumentService, GoogleDocsClient, GoogleEndpoints};
pub use search::{format_hits, SearchHit, SearchProvider, TavilyClient};
pub use web::{html_to_text, PageFetcher, WebClient};

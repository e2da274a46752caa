use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use pillar_core::domain::chat::ChatFile;
use pillar_slack::ChatGateway;

use crate::error::IntegrationError;

const TEXT_FILETYPES: &[&str] = &["txt", "text", "md", "markdown"];
const WORD_FILETYPES: &[&str] = &["doc", "docx"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileKind {
    Pdf,
    Text,
    Word,
    Unknown,
}

fn classify(file: &ChatFile) -> FileKind {
    let filetype = file.filetype.to_ascii_lowercase();
    if filetype == "pdf" || file.mimetype.to_ascii_lowercase().contains("pdf") {
        FileKind::Pdf
    } else if TEXT_FILETYPES.contains(&filetype.as_str()) {
        FileKind::Text
    } else if WORD_FILETYPES.contains(&filetype.as_str()) {
        FileKind::Word
    } else {
        FileKind::Unknown
    }
}

#[async_trait]
pub trait FileExtractor: Send + Sync {
    /// Text content of a shared file. `Ok(None)` means the file has no
    /// download link or its format is not supported.
    async fn extract_text(&self, file: &ChatFile) -> Result<Option<String>, IntegrationError>;
}

/// Downloads Slack-private files with the bot token and pulls text out of them.
pub struct SlackFileReader {
    gateway: Arc<dyn ChatGateway>,
}

impl SlackFileReader {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl FileExtractor for SlackFileReader {
    async fn extract_text(&self, file: &ChatFile) -> Result<Option<String>, IntegrationError> {
        let Some(url) = file.url_private.as_deref() else {
            return Ok(None);
        };

        let kind = classify(file);
        if kind == FileKind::Word {
            return Ok(None);
        }

        let bytes = self.gateway.download_file(url).await?;
        match kind {
            FileKind::Pdf => pdf_text(bytes).await,
            FileKind::Text | FileKind::Unknown => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            FileKind::Word => Ok(None),
        }
    }
}

async fn pdf_text(bytes: Vec<u8>) -> Result<Option<String>, IntegrationError> {
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|error| IntegrationError::Extraction(error.to_string()))?;

    match extracted {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => Ok(Some(text)),
        Err(error) => {
            warn!(error = %error, "pdf text extraction failed");
            Err(IntegrationError::Extraction(error.to_string()))
        }
    }
}

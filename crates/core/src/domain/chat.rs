use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const IMAGE_FILETYPES: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];
const IMAGE_MIMETYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFile {
    pub id: String,
    pub name: String,
    pub filetype: String,
    pub mimetype: String,
    pub url_private: Option<String>,
    pub size: u64,
}

impl ChatFile {
    pub fn is_image(&self) -> bool {
        let filetype = self.filetype.to_ascii_lowercase();
        IMAGE_FILETYPES.contains(&filetype.as_str())
            || IMAGE_MIMETYPES.contains(&self.mimetype.to_ascii_lowercase().as_str())
    }

    /// Lower-cased file name without its final extension.
    pub fn base_name(&self) -> String {
        let lowered = self.name.to_lowercase();
        match lowered.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => lowered,
        }
    }
}

/// A channel message with mentions already resolved to display names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user_id: Option<String>,
    pub user_name: String,
    pub text: String,
    pub ts: String,
    pub posted_at: DateTime<Utc>,
    pub files: Vec<ChatFile>,
}

impl ChatMessage {
    pub fn timestamp_label(&self) -> String {
        self.posted_at.format("%Y-%m-%d %H:%M").to_string()
    }

    fn file_names(&self) -> String {
        self.files.iter().map(|file| file.name.as_str()).collect::<Vec<_>>().join(", ")
    }

    /// Line fed to content-generation prompts.
    pub fn prompt_line(&self) -> String {
        let mut line = format!("[{}] {}: {}", self.timestamp_label(), self.user_name, self.text);
        if !self.files.is_empty() {
            line.push_str(&format!(" [Attached: {}]", self.file_names()));
        }
        line
    }

    /// Line returned to the model by history tools.
    pub fn history_line(&self) -> String {
        let mut line = format!("[{}] {}: {}", self.timestamp_label(), self.user_name, self.text);
        if !self.files.is_empty() {
            line.push_str(&format!(" [Files: {}]", self.file_names()));
        }
        line
    }
}

pub fn format_transcript(messages: &[ChatMessage]) -> String {
    messages.iter().map(ChatMessage::prompt_line).collect::<Vec<_>>().join("\n")
}

/// Slack `ts` values are fractional unix seconds.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match ts.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (ts, "0"),
    };
    let secs: i64 = secs.parse().ok()?;
    let digits: String = frac.chars().take(9).collect();
    let nanos: u32 = format!("{digits:0<9}").parse().ok()?;
    DateTime::from_timestamp(secs, nanos)
}

pub fn to_slack_ts(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

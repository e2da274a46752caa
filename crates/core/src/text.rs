use std::sync::OnceLock;

use regex::Regex;

pub const TRUNCATION_MARKER: &str = "\n[...truncated...]";

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn mention_pattern() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, r"<@([A-Z0-9]+)>")
}

fn slack_link_pattern() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, r"<(https?://[^|>]+)(?:\|[^>]+)?>")
}

fn bare_url_pattern() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, r"https?://[^\s<>]+")
}

/// Keeps at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Like [`truncate_chars`] but flags the cut with [`TRUNCATION_MARKER`].
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    let kept = truncate_chars(text, max_chars);
    if kept.len() == text.len() {
        text.to_string()
    } else {
        format!("{kept}{TRUNCATION_MARKER}")
    }
}

/// Removes `<@U123>` mention tokens and surrounding whitespace.
pub fn strip_mentions(text: &str) -> String {
    match mention_pattern() {
        Some(pattern) => pattern.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// First user id mentioned as `<@U...>`.
pub fn first_user_mention(text: &str) -> Option<String> {
    let captures = mention_pattern()?.captures(text)?;
    let id = captures.get(1)?.as_str();
    id.starts_with('U').then(|| id.to_string())
}

/// URLs in Slack-formatted text (`<url|label>` links first, then bare URLs),
/// de-duplicated in order of appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();

    if let Some(pattern) = slack_link_pattern() {
        for captures in pattern.captures_iter(text) {
            if let Some(url) = captures.get(1) {
                push_unique(&mut urls, url.as_str());
            }
        }
    }

    if let Some(pattern) = bare_url_pattern() {
        for found in pattern.find_iter(text) {
            let preceded_by_bracket = text[..found.start()].ends_with('<');
            if !preceded_by_bracket {
                push_unique(&mut urls, found.as_str());
            }
        }
    }

    urls
}

pub fn push_unique(values: &mut Vec<String>, candidate: &str) {
    if !values.iter().any(|existing| existing == candidate) {
        values.push(candidate.to_string());
    }
}

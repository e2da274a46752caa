//! Markdown to Slack mrkdwn.
//!
//! Slack renders `*bold*`, `_italic_` and `<url|label>` links and has no
//! headings, so model output written in ordinary Markdown is rewritten before
//! it is posted.

use std::sync::OnceLock;

use regex::Regex;

struct Rewrites {
    heading: Regex,
    bold: Regex,
    link: Regex,
    repeated_stars: Regex,
}

fn rewrites() -> Option<&'static Rewrites> {
    static REWRITES: OnceLock<Option<Rewrites>> = OnceLock::new();
    REWRITES
        .get_or_init(|| {
            Some(Rewrites {
                heading: Regex::new(r"(?m)^#{1,3}\s+(.+)$").ok()?,
                bold: Regex::new(r"\*\*(.+?)\*\*").ok()?,
                link: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").ok()?,
                repeated_stars: Regex::new(r"\*\*+").ok()?,
            })
        })
        .as_ref()
}

pub fn markdown_to_slack(text: &str) -> String {
    let Some(rewrites) = rewrites() else {
        return text.to_string();
    };

    let text = rewrites.heading.replace_all(text, "*$1*");
    let text = rewrites.bold.replace_all(&text, "*$1*");
    let text = rewrites.link.replace_all(&text, "<$2|$1>");
    rewrites.repeated_stars.replace_all(&text, "*").into_owned()
}

/// Cuts `text` into consecutive pieces of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max_chars).map(|chunk| chunk.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::{chunk_text, markdown_to_slack};

    #[test]
    fn headings_become_bold_lines() {
        assert_eq!(markdown_to_slack("# Top\n## Mid\n### Low"), "*Top*\n*Mid*\n*Low*");
        assert_eq!(markdown_to_slack("#### Deep"), "#### Deep");
    }

    #[test]
    fn double_star_bold_is_collapsed() {
        assert_eq!(markdown_to_slack("a **strong** claim"), "a *strong* claim");
        assert_eq!(markdown_to_slack("## **Decisions**"), "*Decisions*");
    }

    #[test]
    fn links_use_angle_bracket_syntax() {
        assert_eq!(
            markdown_to_slack("see [the memo](https://docs.example/memo)"),
            "see <https://docs.example/memo|the memo>"
        );
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(markdown_to_slack("- item one\n- `code`"), "- item one\n- `code`");
    }

    #[test]
    fn chunks_are_character_based() {
        assert_eq!(chunk_text("ééééé", 2), vec!["éé", "éé", "é"]);
        assert!(chunk_text("", 10).is_empty());
        assert_eq!(chunk_text("abc", 10), vec!["abc"]);
    }
}

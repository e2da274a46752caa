//! Lookback windows expressed in whole hours.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;

pub const HOURS_PER_DAY: u32 = 24;
pub const HOURS_PER_WEEK: u32 = 168;

struct PeriodPatterns {
    days: Regex,
    hours: Regex,
    weeks: Regex,
}

fn patterns() -> Option<&'static PeriodPatterns> {
    static PATTERNS: OnceLock<Option<PeriodPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(PeriodPatterns {
                days: Regex::new(r"(\d+)\s*d(?:ays?)?").ok()?,
                hours: Regex::new(r"(\d+)\s*h(?:ours?)?").ok()?,
                weeks: Regex::new(r"(\d+)\s*w(?:eeks?)?").ok()?,
            })
        })
        .as_ref()
}

fn capture_number(pattern: &Regex, text: &str) -> Option<u32> {
    pattern.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Reads a lookback such as `3 days`, `12h`, `2 weeks`, `today`, `this week` or
/// `yesterday`. The first form found wins, checked in that order.
pub fn parse_time_period(text: &str) -> Option<u32> {
    let text = text.to_lowercase();
    let patterns = patterns()?;

    if let Some(days) = capture_number(&patterns.days, &text) {
        return Some(days.saturating_mul(HOURS_PER_DAY));
    }
    if let Some(hours) = capture_number(&patterns.hours, &text) {
        return Some(hours);
    }
    if let Some(weeks) = capture_number(&patterns.weeks, &text) {
        return Some(weeks.saturating_mul(HOURS_PER_WEEK));
    }
    if text.contains("today") {
        return Some(HOURS_PER_DAY);
    }
    if text.contains("this week") {
        return Some(HOURS_PER_WEEK);
    }
    if text.contains("yesterday") {
        return Some(2 * HOURS_PER_DAY);
    }

    None
}

pub fn period_label(hours: u32) -> String {
    if hours <= HOURS_PER_DAY {
        format!("last {hours} hours")
    } else if hours <= HOURS_PER_WEEK {
        format!("last {} days", hours / HOURS_PER_DAY)
    } else {
        format!("last {} weeks", hours / HOURS_PER_WEEK)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchupWindow {
    pub hours: u32,
    pub label: String,
}

impl CatchupWindow {
    /// First-time users get a day; returning users get everything since they
    /// were last seen, at least one hour and at most `max_hours`.
    pub fn since(last_active: Option<DateTime<Utc>>, now: DateTime<Utc>, max_hours: u32) -> Self {
        match last_active {
            None => Self {
                hours: HOURS_PER_DAY,
                label: "last 24 hours (first time catch-up)".to_string(),
            },
            Some(last_active) => {
                let elapsed = (now - last_active).num_hours().max(1);
                let hours = u32::try_from(elapsed).unwrap_or(u32::MAX).min(max_hours);
                Self { hours, label: format!("since {}", last_active.format("%Y-%m-%d %H:%M")) }
            }
        }
    }
}

pub fn current_quarter(now: DateTime<Utc>) -> String {
    format!("Q{} {}", (now.month() - 1) / 3 + 1, now.year())
}

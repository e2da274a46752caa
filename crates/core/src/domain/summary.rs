use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generated summary for one channel over an exact message window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCacheEntry {
    pub channel_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

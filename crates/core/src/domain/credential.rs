use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A user's Google OAuth grant. Expiry is checked with a small skew so a token
/// is never handed out seconds before it lapses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

const EXPIRY_SKEW_SECS: i64 = 60;

impl OAuthToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|token| !token.is_empty())
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) || self.can_refresh()
    }
}

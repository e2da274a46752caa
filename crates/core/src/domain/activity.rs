use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last time a user was seen posting or asking the bot for something.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: String,
    pub last_active: DateTime<Utc>,
}

impl UserActivity {
    pub fn new(user_id: impl Into<String>, last_active: DateTime<Utc>) -> Self {
        Self { user_id: user_id.into(), last_active }
    }
}

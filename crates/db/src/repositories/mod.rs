use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use pillar_core::domain::activity::UserActivity;
use pillar_core::domain::agenda::{AgendaItem, AgendaItemId, NewAgendaItem};
use pillar_core::domain::credential::OAuthToken;
use pillar_core::domain::summary::SummaryCacheEntry;

pub mod activity;
pub mod agenda;
pub mod credential;
pub mod memory;
pub mod summary_cache;

pub use activity::SqlActivityRepository;
pub use agenda::SqlAgendaRepository;
pub use credential::SqlCredentialRepository;
pub use memory::{
    InMemoryActivityRepository, InMemoryAgendaRepository, InMemoryCredentialRepository,
    InMemorySummaryCacheRepository,
};
pub use summary_cache::SqlSummaryCacheRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn record_activity(&self, activity: UserActivity) -> Result<(), RepositoryError>;
    async fn last_active(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, RepositoryError>;
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn find_token(&self, user_id: &str) -> Result<Option<OAuthToken>, RepositoryError>;
    async fn save_token(&self, token: OAuthToken) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AgendaRepository: Send + Sync {
    async fn add(&self, item: NewAgendaItem) -> Result<AgendaItem, RepositoryError>;

    /// Items not yet folded into a document, oldest first.
    async fn list_pending(&self) -> Result<Vec<AgendaItem>, RepositoryError>;

    /// Flags exactly `ids` as included and returns how many rows changed.
    async fn mark_included(&self, ids: &[AgendaItemId]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait SummaryCacheRepository: Send + Sync {
    async fn find(
        &self,
        channel_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<SummaryCacheEntry>, RepositoryError>;

    async fn save(&self, entry: SummaryCacheEntry) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{value}`: {e}")))
}

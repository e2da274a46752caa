use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use pillar_core::domain::activity::UserActivity;
use pillar_core::domain::agenda::{AgendaItem, AgendaItemId, NewAgendaItem};
use pillar_core::domain::credential::OAuthToken;
use pillar_core::domain::summary::SummaryCacheEntry;

use super::{
    ActivityRepository, AgendaRepository, CredentialRepository, RepositoryError,
    SummaryCacheRepository,
};

#[derive(Default)]
pub struct InMemoryActivityRepository {
    activity: RwLock<HashMap<String, DateTime<Utc>>>,
}

#[async_trait::async_trait]
impl ActivityRepository for InMemoryActivityRepository {
    async fn record_activity(&self, activity: UserActivity) -> Result<(), RepositoryError> {
        let mut entries = self.activity.write().await;
        entries.insert(activity.user_id, activity.last_active);
        Ok(())
    }

    async fn last_active(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let entries = self.activity.read().await;
        Ok(entries.get(user_id).copied())
    }
}

#[derive(Default)]
pub struct InMemoryCredentialRepository {
    tokens: RwLock<HashMap<String, OAuthToken>>,
}

#[async_trait::async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn find_token(&self, user_id: &str) -> Result<Option<OAuthToken>, RepositoryError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(user_id).cloned())
    }

    async fn save_token(&self, mut token: OAuthToken) -> Result<(), RepositoryError> {
        let mut tokens = self.tokens.write().await;
        if token.refresh_token.is_none() {
            token.refresh_token =
                tokens.get(&token.user_id).and_then(|existing| existing.refresh_token.clone());
        }
        tokens.insert(token.user_id.clone(), token);
        Ok(())
    }
}

#[derive(Default)]
struct AgendaState {
    next_id: i64,
    items: Vec<AgendaItem>,
}

#[derive(Default)]
pub struct InMemoryAgendaRepository {
    state: RwLock<AgendaState>,
}

impl InMemoryAgendaRepository {
    /// Every item ever added, included ones too.
    pub async fn all_items(&self) -> Vec<AgendaItem> {
        self.state.read().await.items.clone()
    }
}

#[async_trait::async_trait]
impl AgendaRepository for InMemoryAgendaRepository {
    async fn add(&self, item: NewAgendaItem) -> Result<AgendaItem, RepositoryError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let stored = AgendaItem {
            id: AgendaItemId(state.next_id),
            user_id: item.user_id,
            channel_id: item.channel_id,
            category: item.category,
            content: item.content,
            created_at: Utc::now(),
            included_in_doc: false,
        };
        state.items.push(stored.clone());
        Ok(stored)
    }

    async fn list_pending(&self) -> Result<Vec<AgendaItem>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.items.iter().filter(|item| !item.included_in_doc).cloned().collect())
    }

    async fn mark_included(&self, ids: &[AgendaItemId]) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for item in state.items.iter_mut().filter(|item| ids.contains(&item.id)) {
            if item.mark_included().is_ok() {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[derive(Default)]
pub struct InMemorySummaryCacheRepository {
    entries: RwLock<HashMap<(String, DateTime<Utc>, DateTime<Utc>), SummaryCacheEntry>>,
}

#[async_trait::async_trait]
impl SummaryCacheRepository for InMemorySummaryCacheRepository {
    async fn find(
        &self,
        channel_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<SummaryCacheEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(channel_id.to_string(), period_start, period_end)).cloned())
    }

    async fn save(&self, entry: SummaryCacheEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.insert((entry.channel_id.clone(), entry.period_start, entry.period_end), entry);
        Ok(())
    }
}

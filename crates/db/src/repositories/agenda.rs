use chrono::Utc;
use sqlx::Row;

use pillar_core::domain::agenda::{AgendaCategory, AgendaItem, AgendaItemId, NewAgendaItem};

use super::{parse_timestamp, AgendaRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAgendaRepository {
    pool: DbPool,
}

impl SqlAgendaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<AgendaItem, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel_id: String =
        row.try_get("channel_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category_str: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let included_in_doc: bool =
        row.try_get("included_in_doc").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let category = AgendaCategory::from_label(&category_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown agenda category `{category_str}`"))
    })?;

    Ok(AgendaItem {
        id: AgendaItemId(id),
        user_id,
        channel_id,
        category,
        content,
        created_at: parse_timestamp(&created_at_str)?,
        included_in_doc,
    })
}

#[async_trait::async_trait]
impl AgendaRepository for SqlAgendaRepository {
    async fn add(&self, item: NewAgendaItem) -> Result<AgendaItem, RepositoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO agenda_item (user_id, channel_id, category, content, created_at,
                                      included_in_doc)
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(&item.user_id)
        .bind(&item.channel_id)
        .bind(item.category.label())
        .bind(&item.content)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AgendaItem {
            id: AgendaItemId(result.last_insert_rowid()),
            user_id: item.user_id,
            channel_id: item.channel_id,
            category: item.category,
            content: item.content,
            created_at,
            included_in_doc: false,
        })
    }

    async fn list_pending(&self) -> Result<Vec<AgendaItem>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, user_id, channel_id, category, content, created_at, included_in_doc
             FROM agenda_item
             WHERE included_in_doc = 0
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()
    }

    async fn mark_included(&self, ids: &[AgendaItemId]) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for id in ids {
            let result = sqlx::query(
                "UPDATE agenda_item SET included_in_doc = 1 WHERE id = ? AND included_in_doc = 0",
            )
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }

        tx.commit().await?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use pillar_core::domain::agenda::{AgendaCategory, NewAgendaItem};

    use super::SqlAgendaRepository;
    use crate::repositories::AgendaRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlAgendaRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlAgendaRepository::new(pool)
    }

    fn new_item(category: AgendaCategory, content: &str) -> NewAgendaItem {
        NewAgendaItem::new("U1", "C1", category, content).expect("valid item")
    }

    #[tokio::test]
    async fn added_items_are_pending_in_insertion_order() {
        let repo = repository().await;
        let first = repo.add(new_item(AgendaCategory::PipelineReview, "Intro from Partner X")).await;
        let second = repo.add(new_item(AgendaCategory::OtherBusiness, "Offsite")).await;
        assert!(first.is_ok() && second.is_ok());

        let pending = repo.list_pending().await.expect("list");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].category, AgendaCategory::PipelineReview);
        assert_eq!(pending[0].content, "Intro from Partner X");
        assert!(!pending[0].included_in_doc);
    }

    #[tokio::test]
    async fn mark_included_touches_exactly_the_given_ids() {
        let repo = repository().await;
        let mut folded = Vec::new();
        for content in ["a", "b", "c"] {
            folded.push(repo.add(new_item(AgendaCategory::InvestmentDecisions, content)).await.expect("add").id);
        }

        let changed = repo.mark_included(&folded).await.expect("mark");
        assert_eq!(changed, 3);

        let late = repo.add(new_item(AgendaCategory::PortfolioUpdates, "added later")).await.expect("add");
        let pending = repo.list_pending().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, late.id);

        let changed_again = repo.mark_included(&folded).await.expect("mark again");
        assert_eq!(changed_again, 0, "inclusion never flips twice");
    }
}

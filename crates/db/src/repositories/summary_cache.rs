use chrono::{DateTime, Utc};
use sqlx::Row;

use pillar_core::domain::summary::SummaryCacheEntry;

use super::{parse_timestamp, RepositoryError, SummaryCacheRepository};
use crate::DbPool;

pub struct SqlSummaryCacheRepository {
    pool: DbPool,
}

impl SqlSummaryCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SummaryCacheRepository for SqlSummaryCacheRepository {
    async fn find(
        &self,
        channel_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<SummaryCacheEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT summary, created_at FROM summary_cache
             WHERE channel_id = ? AND period_start = ? AND period_end = ?",
        )
        .bind(channel_id)
        .bind(period_start.to_rfc3339())
        .bind(period_end.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let summary: String =
            row.try_get("summary").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let created_at: String =
            row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(SummaryCacheEntry {
            channel_id: channel_id.to_string(),
            period_start,
            period_end,
            summary,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    async fn save(&self, entry: SummaryCacheEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO summary_cache (channel_id, period_start, period_end, summary, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(channel_id, period_start, period_end) DO UPDATE SET
                 summary = excluded.summary,
                 created_at = excluded.created_at",
        )
        .bind(&entry.channel_id)
        .bind(entry.period_start.to_rfc3339())
        .bind(entry.period_end.to_rfc3339())
        .bind(&entry.summary)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

use chrono::{DateTime, Utc};
use sqlx::Row;

use pillar_core::domain::activity::UserActivity;

use super::{parse_timestamp, ActivityRepository, RepositoryError};
use crate::DbPool;

pub struct SqlActivityRepository {
    pool: DbPool,
}

impl SqlActivityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ActivityRepository for SqlActivityRepository {
    async fn record_activity(&self, activity: UserActivity) -> Result<(), RepositoryError> {
        let seen_at = activity.last_active.to_rfc3339();
        sqlx::query(
            "INSERT INTO user_activity (user_id, last_active, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET last_active = excluded.last_active",
        )
        .bind(&activity.user_id)
        .bind(&seen_at)
        .bind(&seen_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_active(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let row = sqlx::query("SELECT last_active FROM user_activity WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String =
                    row.try_get("last_active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(Some(parse_timestamp(&raw)?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use pillar_core::domain::activity::UserActivity;

    use super::SqlActivityRepository;
    use crate::repositories::ActivityRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlActivityRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlActivityRepository::new(pool)
    }

    #[tokio::test]
    async fn unknown_user_has_no_activity() {
        let repo = repository().await;
        assert_eq!(repo.last_active("U404").await.expect("query"), None);
    }

    #[tokio::test]
    async fn record_activity_upserts_latest_timestamp() {
        let repo = repository().await;
        let earlier = Utc::now() - Duration::hours(5);
        let later = Utc::now();

        repo.record_activity(UserActivity::new("U1", earlier)).await.expect("first");
        repo.record_activity(UserActivity::new("U1", later)).await.expect("second");

        let stored = repo.last_active("U1").await.expect("query").expect("present");
        assert_eq!(stored.timestamp(), later.timestamp());
    }
}

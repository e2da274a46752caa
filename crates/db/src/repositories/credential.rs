use chrono::Utc;
use sqlx::Row;

use pillar_core::domain::credential::OAuthToken;

use super::{parse_timestamp, CredentialRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCredentialRepository {
    pool: DbPool,
}

impl SqlCredentialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> Result<OAuthToken, RepositoryError> {
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let access_token: String =
        row.try_get("access_token").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let refresh_token: Option<String> =
        row.try_get("refresh_token").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at_str: Option<String> =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let expires_at = expires_at_str.as_deref().map(parse_timestamp).transpose()?;

    Ok(OAuthToken { user_id, access_token, refresh_token, expires_at })
}

#[async_trait::async_trait]
impl CredentialRepository for SqlCredentialRepository {
    async fn find_token(&self, user_id: &str) -> Result<Option<OAuthToken>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, access_token, refresh_token, expires_at
             FROM oauth_token WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_token(r)?)),
            None => Ok(None),
        }
    }

    async fn save_token(&self, token: OAuthToken) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let expires_at = token.expires_at.map(|dt| dt.to_rfc3339());

        // A refresh response usually omits the refresh token; keep the stored one.
        sqlx::query(
            "INSERT INTO oauth_token (user_id, access_token, refresh_token, expires_at,
                                      created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token = COALESCE(excluded.refresh_token, oauth_token.refresh_token),
                 expires_at = excluded.expires_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&token.user_id)
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(&expires_at)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

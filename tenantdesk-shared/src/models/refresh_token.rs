/// Refresh token records
///
/// One row per live session. The row ID is the `jti` of the refresh JWT and
/// `token_hash` is the SHA-256 of the encoded JWT, so a token is only
/// accepted if it is the exact one last issued for that session.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,

    pub user_id: Uuid,

    pub tenant_id: Uuid,

    #[serde(skip_serializing)]
    pub token_hash: String,

    pub user_agent: Option<String>,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub token_hash: String,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, user_id, tenant_id, token_hash, user_agent, expires_at, created_at";

impl RefreshToken {
    pub async fn create(db: impl PgExecutor<'_>, data: NewRefreshToken) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>(&format!(
            "INSERT INTO refresh_tokens (id, user_id, tenant_id, token_hash, user_agent, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        ))
        .bind(data.id)
        .bind(data.user_id)
        .bind(data.tenant_id)
        .bind(data.token_hash)
        .bind(data.user_agent)
        .bind(data.expires_at)
        .fetch_one(db)
        .await
    }

    /// Deletes and returns the row in one statement
    ///
    /// Two concurrent callers presenting the same token cannot both get the
    /// row back, which makes this the consume step of rotation.
    pub async fn take(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>(&format!(
            "DELETE FROM refresh_tokens WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn delete_for_user(db: impl PgExecutor<'_>, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn prune_expired(db: impl PgExecutor<'_>, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND expires_at <= NOW()")
                .bind(user_id)
                .execute(db)
                .await?;

        Ok(result.rows_affected())
    }

    /// Live sessions of a user, newest first
    pub async fn list_for_user(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {COLUMNS} FROM refresh_tokens
             WHERE user_id = $1 AND expires_at > NOW()
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(db)
        .await
    }
}

/// Single-use email tokens (verification and password reset)
///
/// Only the SHA-256 of the token is stored. Consuming a token is one
/// conditional UPDATE, so a token works at most once even under concurrent
/// requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "token_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn lifetime(&self) -> Duration {
        match self {
            TokenPurpose::EmailVerification => Duration::hours(48),
            TokenPurpose::PasswordReset => Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OneTimeToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, user_id, purpose, token_hash, expires_at, consumed_at, created_at";

impl OneTimeToken {
    /// Stores a token hash expiring after the purpose's lifetime
    pub async fn create(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        purpose: TokenPurpose,
        token_hash: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, OneTimeToken>(&format!(
            "INSERT INTO one_time_tokens (user_id, purpose, token_hash, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        ))
        .bind(user_id)
        .bind(purpose)
        .bind(token_hash)
        .bind(Utc::now() + purpose.lifetime())
        .fetch_one(db)
        .await
    }

    /// Marks a live token consumed and returns it
    ///
    /// Returns None for unknown, expired, already-used or wrong-purpose tokens.
    pub async fn consume(
        db: impl PgExecutor<'_>,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, OneTimeToken>(&format!(
            "UPDATE one_time_tokens SET consumed_at = NOW()
             WHERE token_hash = $1
               AND purpose = $2
               AND consumed_at IS NULL
               AND expires_at > NOW()
             RETURNING {COLUMNS}"
        ))
        .bind(token_hash)
        .bind(purpose)
        .fetch_optional(db)
        .await
    }

    /// Retires every outstanding token of a purpose for a user
    pub async fn invalidate_for_user(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        purpose: TokenPurpose,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE one_time_tokens SET consumed_at = NOW()
             WHERE user_id = $1 AND purpose = $2 AND consumed_at IS NULL",
        )
        .bind(user_id)
        .bind(purpose)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Extended user profile
///
/// Optional personal details kept apart from the `users` row. A profile row
/// is created on first write; reading a missing profile yields an empty one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub user_id: Uuid,

    pub phone: Option<String>,

    pub job_title: Option<String>,

    pub bio: Option<String>,

    /// IANA zone name, e.g. `Europe/Berlin`
    pub timezone: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Profile with every field unset
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            phone: None,
            job_title: None,
            bio: None,
            timezone: None,
            updated_at: Utc::now(),
        }
    }
}

/// Full replacement of the profile fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertProfile {
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
}

impl Profile {
    pub async fn find(db: impl PgExecutor<'_>, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            "SELECT user_id, phone, job_title, bio, timezone, updated_at
             FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_or_empty(db: impl PgExecutor<'_>, user_id: Uuid) -> Result<Self, sqlx::Error> {
        Ok(Self::find(db, user_id)
            .await?
            .unwrap_or_else(|| Self::empty(user_id)))
    }

    pub async fn upsert(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        data: UpsertProfile,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (user_id, phone, job_title, bio, timezone)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id) DO UPDATE SET
                phone = EXCLUDED.phone,
                job_title = EXCLUDED.job_title,
                bio = EXCLUDED.bio,
                timezone = EXCLUDED.timezone,
                updated_at = NOW()
             RETURNING user_id, phone, job_title, bio, timezone, updated_at",
        )
        .bind(user_id)
        .bind(data.phone)
        .bind(data.job_title)
        .bind(data.bio)
        .bind(data.timezone)
        .fetch_one(db)
        .await
    }
}

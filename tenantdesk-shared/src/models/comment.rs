/// Task comments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::Pagination;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub task_id: Uuid,
    /// None once the author's account is deleted
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub body: String,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_author(&self, user_id: Uuid) -> bool {
        self.author_id == Some(user_id)
    }
}

const SELECT: &str = "SELECT c.id, c.tenant_id, c.task_id, c.author_id, u.name AS author_name,
                             c.body, c.edited, c.created_at, c.updated_at
                      FROM comments c
                      LEFT JOIN users u ON u.id = c.author_id";

impl Comment {
    pub async fn create(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        task_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            "WITH inserted AS (
                INSERT INTO comments (tenant_id, task_id, author_id, body)
                VALUES ($1, $2, $3, $4)
                RETURNING *
             )
             SELECT i.id, i.tenant_id, i.task_id, i.author_id, u.name AS author_name,
                    i.body, i.edited, i.created_at, i.updated_at
             FROM inserted i
             LEFT JOIN users u ON u.id = i.author_id",
        )
        .bind(tenant_id)
        .bind(task_id)
        .bind(author_id)
        .bind(body.trim())
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        task_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(&format!(
            "{SELECT} WHERE c.tenant_id = $1 AND c.task_id = $2 AND c.id = $3"
        ))
        .bind(tenant_id)
        .bind(task_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Oldest first, like a conversation
    pub async fn list_by_task(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        task_id: Uuid,
        page: Pagination,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(&format!(
            "{SELECT}
             WHERE c.tenant_id = $1 AND c.task_id = $2
             ORDER BY c.created_at ASC
             LIMIT $3 OFFSET $4"
        ))
        .bind(tenant_id)
        .bind(task_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }

    /// Replaces the body and flags the comment as edited
    pub async fn update_body(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
        body: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE comments SET body = $3, edited = TRUE, updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(body.trim())
        .execute(db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(db: impl PgExecutor<'_>, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

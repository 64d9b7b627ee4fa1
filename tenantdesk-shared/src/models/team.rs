/// Teams, team membership and team task assignment
///
/// Teams group tenant members (a crew, a shift). `team_members` and
/// `task_teams` rows cascade when either side is deleted, so removing a team
/// leaves no dangling links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "team_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Lead,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamMember {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: TeamRole,
    pub joined_at: DateTime<Utc>,
}

/// A task assigned to a team
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamTask {
    pub task_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub assigned_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, tenant_id, name, description, created_at, updated_at";

impl Team {
    /// # Errors
    ///
    /// Fails with a unique violation on `teams_tenant_name_key` for a
    /// duplicate name within the tenant.
    pub async fn create(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        name: &str,
        description: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Team>(&format!(
            "INSERT INTO teams (tenant_id, name, description)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(name.trim())
        .bind(description)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Team>(&format!(
            "SELECT {COLUMNS} FROM teams WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn list(db: impl PgExecutor<'_>, tenant_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Team>(&format!(
            "SELECT {COLUMNS} FROM teams WHERE tenant_id = $1 ORDER BY name ASC"
        ))
        .bind(tenant_id)
        .fetch_all(db)
        .await
    }

    /// `description: Some(None)` clears it
    pub async fn update(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
        name: Option<String>,
        description: Option<Option<String>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let (set_description, description) = match description {
            Some(value) => (true, value),
            None => (false, None),
        };

        sqlx::query_as::<_, Team>(&format!(
            "UPDATE teams SET
                name = COALESCE($3, name),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(id)
        .bind(name)
        .bind(set_description)
        .bind(description)
        .fetch_optional(db)
        .await
    }

    pub async fn delete(db: impl PgExecutor<'_>, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM teams WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Adds a user to the team, or changes their team role if already in it
    pub async fn upsert_member(
        db: impl PgExecutor<'_>,
        team_id: Uuid,
        user_id: Uuid,
        role: TeamRole,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO team_members (team_id, user_id, role)
             VALUES ($1, $2, $3)
             ON CONFLICT (team_id, user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(team_id)
        .bind(user_id)
        .bind(role)
        .execute(db)
        .await?;

        Ok(())
    }

    pub async fn remove_member(
        db: impl PgExecutor<'_>,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Leads first, then by join time
    pub async fn list_members(
        db: impl PgExecutor<'_>,
        team_id: Uuid,
    ) -> Result<Vec<TeamMember>, sqlx::Error> {
        sqlx::query_as::<_, TeamMember>(
            "SELECT u.id AS user_id, u.email::TEXT AS email, u.name, tm.role, tm.joined_at
             FROM team_members tm
             JOIN users u ON u.id = tm.user_id
             WHERE tm.team_id = $1
             ORDER BY tm.role ASC, tm.joined_at ASC",
        )
        .bind(team_id)
        .fetch_all(db)
        .await
    }

    /// Links a task to the team; returns false if it was already linked
    pub async fn assign_task(
        db: impl PgExecutor<'_>,
        team_id: Uuid,
        task_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO task_teams (task_id, team_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(task_id)
        .bind(team_id)
        .execute(db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn unassign_task(
        db: impl PgExecutor<'_>,
        team_id: Uuid,
        task_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_teams WHERE team_id = $1 AND task_id = $2")
            .bind(team_id)
            .bind(task_id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_tasks(
        db: impl PgExecutor<'_>,
        team_id: Uuid,
    ) -> Result<Vec<TeamTask>, sqlx::Error> {
        sqlx::query_as::<_, TeamTask>(
            "SELECT t.id AS task_id, t.project_id, t.title, tt.assigned_at
             FROM task_teams tt
             JOIN tasks t ON t.id = tt.task_id
             WHERE tt.team_id = $1
             ORDER BY tt.assigned_at DESC",
        )
        .bind(team_id)
        .fetch_all(db)
        .await
    }
}

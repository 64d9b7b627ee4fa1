/// Sprints
///
/// Time-boxed iterations within a project.
///
/// ```text
/// planned ──start──▶ active ──complete──▶ completed
/// ```
///
/// A partial unique index (`sprints_one_active_per_project`) keeps at most
/// one active sprint per project, so a concurrent second `start` fails with
/// a unique violation instead of racing.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sprint_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SprintStatus {
    Planned,
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sprint {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub goal: Option<String>,
    pub status: SprintStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSprint {
    pub name: String,
    pub goal: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSprint {
    pub name: Option<String>,
    pub goal: Option<Option<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Result of completing a sprint
#[derive(Debug, Clone, Serialize)]
pub struct SprintCompletion {
    pub sprint: Sprint,

    /// Unfinished tasks moved back to the backlog
    pub returned_to_backlog: u64,
}

const COLUMNS: &str = "id, tenant_id, project_id, name, goal, status, start_date, end_date, \
                       created_at, updated_at";

impl Sprint {
    /// # Errors
    ///
    /// Fails with a check violation (`sprints_dates_check`) if the end date
    /// precedes the start date.
    pub async fn create(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        data: CreateSprint,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Sprint>(&format!(
            "INSERT INTO sprints (tenant_id, project_id, name, goal, start_date, end_date)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(project_id)
        .bind(data.name.trim())
        .bind(data.goal)
        .bind(data.start_date)
        .bind(data.end_date)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sprint>(&format!(
            "SELECT {COLUMNS} FROM sprints
             WHERE tenant_id = $1 AND project_id = $2 AND id = $3"
        ))
        .bind(tenant_id)
        .bind(project_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Sprints of a project in start-date order
    pub async fn list_by_project(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sprint>(&format!(
            "SELECT {COLUMNS} FROM sprints
             WHERE tenant_id = $1 AND project_id = $2
             ORDER BY start_date ASC, created_at ASC"
        ))
        .bind(tenant_id)
        .bind(project_id)
        .fetch_all(db)
        .await
    }

    pub async fn update(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        id: Uuid,
        data: UpdateSprint,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE sprints SET updated_at = NOW()");
        let mut bind_count = 3;

        for (column, present) in [
            ("name", data.name.is_some()),
            ("goal", data.goal.is_some()),
            ("start_date", data.start_date.is_some()),
            ("end_date", data.end_date.is_some()),
        ] {
            if present {
                bind_count += 1;
                query.push_str(&format!(", {} = ${}", column, bind_count));
            }
        }

        query.push_str(&format!(
            " WHERE tenant_id = $1 AND project_id = $2 AND id = $3 RETURNING {COLUMNS}"
        ));

        let mut q = sqlx::query_as::<_, Sprint>(&query)
            .bind(tenant_id)
            .bind(project_id)
            .bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(goal) = data.goal {
            q = q.bind(goal);
        }
        if let Some(start_date) = data.start_date {
            q = q.bind(start_date);
        }
        if let Some(end_date) = data.end_date {
            q = q.bind(end_date);
        }

        q.fetch_optional(db).await
    }

    /// Deletes a sprint; its tasks stay and fall back to the backlog
    pub async fn delete(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM sprints WHERE tenant_id = $1 AND project_id = $2 AND id = $3")
                .bind(tenant_id)
                .bind(project_id)
                .bind(id)
                .execute(db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Moves a planned sprint to active
    ///
    /// Returns None when the sprint is not in `planned`. Fails with a unique
    /// violation on `sprints_one_active_per_project` if another sprint of the
    /// project is already active.
    pub async fn start(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sprint>(&format!(
            "UPDATE sprints SET status = 'active', updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2 AND status = 'planned'
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Completes an active sprint and returns its unfinished tasks to the backlog
    ///
    /// Must run inside a transaction. Returns None when the sprint is not active.
    pub async fn complete(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<SprintCompletion>, sqlx::Error> {
        let sprint = sqlx::query_as::<_, Sprint>(&format!(
            "UPDATE sprints SET status = 'completed', updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2 AND status = 'active'
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(sprint) = sprint else {
            return Ok(None);
        };

        let moved = sqlx::query(
            "UPDATE tasks SET sprint_id = NULL, updated_at = NOW()
             WHERE tenant_id = $1 AND sprint_id = $2 AND status <> 'done'",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(Some(SprintCompletion {
            sprint,
            returned_to_backlog: moved.rows_affected(),
        }))
    }

    /// Whether the sprint exists in the given project
    pub async fn belongs_to_project(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM sprints WHERE tenant_id = $1 AND project_id = $2 AND id = $3
            )",
        )
        .bind(tenant_id)
        .bind(project_id)
        .bind(id)
        .fetch_one(db)
        .await
    }
}

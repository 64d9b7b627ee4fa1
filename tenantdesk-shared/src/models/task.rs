/// Tasks
///
/// Units of work inside a project. A task without a sprint is in the
/// project backlog.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     sprint_id UUID REFERENCES sprints(id) ON DELETE SET NULL,
///     title VARCHAR(255) NOT NULL,
///     description TEXT,
///     status task_status NOT NULL DEFAULT 'todo',
///     priority task_priority NOT NULL DEFAULT 'medium',
///     assignee_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     reporter_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     due_date DATE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Comments, board placements and team links cascade on delete.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    InReview,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::InReview => "in_review",
            TaskStatus::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub sprint_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub sprint_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub sprint_id: Option<Option<Uuid>>,
    pub assignee_id: Option<Option<Uuid>>,
    pub due_date: Option<Option<NaiveDate>>,
}

/// List filters; `None` means "any"
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub sprint_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
}

const COLUMNS: &str = "id, tenant_id, project_id, sprint_id, title, description, status, priority, \
                       assignee_id, reporter_id, due_date, created_at, updated_at";

impl Task {
    pub async fn create(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        data: CreateTask,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks
                (tenant_id, project_id, sprint_id, title, description, status, priority,
                 assignee_id, reporter_id, due_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(project_id)
        .bind(data.sprint_id)
        .bind(data.title.trim())
        .bind(data.description)
        .bind(data.status)
        .bind(data.priority)
        .bind(data.assignee_id)
        .bind(data.reporter_id)
        .bind(data.due_date)
        .fetch_one(db)
        .await
    }

    /// Finds a task by ID within a tenant, regardless of project
    pub async fn find_by_id(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_in_project(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {COLUMNS} FROM tasks
             WHERE tenant_id = $1 AND project_id = $2 AND id = $3"
        ))
        .bind(tenant_id)
        .bind(project_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Tasks of a project, newest first
    pub async fn list(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        filter: TaskFilter,
        page: Pagination,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {COLUMNS} FROM tasks
             WHERE tenant_id = $1 AND project_id = $2
               AND ($3::task_status IS NULL OR status = $3)
               AND ($4::uuid IS NULL OR sprint_id = $4)
               AND ($5::uuid IS NULL OR assignee_id = $5)
             ORDER BY created_at DESC
             LIMIT $6 OFFSET $7"
        ))
        .bind(tenant_id)
        .bind(project_id)
        .bind(filter.status)
        .bind(filter.sprint_id)
        .bind(filter.assignee_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }

    pub async fn update(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE tasks SET updated_at = NOW()");
        let mut bind_count = 3;

        for (column, present) in [
            ("title", data.title.is_some()),
            ("description", data.description.is_some()),
            ("status", data.status.is_some()),
            ("priority", data.priority.is_some()),
            ("sprint_id", data.sprint_id.is_some()),
            ("assignee_id", data.assignee_id.is_some()),
            ("due_date", data.due_date.is_some()),
        ] {
            if present {
                bind_count += 1;
                query.push_str(&format!(", {} = ${}", column, bind_count));
            }
        }

        query.push_str(&format!(
            " WHERE tenant_id = $1 AND project_id = $2 AND id = $3 RETURNING {COLUMNS}"
        ));

        let mut q = sqlx::query_as::<_, Task>(&query)
            .bind(tenant_id)
            .bind(project_id)
            .bind(id);

        if let Some(title) = data.title {
            q = q.bind(title);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(status) = data.status {
            q = q.bind(status);
        }
        if let Some(priority) = data.priority {
            q = q.bind(priority);
        }
        if let Some(sprint_id) = data.sprint_id {
            q = q.bind(sprint_id);
        }
        if let Some(assignee_id) = data.assignee_id {
            q = q.bind(assignee_id);
        }
        if let Some(due_date) = data.due_date {
            q = q.bind(due_date);
        }

        q.fetch_optional(db).await
    }

    pub async fn delete(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM tasks WHERE tenant_id = $1 AND project_id = $2 AND id = $3")
                .bind(tenant_id)
                .bind(project_id)
                .bind(id)
                .execute(db)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names_match_default_board_columns() {
        for status in [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::InReview,
            TaskStatus::Done,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_filter_defaults_to_any() {
        let filter = TaskFilter::default();
        assert!(filter.status.is_none());
        assert!(filter.sprint_id.is_none());
        assert!(filter.assignee_id.is_none());
    }
}

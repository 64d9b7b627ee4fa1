/// Kanban boards
///
/// A board belongs to a project and has an ordered list of column names.
/// Tasks are placed on a board through `board_tasks`, each with a column
/// and a zero-based position. Positions inside a column are kept dense
/// (0, 1, 2, ...) by every move and removal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::task::{TaskPriority, TaskStatus};

/// Columns given to a board created without explicit ones
pub const DEFAULT_COLUMNS: [&str; 4] = ["todo", "in_progress", "in_review", "done"];

pub fn default_columns() -> Vec<String> {
    DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Board {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub columns: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BoardTask {
    pub board_id: Uuid,
    pub task_id: Uuid,
    pub column_name: String,
    pub position: i32,
}

/// A placement joined with the task it places
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlacedTask {
    pub task_id: Uuid,
    pub column_name: String,
    pub position: i32,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee_id: Option<Uuid>,
}

const COLUMNS: &str = "id, tenant_id, project_id, name, columns, created_at, updated_at";

impl Board {
    pub async fn create(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        name: &str,
        columns: Vec<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Board>(&format!(
            "INSERT INTO boards (tenant_id, project_id, name, columns)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(project_id)
        .bind(name.trim())
        .bind(columns)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(&format!(
            "SELECT {COLUMNS} FROM boards
             WHERE tenant_id = $1 AND project_id = $2 AND id = $3"
        ))
        .bind(tenant_id)
        .bind(project_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn list_by_project(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(&format!(
            "SELECT {COLUMNS} FROM boards
             WHERE tenant_id = $1 AND project_id = $2
             ORDER BY created_at ASC"
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
        name: Option<String>,
        columns: Option<Vec<String>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(&format!(
            "UPDATE boards SET
                name = COALESCE($4, name),
                columns = COALESCE($5, columns),
                updated_at = NOW()
             WHERE tenant_id = $1 AND project_id = $2 AND id = $3
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(project_id)
        .bind(id)
        .bind(name)
        .bind(columns)
        .fetch_optional(db)
        .await
    }

    pub async fn delete(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        project_id: Uuid,
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM boards WHERE tenant_id = $1 AND project_id = $2 AND id = $3")
                .bind(tenant_id)
                .bind(project_id)
                .bind(id)
                .execute(db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Tasks on the board, grouped by column and ordered by position
    pub async fn placements(
        db: impl PgExecutor<'_>,
        board_id: Uuid,
    ) -> Result<Vec<PlacedTask>, sqlx::Error> {
        sqlx::query_as::<_, PlacedTask>(
            "SELECT bt.task_id, bt.column_name, bt.position,
                    t.title, t.status, t.priority, t.assignee_id
             FROM board_tasks bt
             JOIN tasks t ON t.id = bt.task_id
             WHERE bt.board_id = $1
             ORDER BY bt.column_name, bt.position",
        )
        .bind(board_id)
        .fetch_all(db)
        .await
    }

    /// Distinct columns that currently hold at least one task
    pub async fn occupied_columns(
        db: impl PgExecutor<'_>,
        board_id: Uuid,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT DISTINCT column_name FROM board_tasks WHERE board_id = $1")
            .bind(board_id)
            .fetch_all(db)
            .await
    }

    /// Places or moves a task into `column` at `position`
    ///
    /// A missing or too-large position appends to the column. Must run inside
    /// a transaction; the board row is locked so concurrent moves on the same
    /// board apply one after another.
    pub async fn place_task(
        conn: &mut PgConnection,
        board_id: Uuid,
        task_id: Uuid,
        column: &str,
        position: Option<i32>,
    ) -> Result<BoardTask, sqlx::Error> {
        lock_board(conn, board_id).await?;
        detach(conn, board_id, task_id).await?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM board_tasks WHERE board_id = $1 AND column_name = $2",
        )
        .bind(board_id)
        .bind(column)
        .fetch_one(&mut *conn)
        .await?;

        let position = clamp_position(position, count);

        sqlx::query(
            "UPDATE board_tasks SET position = position + 1
             WHERE board_id = $1 AND column_name = $2 AND position >= $3",
        )
        .bind(board_id)
        .bind(column)
        .bind(position)
        .execute(&mut *conn)
        .await?;

        sqlx::query_as::<_, BoardTask>(
            "INSERT INTO board_tasks (board_id, task_id, column_name, position)
             VALUES ($1, $2, $3, $4)
             RETURNING board_id, task_id, column_name, position",
        )
        .bind(board_id)
        .bind(task_id)
        .bind(column)
        .bind(position)
        .fetch_one(&mut *conn)
        .await
    }

    /// Takes a task off the board; returns false if it was not placed
    ///
    /// Must run inside a transaction.
    pub async fn remove_task(
        conn: &mut PgConnection,
        board_id: Uuid,
        task_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        lock_board(conn, board_id).await?;
        detach(conn, board_id, task_id).await
    }
}

async fn lock_board(conn: &mut PgConnection, board_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT id FROM boards WHERE id = $1 FOR UPDATE")
        .bind(board_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Deletes a placement and closes the gap it leaves in its column
async fn detach(conn: &mut PgConnection, board_id: Uuid, task_id: Uuid) -> Result<bool, sqlx::Error> {
    let removed: Option<(String, i32)> = sqlx::query_as(
        "DELETE FROM board_tasks WHERE board_id = $1 AND task_id = $2
         RETURNING column_name, position",
    )
    .bind(board_id)
    .bind(task_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((column, position)) = removed else {
        return Ok(false);
    };

    sqlx::query(
        "UPDATE board_tasks SET position = position - 1
         WHERE board_id = $1 AND column_name = $2 AND position > $3",
    )
    .bind(board_id)
    .bind(column)
    .bind(position)
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

/// Target slot in a column that currently holds `count` tasks
fn clamp_position(requested: Option<i32>, count: i64) -> i32 {
    let count = i32::try_from(count).unwrap_or(i32::MAX);
    requested.map_or(count, |p| p.clamp(0, count))
}

/// Kanban boards
///
/// # Endpoints
///
/// - `GET /v1/tenants/:tenant_id/projects/:project_id/boards` - (Read)
/// - `POST .../boards` - (Write) `{"name": "Sprint board", "columns": [...]}`
/// - `GET .../boards/:board_id` - (Read) board with its placed tasks
/// - `PUT|DELETE .../boards/:board_id` - (Write)
/// - `PUT .../boards/:board_id/tasks/:task_id` - (Write)
///   `{"column": "in_review", "position": 0}` places or moves a task
/// - `DELETE .../boards/:board_id/tasks/:task_id` - (Write)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tenantdesk_shared::{
    auth::authorization::ResourcePermission,
    models::{
        board::{default_columns, Board, BoardTask, PlacedTask},
        event_log::NewEvent,
        task::Task,
    },
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    middleware::tenant::TenantScope,
    routes::{events, projects::ensure_project},
};

const MAX_COLUMNS: usize = 20;
const MAX_COLUMN_NAME: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ProjectPath {
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct BoardPath {
    pub project_id: Uuid,
    pub board_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PlacementPath {
    pub project_id: Uuid,
    pub board_id: Uuid,
    pub task_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBoardRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBoardRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceTaskRequest {
    #[validate(length(min = 1, message = "Column is required"))]
    pub column: String,

    #[validate(range(min = 0, message = "Position cannot be negative"))]
    pub position: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct BoardDetail {
    #[serde(flatten)]
    pub board: Board,
    pub tasks: Vec<PlacedTask>,
}

/// Trims names and rejects empty, overlong or duplicate columns
fn normalize_columns(columns: Vec<String>) -> ApiResult<Vec<String>> {
    if columns.is_empty() || columns.len() > MAX_COLUMNS {
        return Err(ApiError::invalid_field(
            "columns",
            format!("A board needs 1-{} columns", MAX_COLUMNS),
        ));
    }

    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(columns.len());
    for column in columns {
        let column = column.trim().to_string();
        if column.is_empty() || column.len() > MAX_COLUMN_NAME {
            return Err(ApiError::invalid_field(
                "columns",
                format!("Column names must be 1-{} characters", MAX_COLUMN_NAME),
            ));
        }
        if !seen.insert(column.clone()) {
            return Err(ApiError::invalid_field(
                "columns",
                format!("Duplicate column '{}'", column),
            ));
        }
        normalized.push(column);
    }
    Ok(normalized)
}

async fn find_board(state: &AppState, tenant_id: Uuid, project_id: Uuid, board_id: Uuid) -> ApiResult<Board> {
    Board::find_by_id(&state.db, tenant_id, project_id, board_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Board"))
}

pub async fn list_boards(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ProjectPath>,
) -> ApiResult<Json<Vec<Board>>> {
    scope.require(ResourcePermission::Read)?;
    ensure_project(&state, scope.tenant_id, path.project_id).await?;

    let boards = Board::list_by_project(&state.db, scope.tenant_id, path.project_id).await?;
    Ok(Json(boards))
}

pub async fn create_board(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ProjectPath>,
    ValidatedJson(req): ValidatedJson<CreateBoardRequest>,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Write)?;
    ensure_project(&state, scope.tenant_id, path.project_id).await?;

    let columns = match req.columns {
        Some(columns) => normalize_columns(columns)?,
        None => default_columns(),
    };

    let board = Board::create(
        &state.db,
        scope.tenant_id,
        path.project_id,
        req.name.trim(),
        columns,
    )
    .await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "board", board.id, "created")
            .with_details(json!({ "project_id": path.project_id, "name": board.name })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(board)))
}

pub async fn get_board(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<BoardPath>,
) -> ApiResult<Json<BoardDetail>> {
    scope.require(ResourcePermission::Read)?;

    let board = find_board(&state, scope.tenant_id, path.project_id, path.board_id).await?;
    let tasks = Board::placements(&state.db, board.id).await?;
    Ok(Json(BoardDetail { board, tasks }))
}

/// 409 when a removed column still holds tasks
pub async fn update_board(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<BoardPath>,
    ValidatedJson(req): ValidatedJson<UpdateBoardRequest>,
) -> ApiResult<Json<Board>> {
    scope.require(ResourcePermission::Write)?;
    find_board(&state, scope.tenant_id, path.project_id, path.board_id).await?;

    let columns = req.columns.map(normalize_columns).transpose()?;
    if let Some(columns) = &columns {
        let occupied = Board::occupied_columns(&state.db, path.board_id).await?;
        if let Some(column) = occupied.iter().find(|c| !columns.contains(*c)) {
            return Err(ApiError::Conflict(format!(
                "Column '{}' still has tasks; move them before removing it",
                column
            )));
        }
    }

    let board = Board::update(
        &state.db,
        scope.tenant_id,
        path.project_id,
        path.board_id,
        req.name.map(|n| n.trim().to_string()),
        columns,
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Board"))?;

    Ok(Json(board))
}

pub async fn delete_board(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<BoardPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Write)?;

    if !Board::delete(&state.db, scope.tenant_id, path.project_id, path.board_id).await? {
        return Err(ApiError::not_found("Board"));
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "board", path.board_id, "deleted"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn place_task(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<PlacementPath>,
    ValidatedJson(req): ValidatedJson<PlaceTaskRequest>,
) -> ApiResult<Json<BoardTask>> {
    scope.require(ResourcePermission::Write)?;

    let board = find_board(&state, scope.tenant_id, path.project_id, path.board_id).await?;
    if !board.has_column(&req.column) {
        return Err(ApiError::invalid_field(
            "column",
            format!("Board has no column '{}'", req.column),
        ));
    }
    Task::find_in_project(&state.db, scope.tenant_id, path.project_id, path.task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;

    let mut tx = state.db.begin().await?;
    let placement = Board::place_task(&mut tx, board.id, path.task_id, &req.column, req.position).await?;
    tx.commit().await?;

    tracing::debug!(
        board_id = %board.id,
        task_id = %path.task_id,
        column = %placement.column_name,
        position = placement.position,
        "Task placed"
    );

    Ok(Json(placement))
}

pub async fn remove_task(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<PlacementPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Write)?;
    let board = find_board(&state, scope.tenant_id, path.project_id, path.board_id).await?;

    let mut tx = state.db.begin().await?;
    let removed = Board::remove_task(&mut tx, board.id, path.task_id).await?;
    tx.commit().await?;

    if !removed {
        return Err(ApiError::NotFound("Task is not on this board".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

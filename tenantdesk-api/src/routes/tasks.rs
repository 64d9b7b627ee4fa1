/// Tasks
///
/// # Endpoints
///
/// - `GET /v1/tenants/:tenant_id/projects/:project_id/tasks` - (Read)
///   filters: `status`, `sprint_id`, `assignee_id`, plus `limit`/`offset`
/// - `POST /v1/tenants/:tenant_id/projects/:project_id/tasks` - (Write)
/// - `GET|PUT|DELETE .../tasks/:task_id` - (Read | Write | Write)
///
/// The assignee must be a member of the tenant and the sprint must belong to
/// the same project. The caller is recorded as reporter.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tenantdesk_shared::{
    auth::authorization::ResourcePermission,
    models::{
        double_option,
        event_log::NewEvent,
        sprint::Sprint,
        task::{CreateTask, Task, TaskFilter, TaskPriority, TaskStatus, UpdateTask},
        Pagination,
    },
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    middleware::tenant::TenantScope,
    routes::{events, projects::ensure_project, users::ensure_member},
};

#[derive(Debug, Deserialize)]
pub struct ProjectPath {
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct TaskPath {
    pub project_id: Uuid,
    pub task_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub sprint_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,

    /// `null` moves the task to the backlog
    #[serde(default, deserialize_with = "double_option")]
    pub sprint_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
}

async fn check_links(
    state: &AppState,
    scope: &TenantScope,
    project_id: Uuid,
    sprint_id: Option<Uuid>,
    assignee_id: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(sprint_id) = sprint_id {
        if !Sprint::belongs_to_project(&state.db, scope.tenant_id, project_id, sprint_id).await? {
            return Err(ApiError::invalid_field(
                "sprint_id",
                "Sprint does not belong to this project",
            ));
        }
    }
    if let Some(assignee_id) = assignee_id {
        ensure_member(state, scope.tenant_id, assignee_id, "assignee_id").await?;
    }
    Ok(())
}

pub async fn list_tasks(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ProjectPath>,
    Query(filter): Query<TaskFilter>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Task>>> {
    scope.require(ResourcePermission::Read)?;
    ensure_project(&state, scope.tenant_id, path.project_id).await?;

    let tasks = Task::list(&state.db, scope.tenant_id, path.project_id, filter, page.clamped()).await?;
    Ok(Json(tasks))
}

pub async fn create_task(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ProjectPath>,
    ValidatedJson(req): ValidatedJson<CreateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Write)?;
    ensure_project(&state, scope.tenant_id, path.project_id).await?;
    check_links(&state, &scope, path.project_id, req.sprint_id, req.assignee_id).await?;

    let task = Task::create(
        &state.db,
        scope.tenant_id,
        path.project_id,
        CreateTask {
            title: req.title.trim().to_string(),
            description: req.description,
            status: req.status.unwrap_or(TaskStatus::Todo),
            priority: req.priority.unwrap_or(TaskPriority::Medium),
            sprint_id: req.sprint_id,
            assignee_id: req.assignee_id,
            reporter_id: Some(scope.user_id),
            due_date: req.due_date,
        },
    )
    .await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "task", task.id, "created")
            .with_details(json!({ "project_id": path.project_id, "title": task.title })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TaskPath>,
) -> ApiResult<Json<Task>> {
    scope.require(ResourcePermission::Read)?;

    let task = Task::find_in_project(&state.db, scope.tenant_id, path.project_id, path.task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;
    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TaskPath>,
    ValidatedJson(req): ValidatedJson<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    scope.require(ResourcePermission::Write)?;

    let existing = Task::find_in_project(&state.db, scope.tenant_id, path.project_id, path.task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;
    check_links(
        &state,
        &scope,
        path.project_id,
        req.sprint_id.flatten(),
        req.assignee_id.flatten(),
    )
    .await?;

    let status_changed = req.status.filter(|s| *s != existing.status);

    let task = Task::update(
        &state.db,
        scope.tenant_id,
        path.project_id,
        path.task_id,
        UpdateTask {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            status: req.status,
            priority: req.priority,
            sprint_id: req.sprint_id,
            assignee_id: req.assignee_id,
            due_date: req.due_date,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Task"))?;

    let event = NewEvent::new(scope.tenant_id, scope.user_id, "task", task.id, "updated");
    let event = match status_changed {
        Some(status) => event.with_details(json!({
            "from": existing.status.as_str(),
            "to": status.as_str(),
        })),
        None => event,
    };
    events::record(&state.db, event).await;

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TaskPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Write)?;

    if !Task::delete(&state.db, scope.tenant_id, path.project_id, path.task_id).await? {
        return Err(ApiError::not_found("Task"));
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "task", path.task_id, "deleted"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

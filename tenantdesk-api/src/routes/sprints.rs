/// Sprints
///
/// # Endpoints
///
/// - `GET /v1/tenants/:tenant_id/projects/:project_id/sprints` - (Read)
/// - `POST /v1/tenants/:tenant_id/projects/:project_id/sprints` - (Write)
/// - `GET|PUT|DELETE .../sprints/:sprint_id` - (Read | Write | Write)
/// - `POST .../sprints/:sprint_id/start` - (Write) planned → active
/// - `POST .../sprints/:sprint_id/complete` - (Write) active → completed,
///   unfinished tasks go back to the backlog

use axum::{
    extract::{Path, State},
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
        sprint::{CreateSprint, Sprint, SprintCompletion, SprintStatus, UpdateSprint},
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

#[derive(Debug, Deserialize)]
pub struct ProjectPath {
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SprintPath {
    pub project_id: Uuid,
    pub sprint_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSprintRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Goal must be at most 2000 characters"))]
    pub goal: Option<String>,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSprintRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub goal: Option<Option<String>>,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

fn check_range(start: NaiveDate, end: NaiveDate) -> ApiResult<()> {
    if end < start {
        return Err(ApiError::invalid_field(
            "end_date",
            "End date cannot be before the start date",
        ));
    }
    Ok(())
}

async fn find_sprint(state: &AppState, tenant_id: Uuid, path: &SprintPath) -> ApiResult<Sprint> {
    Sprint::find_by_id(&state.db, tenant_id, path.project_id, path.sprint_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Sprint"))
}

pub async fn list_sprints(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ProjectPath>,
) -> ApiResult<Json<Vec<Sprint>>> {
    scope.require(ResourcePermission::Read)?;
    ensure_project(&state, scope.tenant_id, path.project_id).await?;

    let sprints = Sprint::list_by_project(&state.db, scope.tenant_id, path.project_id).await?;
    Ok(Json(sprints))
}

pub async fn create_sprint(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ProjectPath>,
    ValidatedJson(req): ValidatedJson<CreateSprintRequest>,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Write)?;
    check_range(req.start_date, req.end_date)?;
    ensure_project(&state, scope.tenant_id, path.project_id).await?;

    let sprint = Sprint::create(
        &state.db,
        scope.tenant_id,
        path.project_id,
        CreateSprint {
            name: req.name,
            goal: req.goal,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "sprint", sprint.id, "created")
            .with_details(json!({ "project_id": path.project_id, "name": sprint.name })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(sprint)))
}

pub async fn get_sprint(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SprintPath>,
) -> ApiResult<Json<Sprint>> {
    scope.require(ResourcePermission::Read)?;
    Ok(Json(find_sprint(&state, scope.tenant_id, &path).await?))
}

pub async fn update_sprint(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SprintPath>,
    ValidatedJson(req): ValidatedJson<UpdateSprintRequest>,
) -> ApiResult<Json<Sprint>> {
    scope.require(ResourcePermission::Write)?;

    let existing = find_sprint(&state, scope.tenant_id, &path).await?;
    if existing.status == SprintStatus::Completed {
        return Err(ApiError::Conflict("Completed sprints cannot be edited".to_string()));
    }
    check_range(
        req.start_date.unwrap_or(existing.start_date),
        req.end_date.unwrap_or(existing.end_date),
    )?;

    let sprint = Sprint::update(
        &state.db,
        scope.tenant_id,
        path.project_id,
        path.sprint_id,
        UpdateSprint {
            name: req.name,
            goal: req.goal,
            start_date: req.start_date,
            end_date: req.end_date,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Sprint"))?;

    Ok(Json(sprint))
}

pub async fn delete_sprint(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SprintPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Write)?;

    if !Sprint::delete(&state.db, scope.tenant_id, path.project_id, path.sprint_id).await? {
        return Err(ApiError::not_found("Sprint"));
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "sprint", path.sprint_id, "deleted"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// 409 if the sprint is not planned or another sprint is already active
pub async fn start_sprint(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SprintPath>,
) -> ApiResult<Json<Sprint>> {
    scope.require(ResourcePermission::Write)?;

    let existing = find_sprint(&state, scope.tenant_id, &path).await?;
    if existing.status != SprintStatus::Planned {
        return Err(ApiError::Conflict(
            "Only planned sprints can be started".to_string(),
        ));
    }

    let sprint = Sprint::start(&state.db, scope.tenant_id, path.sprint_id)
        .await?
        .ok_or_else(|| ApiError::Conflict("Only planned sprints can be started".to_string()))?;

    tracing::info!(tenant_id = %scope.tenant_id, sprint_id = %sprint.id, "Sprint started");
    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "sprint", sprint.id, "started"),
    )
    .await;

    Ok(Json(sprint))
}

pub async fn complete_sprint(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SprintPath>,
) -> ApiResult<Json<SprintCompletion>> {
    scope.require(ResourcePermission::Write)?;
    find_sprint(&state, scope.tenant_id, &path).await?;

    let mut tx = state.db.begin().await?;
    let completion = Sprint::complete(&mut tx, scope.tenant_id, path.sprint_id)
        .await?
        .ok_or_else(|| ApiError::Conflict("Only active sprints can be completed".to_string()))?;
    tx.commit().await?;

    tracing::info!(
        tenant_id = %scope.tenant_id,
        sprint_id = %completion.sprint.id,
        returned = completion.returned_to_backlog,
        "Sprint completed"
    );
    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "sprint", completion.sprint.id, "completed")
            .with_details(json!({ "returned_to_backlog": completion.returned_to_backlog })),
    )
    .await;

    Ok(Json(completion))
}

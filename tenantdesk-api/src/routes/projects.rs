/// Projects
///
/// # Endpoints
///
/// - `GET /v1/tenants/:tenant_id/projects?status=active&limit=50&offset=0` - (Read)
/// - `POST /v1/tenants/:tenant_id/projects` - (Write)
/// - `GET /v1/tenants/:tenant_id/projects/:project_id` - (Read)
/// - `PUT /v1/tenants/:tenant_id/projects/:project_id` - (Write)
/// - `DELETE /v1/tenants/:tenant_id/projects/:project_id` - (Manage) with its
///   sprints, tasks and boards

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
        project::{CreateProject, Project, ProjectStatus, UpdateProject},
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
    routes::{events, users::ensure_member},
};

#[derive(Debug, Deserialize)]
pub struct ProjectPath {
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,

    /// Defaults to the caller
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub status: Option<ProjectStatus>,

    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "double_option")]
    pub owner_id: Option<Option<Uuid>>,
}

fn check_dates(start: Option<NaiveDate>, due: Option<NaiveDate>) -> ApiResult<()> {
    match (start, due) {
        (Some(start), Some(due)) if due < start => Err(ApiError::invalid_field(
            "due_date",
            "Due date cannot be before the start date",
        )),
        _ => Ok(()),
    }
}

/// 404 unless the project exists in the tenant
pub(crate) async fn ensure_project(state: &AppState, tenant_id: Uuid, project_id: Uuid) -> ApiResult<()> {
    if Project::exists(&state.db, tenant_id, project_id).await? {
        Ok(())
    } else {
        Err(ApiError::not_found("Project"))
    }
}

pub async fn list_projects(
    State(state): State<AppState>,
    scope: TenantScope,
    Query(query): Query<ProjectQuery>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Project>>> {
    scope.require(ResourcePermission::Read)?;

    let projects = Project::list(&state.db, scope.tenant_id, query.status, page.clamped()).await?;
    Ok(Json(projects))
}

pub async fn create_project(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Write)?;
    check_dates(req.start_date, req.due_date)?;

    let owner_id = req.owner_id.unwrap_or(scope.user_id);
    if owner_id != scope.user_id {
        ensure_member(&state, scope.tenant_id, owner_id, "owner_id").await?;
    }

    let project = Project::create(
        &state.db,
        scope.tenant_id,
        CreateProject {
            name: req.name.trim().to_string(),
            description: req.description,
            status: req.status.unwrap_or(ProjectStatus::Planned),
            start_date: req.start_date,
            due_date: req.due_date,
            owner_id: Some(owner_id),
        },
    )
    .await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "project", project.id, "created")
            .with_details(json!({ "name": project.name })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ProjectPath>,
) -> ApiResult<Json<Project>> {
    scope.require(ResourcePermission::Read)?;

    let project = Project::find_by_id(&state.db, scope.tenant_id, path.project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;
    Ok(Json(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ProjectPath>,
    ValidatedJson(req): ValidatedJson<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    scope.require(ResourcePermission::Write)?;

    let existing = Project::find_by_id(&state.db, scope.tenant_id, path.project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;

    check_dates(
        req.start_date.unwrap_or(existing.start_date),
        req.due_date.unwrap_or(existing.due_date),
    )?;
    if let Some(Some(owner_id)) = req.owner_id {
        ensure_member(&state, scope.tenant_id, owner_id, "owner_id").await?;
    }

    let status_changed = req.status.filter(|s| *s != existing.status);

    let project = Project::update(
        &state.db,
        scope.tenant_id,
        path.project_id,
        UpdateProject {
            name: req.name.map(|n| n.trim().to_string()),
            description: req.description,
            status: req.status,
            start_date: req.start_date,
            due_date: req.due_date,
            owner_id: req.owner_id,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Project"))?;

    let event = NewEvent::new(scope.tenant_id, scope.user_id, "project", project.id, "updated");
    let event = match status_changed {
        Some(status) => event.with_details(json!({ "from": existing.status, "to": status })),
        None => event,
    };
    events::record(&state.db, event).await;

    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ProjectPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Manage)?;

    if !Project::delete(&state.db, scope.tenant_id, path.project_id).await? {
        return Err(ApiError::not_found("Project"));
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "project", path.project_id, "deleted"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

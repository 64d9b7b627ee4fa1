/// Teams
///
/// Tenant-wide groups of members that tasks can be assigned to.
///
/// # Endpoints
///
/// - `GET|POST /v1/tenants/:tenant_id/teams` - (Read | Write)
/// - `GET|PUT /v1/tenants/:tenant_id/teams/:team_id` - (Read | Write)
/// - `DELETE /v1/tenants/:tenant_id/teams/:team_id` - (Manage)
/// - `GET .../teams/:team_id/members` - (Read)
/// - `PUT|DELETE .../teams/:team_id/members/:user_id` - (Write)
///   `{"role": "lead"}`, role defaults to `member`
/// - `GET .../teams/:team_id/tasks` - (Read)
/// - `PUT|DELETE .../teams/:team_id/tasks/:task_id` - (Write)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tenantdesk_shared::{
    auth::authorization::ResourcePermission,
    models::{
        double_option,
        event_log::NewEvent,
        task::Task,
        team::{Team, TeamMember, TeamRole, TeamTask},
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
pub struct TeamPath {
    pub team_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct TeamMemberPath {
    pub team_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct TeamTaskPath {
    pub team_id: Uuid,
    pub task_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTeamRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTeamRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PutMemberRequest {
    pub role: Option<TeamRole>,
}

async fn find_team(state: &AppState, tenant_id: Uuid, team_id: Uuid) -> ApiResult<Team> {
    Team::find_by_id(&state.db, tenant_id, team_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Team"))
}

pub async fn list_teams(
    State(state): State<AppState>,
    scope: TenantScope,
) -> ApiResult<Json<Vec<Team>>> {
    scope.require(ResourcePermission::Read)?;
    Ok(Json(Team::list(&state.db, scope.tenant_id).await?))
}

pub async fn create_team(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<CreateTeamRequest>,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Write)?;

    let team = Team::create(&state.db, scope.tenant_id, req.name.trim(), req.description).await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "team", team.id, "created")
            .with_details(json!({ "name": team.name })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn get_team(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TeamPath>,
) -> ApiResult<Json<Team>> {
    scope.require(ResourcePermission::Read)?;
    Ok(Json(find_team(&state, scope.tenant_id, path.team_id).await?))
}

pub async fn update_team(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TeamPath>,
    ValidatedJson(req): ValidatedJson<UpdateTeamRequest>,
) -> ApiResult<Json<Team>> {
    scope.require(ResourcePermission::Write)?;

    let team = Team::update(
        &state.db,
        scope.tenant_id,
        path.team_id,
        req.name.map(|n| n.trim().to_string()),
        req.description,
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Team"))?;

    Ok(Json(team))
}

pub async fn delete_team(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TeamPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Manage)?;

    if !Team::delete(&state.db, scope.tenant_id, path.team_id).await? {
        return Err(ApiError::not_found("Team"));
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "team", path.team_id, "deleted"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TeamPath>,
) -> ApiResult<Json<Vec<TeamMember>>> {
    scope.require(ResourcePermission::Read)?;
    let team = find_team(&state, scope.tenant_id, path.team_id).await?;

    Ok(Json(Team::list_members(&state.db, team.id).await?))
}

/// Adds a tenant member to the team or changes their team role
///
/// The body is required; `{}` leaves the role at `member`.
pub async fn put_member(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TeamMemberPath>,
    ValidatedJson(req): ValidatedJson<PutMemberRequest>,
) -> ApiResult<Json<Vec<TeamMember>>> {
    scope.require(ResourcePermission::Write)?;
    let team = find_team(&state, scope.tenant_id, path.team_id).await?;
    ensure_member(&state, scope.tenant_id, path.user_id, "user_id").await?;

    let role = req.role.unwrap_or(TeamRole::Member);
    Team::upsert_member(&state.db, team.id, path.user_id, role).await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "team", team.id, "member_set")
            .with_details(json!({ "user_id": path.user_id, "role": role })),
    )
    .await;

    Ok(Json(Team::list_members(&state.db, team.id).await?))
}

pub async fn remove_member(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TeamMemberPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Write)?;
    let team = find_team(&state, scope.tenant_id, path.team_id).await?;

    if !Team::remove_member(&state.db, team.id, path.user_id).await? {
        return Err(ApiError::NotFound("User is not on this team".to_string()));
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "team", team.id, "member_removed")
            .with_details(json!({ "user_id": path.user_id })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tasks(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TeamPath>,
) -> ApiResult<Json<Vec<TeamTask>>> {
    scope.require(ResourcePermission::Read)?;
    let team = find_team(&state, scope.tenant_id, path.team_id).await?;

    Ok(Json(Team::list_tasks(&state.db, team.id).await?))
}

/// Idempotent: assigning an already assigned task succeeds
pub async fn assign_task(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TeamTaskPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Write)?;
    let team = find_team(&state, scope.tenant_id, path.team_id).await?;
    Task::find_by_id(&state.db, scope.tenant_id, path.task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;

    if Team::assign_task(&state.db, team.id, path.task_id).await? {
        events::record(
            &state.db,
            NewEvent::new(scope.tenant_id, scope.user_id, "task", path.task_id, "team_assigned")
                .with_details(json!({ "team_id": team.id })),
        )
        .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn unassign_task(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TeamTaskPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Write)?;
    let team = find_team(&state, scope.tenant_id, path.team_id).await?;

    if !Team::unassign_task(&state.db, team.id, path.task_id).await? {
        return Err(ApiError::NotFound("Task is not assigned to this team".to_string()));
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "task", path.task_id, "team_unassigned")
            .with_details(json!({ "team_id": team.id })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

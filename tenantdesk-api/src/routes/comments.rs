/// Task comments
///
/// # Endpoints
///
/// - `GET /v1/tenants/:tenant_id/tasks/:task_id/comments` - (Read) oldest first
/// - `POST /v1/tenants/:tenant_id/tasks/:task_id/comments` - (Write)
/// - `PUT .../comments/:comment_id` - author only
/// - `DELETE .../comments/:comment_id` - (Write) author, or Manage

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tenantdesk_shared::{
    auth::authorization::ResourcePermission,
    models::{comment::Comment, event_log::NewEvent, task::Task, Pagination},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    middleware::tenant::TenantScope,
    routes::events,
};

#[derive(Debug, Deserialize)]
pub struct TaskPath {
    pub task_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CommentPath {
    pub task_id: Uuid,
    pub comment_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 10000, message = "Comment must be 1-10000 characters"))]
    pub body: String,
}

async fn ensure_task(state: &AppState, tenant_id: Uuid, task_id: Uuid) -> ApiResult<()> {
    Task::find_by_id(&state.db, tenant_id, task_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Task"))
}

async fn find_comment(state: &AppState, tenant_id: Uuid, path: &CommentPath) -> ApiResult<Comment> {
    Comment::find_by_id(&state.db, tenant_id, path.task_id, path.comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))
}

pub async fn list_comments(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TaskPath>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Comment>>> {
    scope.require(ResourcePermission::Read)?;
    ensure_task(&state, scope.tenant_id, path.task_id).await?;

    let comments = Comment::list_by_task(&state.db, scope.tenant_id, path.task_id, page.clamped()).await?;
    Ok(Json(comments))
}

pub async fn create_comment(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<TaskPath>,
    ValidatedJson(req): ValidatedJson<CommentRequest>,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Write)?;
    ensure_task(&state, scope.tenant_id, path.task_id).await?;

    let body = req.body.trim();
    if body.is_empty() {
        return Err(ApiError::invalid_field("body", "Comment cannot be blank"));
    }

    let comment = Comment::create(&state.db, scope.tenant_id, path.task_id, scope.user_id, body).await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "task", path.task_id, "commented")
            .with_details(json!({ "comment_id": comment.id })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn update_comment(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<CommentPath>,
    ValidatedJson(req): ValidatedJson<CommentRequest>,
) -> ApiResult<Json<Comment>> {
    scope.require(ResourcePermission::Write)?;

    let comment = find_comment(&state, scope.tenant_id, &path).await?;
    if !comment.is_author(scope.user_id) {
        return Err(ApiError::Forbidden(
            "Only the author can edit a comment".to_string(),
        ));
    }

    let body = req.body.trim();
    if body.is_empty() {
        return Err(ApiError::invalid_field("body", "Comment cannot be blank"));
    }

    if !Comment::update_body(&state.db, scope.tenant_id, comment.id, body).await? {
        return Err(ApiError::not_found("Comment"));
    }

    Ok(Json(find_comment(&state, scope.tenant_id, &path).await?))
}

/// Authors may remove their own comments; anyone else needs Manage
fn check_delete(scope: &TenantScope, comment: &Comment) -> ApiResult<()> {
    if comment.is_author(scope.user_id) || scope.can(ResourcePermission::Manage) {
        return Ok(());
    }
    Err(ApiError::Forbidden(
        "Only the author or an admin can delete a comment".to_string(),
    ))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<CommentPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Write)?;
    let comment = find_comment(&state, scope.tenant_id, &path).await?;
    check_delete(&scope, &comment)?;

    if !Comment::delete(&state.db, scope.tenant_id, comment.id).await? {
        return Err(ApiError::not_found("Comment"));
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "task", path.task_id, "comment_deleted")
            .with_details(json!({ "comment_id": comment.id })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

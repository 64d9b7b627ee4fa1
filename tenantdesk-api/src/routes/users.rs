/// Tenant members
///
/// # Endpoints
///
/// - `GET /v1/tenants/:tenant_id/users` - (Read) members with roles
/// - `GET /v1/tenants/:tenant_id/users/:user_id` - (Read)
/// - `PUT /v1/tenants/:tenant_id/users/:user_id/role` - (Manage)
/// - `DELETE /v1/tenants/:tenant_id/users/:user_id` - (Manage, or yourself)
///
/// # Owner Rules
///
/// Only owners may grant the owner role or change/remove another owner. A
/// tenant always keeps at least one owner: the owner rows are locked while
/// the change is checked, so two concurrent demotions cannot both pass.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tenantdesk_shared::{
    auth::authorization::ResourcePermission,
    models::{
        event_log::NewEvent,
        membership::{Member, Membership, MembershipRole},
    },
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
pub struct MemberPath {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    pub role: MembershipRole,
}

pub async fn list_members(
    State(state): State<AppState>,
    scope: TenantScope,
) -> ApiResult<Json<Vec<Member>>> {
    scope.require(ResourcePermission::Read)?;
    Ok(Json(Membership::list_members(&state.db, scope.tenant_id).await?))
}

pub async fn get_member(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<MemberPath>,
) -> ApiResult<Json<Member>> {
    scope.require(ResourcePermission::Read)?;

    let member = Membership::find_member(&state.db, scope.tenant_id, path.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member"))?;
    Ok(Json(member))
}

pub async fn update_member_role(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<MemberPath>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> ApiResult<Json<Member>> {
    scope.require(ResourcePermission::Manage)?;

    let mut tx = state.db.begin().await?;
    let owners = Membership::lock_owners(&mut *tx, scope.tenant_id).await?;

    let current = Membership::get_role(&mut *tx, scope.tenant_id, path.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member"))?;

    let touches_owner = current == MembershipRole::Owner || req.role == MembershipRole::Owner;
    if touches_owner && scope.role != MembershipRole::Owner {
        return Err(ApiError::Forbidden(
            "Only owners can grant or change the owner role".to_string(),
        ));
    }
    if current == MembershipRole::Owner && req.role != MembershipRole::Owner && owners <= 1 {
        return Err(ApiError::Conflict("Cannot demote the last owner".to_string()));
    }

    Membership::update_role(&mut *tx, scope.tenant_id, path.user_id, req.role).await?;
    tx.commit().await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "membership", path.user_id, "role_changed")
            .with_details(json!({ "from": current, "to": req.role })),
    )
    .await;

    let member = Membership::find_member(&state.db, scope.tenant_id, path.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member"))?;
    Ok(Json(member))
}

/// Remove a member
///
/// Members may remove themselves (leave) without the Manage permission.
/// The removed user's sessions in this tenant end immediately.
pub async fn remove_member(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<MemberPath>,
) -> ApiResult<StatusCode> {
    let leaving = path.user_id == scope.user_id;
    if !leaving {
        scope.require(ResourcePermission::Manage)?;
    }

    let mut tx = state.db.begin().await?;
    let owners = Membership::lock_owners(&mut *tx, scope.tenant_id).await?;

    let current = Membership::get_role(&mut *tx, scope.tenant_id, path.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member"))?;

    if current == MembershipRole::Owner {
        if !leaving && scope.role != MembershipRole::Owner {
            return Err(ApiError::Forbidden("Only owners can remove an owner".to_string()));
        }
        if owners <= 1 {
            return Err(ApiError::Conflict("Cannot remove the last owner".to_string()));
        }
    }

    Membership::delete(&mut *tx, scope.tenant_id, path.user_id).await?;
    tx.commit().await?;

    tracing::info!(tenant_id = %scope.tenant_id, user_id = %path.user_id, "Member removed");
    events::record(
        &state.db,
        NewEvent::new(
            scope.tenant_id,
            scope.user_id,
            "membership",
            path.user_id,
            if leaving { "left" } else { "removed" },
        ),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// 400 unless `user_id` is a member of the tenant
pub(crate) async fn ensure_member(
    state: &AppState,
    tenant_id: Uuid,
    user_id: Uuid,
    field: &str,
) -> ApiResult<()> {
    if Membership::is_member(&state.db, tenant_id, user_id).await? {
        Ok(())
    } else {
        Err(ApiError::invalid_field(field, "User is not a member of this tenant"))
    }
}

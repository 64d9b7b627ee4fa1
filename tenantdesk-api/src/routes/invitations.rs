/// Tenant invitations
///
/// # Endpoints
///
/// - `POST /v1/tenants/:tenant_id/invitations` - (Manage) invite an email
/// - `GET /v1/tenants/:tenant_id/invitations?status=pending` - (Manage)
/// - `DELETE /v1/tenants/:tenant_id/invitations/:invitation_id` - (Manage) revoke
///
/// The invitation token only travels in the email. The invitee accepts by
/// registering (or signing in to an existing account) at
/// `POST /v1/auth/register` with `invitation_token`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tenantdesk_shared::{
    auth::{
        authorization::ResourcePermission,
        token::{self, TokenKind},
    },
    models::{
        event_log::NewEvent,
        invitation::{CreateInvitation, Invitation, InvitationStatus},
        membership::{Membership, MembershipRole},
        tenant::Tenant,
        user::User,
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
    services::mailer::Email,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvitationRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[serde(default = "default_role")]
    pub role: MembershipRole,
}

fn default_role() -> MembershipRole {
    MembershipRole::Member
}

#[derive(Debug, Deserialize)]
pub struct InvitationQuery {
    pub status: Option<InvitationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct InvitationPath {
    pub invitation_id: Uuid,
}

pub async fn create_invitation(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<CreateInvitationRequest>,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Manage)?;

    if req.role == MembershipRole::Owner && scope.role != MembershipRole::Owner {
        return Err(ApiError::Forbidden("Only owners can invite owners".to_string()));
    }

    let email = req.email.trim().to_lowercase();

    if Membership::is_member_by_email(&state.db, scope.tenant_id, &email).await? {
        return Err(ApiError::Conflict(
            "This email already belongs to a member of the tenant".to_string(),
        ));
    }

    let tenant = Tenant::find_by_id(&state.db, scope.tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant"))?;
    let inviter = User::find_by_id(&state.db, scope.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let (raw, hash) = token::generate(TokenKind::Invitation);

    let mut tx = state.db.begin().await?;
    Invitation::expire_stale(&mut *tx, scope.tenant_id, &email).await?;
    let invitation = Invitation::create(
        &mut *tx,
        CreateInvitation {
            tenant_id: scope.tenant_id,
            email: email.clone(),
            role: req.role,
            token_hash: hash,
            invited_by: scope.user_id,
        },
    )
    .await?;
    tx.commit().await?;

    let link = state.config.public_link("/accept-invitation", &raw);
    state.mailer.send_in_background(Email::invitation(
        &invitation.email,
        &tenant.name,
        inviter.display_name(),
        invitation.role.as_str(),
        &link,
    ));

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "invitation", invitation.id, "created")
            .with_details(json!({ "email": invitation.email, "role": invitation.role })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(invitation)))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    scope: TenantScope,
    Query(query): Query<InvitationQuery>,
) -> ApiResult<Json<Vec<Invitation>>> {
    scope.require(ResourcePermission::Manage)?;

    let invitations = Invitation::list_by_tenant(&state.db, scope.tenant_id, query.status).await?;
    Ok(Json(invitations))
}

pub async fn revoke_invitation(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<InvitationPath>,
) -> ApiResult<Json<Invitation>> {
    scope.require(ResourcePermission::Manage)?;

    let Some(invitation) = Invitation::revoke(&state.db, scope.tenant_id, path.invitation_id).await? else {
        return match Invitation::find_by_id(&state.db, scope.tenant_id, path.invitation_id).await? {
            Some(existing) => Err(ApiError::Conflict(format!(
                "Invitation is already {:?}",
                existing.effective_status()
            )
            .to_lowercase())),
            None => Err(ApiError::not_found("Invitation")),
        };
    };

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "invitation", invitation.id, "revoked"),
    )
    .await;

    Ok(Json(invitation))
}

/// Tenant scope for `/v1/tenants/:tenant_id/...` routes
///
/// [`TenantScope`] is an extractor that runs after the JWT middleware. It
/// resolves `:tenant_id` from the path, rejects sessions scoped to another
/// tenant, and loads the caller's current membership role. Handlers then
/// check the permission the operation needs:
///
/// ```no_run
/// use tenantdesk_api::{error::ApiResult, middleware::tenant::TenantScope};
/// use tenantdesk_shared::auth::authorization::ResourcePermission;
///
/// async fn delete_thing(scope: TenantScope) -> ApiResult<()> {
///     scope.require(ResourcePermission::Manage)?;
///     Ok(())
/// }
/// ```
///
/// The role is read from the database on every request, so a removed or
/// demoted member loses access immediately even with a live access token.

use axum::{
    async_trait,
    extract::{FromRequestParts, RawPathParams},
    http::request::Parts,
};
use tenantdesk_shared::{
    auth::{
        authorization::{check_permission, require_role, ResourcePermission},
        middleware::AuthContext,
    },
    models::membership::MembershipRole,
};
use uuid::Uuid;

use crate::{app::AppState, error::ApiError};

#[derive(Debug, Clone, Copy)]
pub struct TenantScope {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: MembershipRole,
}

impl TenantScope {
    pub fn require(&self, permission: ResourcePermission) -> Result<(), ApiError> {
        check_permission(self.role, permission)?;
        Ok(())
    }

    pub fn can(&self, permission: ResourcePermission) -> bool {
        check_permission(self.role, permission).is_ok()
    }
}

/// The `tenant_id` path segment
fn path_tenant_id(params: &RawPathParams) -> Result<Uuid, ApiError> {
    let raw = params
        .iter()
        .find(|(name, _)| *name == "tenant_id")
        .map(|(_, value)| value)
        .ok_or_else(|| ApiError::BadRequest("Missing tenant ID".to_string()))?;

    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid tenant ID".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for TenantScope {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        let params = RawPathParams::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::BadRequest("Missing tenant ID".to_string()))?;
        let tenant_id = path_tenant_id(&params)?;

        if auth.tenant_id != tenant_id {
            return Err(ApiError::Forbidden(
                "Session is scoped to a different tenant; switch tenants first".to_string(),
            ));
        }

        let role = require_role(&state.db, tenant_id, auth.user_id, ResourcePermission::Read).await?;

        Ok(Self {
            tenant_id,
            user_id: auth.user_id,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn scope(role: MembershipRole) -> TenantScope {
        TenantScope {
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_viewer_is_read_only() {
        let viewer = scope(MembershipRole::Viewer);
        assert!(viewer.can(ResourcePermission::Read));
        assert!(!viewer.can(ResourcePermission::Write));

        let err = viewer.require(ResourcePermission::Write).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_admin_manages_but_does_not_own() {
        let admin = scope(MembershipRole::Admin);
        assert!(admin.require(ResourcePermission::Manage).is_ok());
        assert!(admin.require(ResourcePermission::Own).is_err());
    }
}

//! Tenant role checks
//!
//! Handlers ask for a [`ResourcePermission`]; each permission is granted to
//! one role and everything ranked above it:
//!
//! ```text
//! Read   viewer and up
//! Write  member and up
//! Manage admin and up
//! Own    owner only
//! ```
//!
//! The role comes from the `memberships` row on every request. Tokens never
//! carry it, so promotions and demotions apply immediately.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::membership::{Membership, MembershipRole};

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("user has no membership in tenant {0}")]
    NotMember(Uuid),

    #[error("{actual} role cannot do this, {required} or higher is needed")]
    InsufficientRole {
        required: MembershipRole,
        actual: MembershipRole,
    },

    #[error(transparent)]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePermission {
    Read,
    Write,
    Manage,
    Own,
}

impl ResourcePermission {
    pub const fn min_role(self) -> MembershipRole {
        match self {
            Self::Read => MembershipRole::Viewer,
            Self::Write => MembershipRole::Member,
            Self::Manage => MembershipRole::Admin,
            Self::Own => MembershipRole::Owner,
        }
    }
}

pub fn check_permission(role: MembershipRole, permission: ResourcePermission) -> Result<(), AuthzError> {
    let required = permission.min_role();
    role.has_permission(&required)
        .then_some(())
        .ok_or(AuthzError::InsufficientRole { required, actual: role })
}

/// Resolves the caller's role in `tenant_id` and returns it if it satisfies `permission`
pub async fn require_role(
    db: impl PgExecutor<'_>,
    tenant_id: Uuid,
    user_id: Uuid,
    permission: ResourcePermission,
) -> Result<MembershipRole, AuthzError> {
    let Some(role) = Membership::get_role(db, tenant_id, user_id).await? else {
        return Err(AuthzError::NotMember(tenant_id));
    };
    check_permission(role, permission).map(|()| role)
}

/// Tenant invitations
///
/// An admin invites an email address with a role. The invitee receives an
/// opaque `tdi_` token by email and presents it at registration. At most one
/// pending invitation exists per (tenant, email).
///
/// # Lifecycle
///
/// ```text
/// pending ──accept──▶ accepted
///    │ ──revoke──▶ revoked
///    └─(7 days)──▶ expired
/// ```
///
/// Expiry is evaluated lazily: a pending row past `expires_at` is reported
/// as `expired` and is flipped to `expired` before a new invitation for the
/// same address is written.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::membership::MembershipRole;

/// How long an invitation stays usable
pub const INVITATION_LIFETIME_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invitation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invitation {
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub email: String,

    pub role: MembershipRole,

    #[serde(skip_serializing, default)]
    pub token_hash: String,

    pub invited_by: Option<Uuid>,

    pub status: InvitationStatus,

    pub expires_at: DateTime<Utc>,

    pub accepted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Invitation {
    /// Status with lazy expiry applied
    pub fn effective_status(&self) -> InvitationStatus {
        if self.status == InvitationStatus::Pending && self.expires_at <= Utc::now() {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }

    /// Copy with `status` replaced by the effective status, for responses
    pub fn with_effective_status(mut self) -> Self {
        self.status = self.effective_status();
        self
    }

    pub fn is_usable(&self) -> bool {
        self.effective_status() == InvitationStatus::Pending
    }
}

#[derive(Debug, Clone)]
pub struct CreateInvitation {
    pub tenant_id: Uuid,
    pub email: String,
    pub role: MembershipRole,
    pub token_hash: String,
    pub invited_by: Uuid,
}

const COLUMNS: &str = "id, tenant_id, email::TEXT AS email, role, token_hash, invited_by, status, \
                       expires_at, accepted_at, created_at";

impl Invitation {
    /// Inserts a pending invitation valid for seven days
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on `invitations_pending_email_key` when
    /// a live pending invitation exists for the address.
    pub async fn create(db: impl PgExecutor<'_>, data: CreateInvitation) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "INSERT INTO invitations (tenant_id, email, role, token_hash, invited_by, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        ))
        .bind(data.tenant_id)
        .bind(data.email.trim())
        .bind(data.role)
        .bind(data.token_hash)
        .bind(data.invited_by)
        .bind(Utc::now() + Duration::days(INVITATION_LIFETIME_DAYS))
        .fetch_one(db)
        .await
    }

    /// Flips stale pending invitations for an address to `expired`
    pub async fn expire_stale(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE invitations SET status = 'expired'
             WHERE tenant_id = $1 AND email = $2
               AND status = 'pending' AND expires_at <= NOW()",
        )
        .bind(tenant_id)
        .bind(email.trim())
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_by_id(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {COLUMNS} FROM invitations WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Looks up an invitation by token hash and locks it for acceptance
    ///
    /// Must run inside a transaction.
    pub async fn find_by_hash_for_update(
        db: impl PgExecutor<'_>,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {COLUMNS} FROM invitations WHERE token_hash = $1 FOR UPDATE"
        ))
        .bind(token_hash)
        .fetch_optional(db)
        .await
    }

    pub async fn list_by_tenant(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        status: Option<InvitationStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let invitations = sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {COLUMNS} FROM invitations
             WHERE tenant_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(tenant_id)
        .fetch_all(db)
        .await?;

        Ok(invitations
            .into_iter()
            .map(Invitation::with_effective_status)
            .filter(|inv| status.map_or(true, |s| inv.status == s))
            .collect())
    }

    pub async fn mark_accepted(db: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE invitations SET status = 'accepted', accepted_at = NOW()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revokes a pending invitation; returns the updated row if it was pending
    pub async fn revoke(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "UPDATE invitations SET status = 'revoked'
             WHERE tenant_id = $1 AND id = $2 AND status = 'pending'
             RETURNING {COLUMNS}"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(db)
        .await
    }
}

/// Membership model and database operations
///
/// Links a user to a tenant with a role. The composite primary key
/// `(tenant_id, user_id)` means a person appears at most once per tenant.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE membership_role AS ENUM ('owner', 'admin', 'member', 'viewer');
///
/// CREATE TABLE memberships (
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role membership_role NOT NULL DEFAULT 'member',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (tenant_id, user_id)
/// );
/// ```
///
/// # Roles
///
/// - **owner**: everything, including deleting the tenant
/// - **admin**: manage members, invitations, projects, teams and reorders
/// - **member**: create and edit day-to-day records
/// - **viewer**: read-only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "membership_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Owner => "owner",
            MembershipRole::Admin => "admin",
            MembershipRole::Member => "member",
            MembershipRole::Viewer => "viewer",
        }
    }

    /// Hierarchy: Owner > Admin > Member > Viewer
    pub fn has_permission(&self, required: &MembershipRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    fn permission_level(&self) -> u8 {
        match self {
            MembershipRole::Owner => 4,
            MembershipRole::Admin => 3,
            MembershipRole::Member => 2,
            MembershipRole::Viewer => 1,
        }
    }
}

impl std::fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub tenant_id: Uuid,

    pub user_id: Uuid,

    pub role: MembershipRole,

    pub created_at: DateTime<Utc>,
}

/// A tenant member joined with their user record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub user_id: Uuid,

    pub email: String,

    pub name: Option<String>,

    pub avatar_url: Option<String>,

    pub role: MembershipRole,

    pub joined_at: DateTime<Utc>,
}

const MEMBER_SELECT: &str = "SELECT u.id AS user_id, u.email::TEXT AS email, u.name, u.avatar_url,
                                    m.role, m.created_at AS joined_at
                             FROM memberships m
                             JOIN users u ON u.id = m.user_id";

impl Membership {
    /// Adds a user to a tenant
    ///
    /// # Errors
    ///
    /// Fails with a primary-key violation if the user is already a member.
    pub async fn create(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        user_id: Uuid,
        role: MembershipRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            "INSERT INTO memberships (tenant_id, user_id, role)
             VALUES ($1, $2, $3)
             RETURNING tenant_id, user_id, role, created_at",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(db)
        .await
    }

    /// The user's role in the tenant, or None if they are not a member
    pub async fn get_role(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MembershipRole>, sqlx::Error> {
        sqlx::query_scalar::<_, MembershipRole>(
            "SELECT role FROM memberships WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    pub async fn is_member(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        Ok(Self::get_role(db, tenant_id, user_id).await?.is_some())
    }

    pub async fn update_role(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        user_id: Uuid,
        role: MembershipRole,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE memberships SET role = $3 WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role)
        .execute(db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a member; their refresh tokens for this tenant go with them
    pub async fn delete(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM memberships WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query("DELETE FROM refresh_tokens WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Members of a tenant with their user details, owners first
    pub async fn list_members(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
    ) -> Result<Vec<Member>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "{MEMBER_SELECT}
             WHERE m.tenant_id = $1
             ORDER BY m.role ASC, m.created_at ASC"
        ))
        .bind(tenant_id)
        .fetch_all(db)
        .await
    }

    pub async fn find_member(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Member>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "{MEMBER_SELECT}
             WHERE m.tenant_id = $1 AND m.user_id = $2"
        ))
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    /// Locks the tenant's owner rows and returns how many there are
    ///
    /// Must run inside a transaction; concurrent demotions or removals of
    /// owners serialize on these row locks.
    pub async fn lock_owners(conn: &mut PgConnection, tenant_id: Uuid) -> Result<i64, sqlx::Error> {
        let owners: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM memberships
             WHERE tenant_id = $1 AND role = 'owner'
             FOR UPDATE",
        )
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(owners.len() as i64)
    }

    pub async fn is_member_by_email(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM memberships m
                JOIN users u ON u.id = m.user_id
                WHERE m.tenant_id = $1 AND u.email = $2
            )",
        )
        .bind(tenant_id)
        .bind(email.trim())
        .fetch_one(db)
        .await
    }
}

/// Tenant model and database operations
///
/// A tenant is a customer organization (a cleaning company, a facilities
/// team). Every business record belongs to exactly one tenant, and users
/// reach tenants through memberships.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenants (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     industry VARCHAR(100),
///     contact_email CITEXT,
///     settings JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Deleting a tenant cascades to every tenant-owned table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use uuid::Uuid;

use super::membership::MembershipRole;

const TENANT_COLUMNS: &str =
    "id, name, industry, contact_email::TEXT AS contact_email, settings, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,

    pub name: String,

    pub industry: Option<String>,

    pub contact_email: Option<String>,

    /// Free-form tenant configuration
    pub settings: JsonValue,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// A tenant as seen by one of its members
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantSummary {
    pub id: Uuid,

    pub name: String,

    pub industry: Option<String>,

    /// Caller's role in this tenant
    pub role: MembershipRole,

    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,

    pub industry: Option<String>,

    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTenant {
    pub name: Option<String>,

    pub industry: Option<Option<String>>,

    pub contact_email: Option<Option<String>>,

    /// Shallow-merged into the stored settings (top-level keys replaced)
    pub settings: Option<JsonValue>,
}

impl Tenant {
    pub async fn create(db: impl PgExecutor<'_>, data: CreateTenant) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(&format!(
            "INSERT INTO tenants (name, industry, contact_email)
             VALUES ($1, $2, $3)
             RETURNING {TENANT_COLUMNS}"
        ))
        .bind(data.name.trim())
        .bind(data.industry)
        .bind(data.contact_email)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(&format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Applies the `Some` fields of `data`
    ///
    /// `settings` is merged with the JSONB `||` operator rather than replaced.
    pub async fn update(
        db: impl PgExecutor<'_>,
        id: Uuid,
        data: UpdateTenant,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE tenants SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.industry.is_some() {
            bind_count += 1;
            query.push_str(&format!(", industry = ${}", bind_count));
        }
        if data.contact_email.is_some() {
            bind_count += 1;
            query.push_str(&format!(", contact_email = ${}", bind_count));
        }
        if data.settings.is_some() {
            bind_count += 1;
            query.push_str(&format!(", settings = settings || ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {TENANT_COLUMNS}"));

        let mut q = sqlx::query_as::<_, Tenant>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(industry) = data.industry {
            q = q.bind(industry);
        }
        if let Some(contact_email) = data.contact_email {
            q = q.bind(contact_email);
        }
        if let Some(settings) = data.settings {
            q = q.bind(settings);
        }

        q.fetch_optional(db).await
    }

    pub async fn delete(db: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Tenants the user belongs to, oldest membership first
    pub async fn list_for_user(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
    ) -> Result<Vec<TenantSummary>, sqlx::Error> {
        sqlx::query_as::<_, TenantSummary>(
            "SELECT t.id, t.name, t.industry, m.role, m.created_at AS joined_at
             FROM tenants t
             JOIN memberships m ON m.tenant_id = t.id
             WHERE m.user_id = $1
             ORDER BY m.created_at ASC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }
}

/// Workspace name for a self-registered user who gave none
pub fn default_workspace_name(owner_name: &str) -> String {
    format!("{}'s Workspace", owner_name.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_workspace_name() {
        assert_eq!(default_workspace_name("Dana "), "Dana's Workspace");
    }

    #[test]
    fn test_summary_serializes_role_lowercase() {
        let summary = TenantSummary {
            id: Uuid::new_v4(),
            name: "Sparkle Cleaning".to_string(),
            industry: Some("cleaning".to_string()),
            role: MembershipRole::Owner,
            joined_at: Utc::now(),
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["role"], "owner");
        assert_eq!(json["name"], "Sparkle Cleaning");
    }
}

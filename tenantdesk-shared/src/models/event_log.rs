/// Tenant activity log
///
/// Append-only record of who changed what. Rows are never updated; they go
/// away only with their tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgExecutor;
use uuid::Uuid;

use super::Pagination;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventLogEntry {
    pub id: i64,
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub action: String,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// A new entry to append
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub tenant_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub action: &'static str,
    pub details: JsonValue,
}

impl NewEvent {
    pub fn new(
        tenant_id: Uuid,
        actor_id: Uuid,
        entity_type: &'static str,
        entity_id: Uuid,
        action: &'static str,
    ) -> Self {
        Self {
            tenant_id,
            actor_id: Some(actor_id),
            entity_type,
            entity_id: Some(entity_id),
            action,
            details: JsonValue::Object(Default::default()),
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
}

const COLUMNS: &str = "id, tenant_id, actor_id, entity_type, entity_id, action, details, created_at";

impl EventLogEntry {
    pub async fn append(db: impl PgExecutor<'_>, event: NewEvent) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EventLogEntry>(&format!(
            "INSERT INTO event_log (tenant_id, actor_id, entity_type, entity_id, action, details)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        ))
        .bind(event.tenant_id)
        .bind(event.actor_id)
        .bind(event.entity_type)
        .bind(event.entity_id)
        .bind(event.action)
        .bind(event.details)
        .fetch_one(db)
        .await
    }

    /// Newest first
    pub async fn list(
        db: impl PgExecutor<'_>,
        tenant_id: Uuid,
        filter: &EventFilter,
        page: Pagination,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EventLogEntry>(&format!(
            "SELECT {COLUMNS} FROM event_log
             WHERE tenant_id = $1
               AND ($2::TEXT IS NULL OR entity_type = $2)
               AND ($3::UUID IS NULL OR entity_id = $3)
             ORDER BY id DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(tenant_id)
        .bind(filter.entity_type.as_deref())
        .bind(filter.entity_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_event_defaults_to_empty_details() {
        let event = NewEvent::new(Uuid::new_v4(), Uuid::new_v4(), "supply", Uuid::new_v4(), "created");
        assert_eq!(event.details, json!({}));
        assert!(event.actor_id.is_some());

        let event = event.with_details(json!({"delta": -3}));
        assert_eq!(event.details["delta"], -3);
    }
}

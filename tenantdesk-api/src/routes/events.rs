/// Activity log
///
/// Mutating handlers call [`record`] after their write succeeds. Recording
/// is best-effort: a failed insert is logged and the request still
/// succeeds.
///
/// # Endpoint
///
/// ```text
/// GET /v1/tenants/:tenant_id/events?entity_type=task&entity_id=...&limit=50&offset=0
/// ```

use axum::{
    extract::{Query, State},
    Json,
};
use sqlx::PgPool;
use tenantdesk_shared::{
    auth::authorization::ResourcePermission,
    models::{
        event_log::{EventFilter, EventLogEntry, NewEvent},
        Pagination,
    },
};

use crate::{app::AppState, error::ApiResult, middleware::tenant::TenantScope};

/// Appends an event, logging instead of failing
pub async fn record(db: &PgPool, event: NewEvent) {
    let (entity_type, action) = (event.entity_type, event.action);
    if let Err(e) = EventLogEntry::append(db, event).await {
        tracing::warn!(entity_type, action, error = %e, "Failed to record event");
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    scope: TenantScope,
    Query(filter): Query<EventFilter>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<EventLogEntry>>> {
    scope.require(ResourcePermission::Read)?;

    let events = EventLogEntry::list(&state.db, scope.tenant_id, &filter, page.clamped()).await?;
    Ok(Json(events))
}

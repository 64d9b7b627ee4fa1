/// Reorder requests
///
/// Purchase requests for supplies, moved through
///
/// ```text
/// pending ──▶ approved ──▶ ordered ──receive──▶ partial ──receive──▶ received
///    │            │           │                    │
///    └────────────┴───────────┴────────────────────┴──▶ canceled
/// ```
///
/// Receiving adds the delivered quantity to the supply's stock in the same
/// transaction that updates the request.
///
/// # Endpoints
///
/// - `GET /v1/tenants/:tenant_id/reorders?status=&supply_id=` - (Read)
/// - `POST /v1/tenants/:tenant_id/reorders` - (Write)
/// - `POST /v1/tenants/:tenant_id/reorders/auto` - (Manage) one pending request
///   per low-stock supply without an open request
/// - `GET /v1/tenants/:tenant_id/reorders/:reorder_id` - (Read)
/// - `PUT .../reorders/:reorder_id/status` - (Manage) approve, order or cancel
/// - `POST .../reorders/:reorder_id/receive` - (Write)
/// - `DELETE .../reorders/:reorder_id` - (Manage) pending or canceled only

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tenantdesk_shared::{
    auth::authorization::ResourcePermission,
    models::{
        event_log::NewEvent,
        reorder::{Receipt, ReorderFilter, ReorderRequest, ReorderStatus},
        supply::Supply,
        Pagination,
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
pub struct ReorderPath {
    pub reorder_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReorderRequest {
    pub supply_id: Uuid,

    /// Defaults to the supply's reorder quantity
    #[validate(range(min = 1, max = 1_000_000, message = "Quantity must be between 1 and 1000000"))]
    pub quantity: Option<i32>,

    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: ReorderStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReceiveRequest {
    #[validate(range(min = 1, max = 1_000_000, message = "Quantity must be between 1 and 1000000"))]
    pub quantity: i32,

    #[validate(length(min = 1, max = 1000, message = "Reason must be 1-1000 characters"))]
    pub discrepancy_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AutoReorderResponse {
    pub created: Vec<ReorderRequest>,
}

/// Statuses a client may set directly; the rest are reached by receiving
fn settable(status: ReorderStatus) -> bool {
    matches!(
        status,
        ReorderStatus::Approved | ReorderStatus::Ordered | ReorderStatus::Canceled
    )
}

pub async fn list_reorders(
    State(state): State<AppState>,
    scope: TenantScope,
    Query(filter): Query<ReorderFilter>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<ReorderRequest>>> {
    scope.require(ResourcePermission::Read)?;

    let requests = ReorderRequest::list(&state.db, scope.tenant_id, filter, page.clamped()).await?;
    Ok(Json(requests))
}

pub async fn create_reorder(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<CreateReorderRequest>,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Write)?;

    let supply = Supply::find_by_id(&state.db, scope.tenant_id, req.supply_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Supply"))?;

    let request = ReorderRequest::create(
        &state.db,
        scope.tenant_id,
        supply.id,
        req.quantity.unwrap_or(supply.reorder_quantity),
        scope.user_id,
        req.notes,
    )
    .await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "reorder", request.id, "created").with_details(
            json!({ "supply_id": supply.id, "quantity": request.quantity_requested }),
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn auto_reorder(
    State(state): State<AppState>,
    scope: TenantScope,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Manage)?;

    let mut tx = state.db.begin().await?;
    let created = ReorderRequest::create_for_low_stock(&mut tx, scope.tenant_id, scope.user_id).await?;
    tx.commit().await?;

    tracing::info!(
        tenant_id = %scope.tenant_id,
        created = created.len(),
        "Automatic reorder run"
    );
    for request in &created {
        events::record(
            &state.db,
            NewEvent::new(scope.tenant_id, scope.user_id, "reorder", request.id, "created").with_details(
                json!({ "supply_id": request.supply_id, "quantity": request.quantity_requested, "auto": true }),
            ),
        )
        .await;
    }

    let status = if created.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(AutoReorderResponse { created })))
}

pub async fn get_reorder(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ReorderPath>,
) -> ApiResult<Json<ReorderRequest>> {
    scope.require(ResourcePermission::Read)?;

    let request = ReorderRequest::find_by_id(&state.db, scope.tenant_id, path.reorder_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Reorder request"))?;
    Ok(Json(request))
}

pub async fn update_status(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ReorderPath>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> ApiResult<Json<ReorderRequest>> {
    scope.require(ResourcePermission::Manage)?;

    if !settable(req.status) {
        return Err(ApiError::invalid_field(
            "status",
            "Status must be approved, ordered or canceled",
        ));
    }

    let mut tx = state.db.begin().await?;
    let request =
        ReorderRequest::transition(&mut tx, scope.tenant_id, path.reorder_id, req.status, scope.user_id)
            .await?;
    tx.commit().await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "reorder", request.id, request.status.as_str()),
    )
    .await;

    Ok(Json(request))
}

/// Records a delivery
///
/// A total below the requested quantity leaves the request `partial`; both a
/// shortfall and an over-receipt need a `discrepancy_reason`.
pub async fn receive(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ReorderPath>,
    ValidatedJson(req): ValidatedJson<ReceiveRequest>,
) -> ApiResult<Json<Receipt>> {
    scope.require(ResourcePermission::Write)?;

    let reason = req
        .discrepancy_reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let mut tx = state.db.begin().await?;
    let receipt =
        ReorderRequest::receive(&mut tx, scope.tenant_id, path.reorder_id, req.quantity, reason).await?;
    tx.commit().await?;

    tracing::info!(
        tenant_id = %scope.tenant_id,
        reorder_id = %receipt.request.id,
        received = req.quantity,
        status = %receipt.request.status,
        stock = receipt.supply.quantity,
        "Reorder delivery received"
    );
    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "reorder", receipt.request.id, "received").with_details(
            json!({
                "quantity": req.quantity,
                "total_received": receipt.request.quantity_received,
                "status": receipt.request.status,
                "discrepancy_reason": reason,
            }),
        ),
    )
    .await;

    Ok(Json(receipt))
}

pub async fn delete_reorder(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<ReorderPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Manage)?;

    let mut tx = state.db.begin().await?;
    ReorderRequest::delete(&mut tx, scope.tenant_id, path.reorder_id).await?;
    tx.commit().await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "reorder", path.reorder_id, "deleted"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Inventory supplies
///
/// # Endpoints
///
/// - `GET /v1/tenants/:tenant_id/supplies?category=&search=` - (Read)
/// - `POST /v1/tenants/:tenant_id/supplies` - (Write)
/// - `GET /v1/tenants/:tenant_id/supplies/low-stock` - (Read)
///   quantity at or below the reorder level
/// - `GET|PUT /v1/tenants/:tenant_id/supplies/:supply_id` - (Read | Write)
/// - `DELETE /v1/tenants/:tenant_id/supplies/:supply_id` - (Manage)
/// - `POST .../supplies/:supply_id/adjust` - (Write)
///   `{"delta": -3, "reason": "used on site"}`, 409 if stock would go negative
/// - `POST .../supplies/:supply_id/image` - (Write) multipart `file`
///
/// Quantity is only changed through `adjust` and reorder receipts, never by
/// `PUT`, so every stock movement leaves an event.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tenantdesk_shared::{
    auth::authorization::ResourcePermission,
    models::{
        double_option,
        event_log::NewEvent,
        supply::{CreateSupply, StockAdjustment, Supply, SupplyFilter, UpdateSupply},
        Pagination,
    },
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{read_image, ValidatedJson},
    middleware::tenant::TenantScope,
    routes::events,
};

const IMAGE_FOLDER: &str = "tenantdesk/supplies";

#[derive(Debug, Deserialize)]
pub struct SupplyPath {
    pub supply_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSupplyRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 100, message = "SKU must be 1-100 characters"))]
    pub sku: String,

    #[validate(length(max = 100, message = "Category must be at most 100 characters"))]
    pub category: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Unit must be 1-50 characters"))]
    pub unit: Option<String>,

    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    #[serde(default)]
    pub quantity: i32,

    #[validate(range(min = 0, message = "Reorder level cannot be negative"))]
    #[serde(default)]
    pub reorder_level: i32,

    #[validate(range(min = 1, message = "Reorder quantity must be at least 1"))]
    pub reorder_quantity: Option<i32>,

    #[validate(range(min = 0, message = "Unit cost cannot be negative"))]
    pub unit_cost_cents: Option<i64>,

    #[validate(length(max = 255, message = "Supplier must be at most 255 characters"))]
    pub supplier: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSupplyRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 100, message = "SKU must be 1-100 characters"))]
    pub sku: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,

    #[validate(length(min = 1, max = 50, message = "Unit must be 1-50 characters"))]
    pub unit: Option<String>,

    #[validate(range(min = 0, message = "Reorder level cannot be negative"))]
    pub reorder_level: Option<i32>,

    #[validate(range(min = 1, message = "Reorder quantity must be at least 1"))]
    pub reorder_quantity: Option<i32>,

    #[serde(default, deserialize_with = "double_option")]
    pub unit_cost_cents: Option<Option<i64>>,

    #[serde(default, deserialize_with = "double_option")]
    pub supplier: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustStockRequest {
    #[validate(range(min = -1_000_000, max = 1_000_000, message = "Delta is out of range"))]
    pub delta: i32,

    #[validate(length(min = 1, max = 500, message = "Reason must be 1-500 characters"))]
    pub reason: String,
}

impl AdjustStockRequest {
    /// The trimmed reason, once delta and reason both carry something
    fn checked_reason(&self) -> ApiResult<&str> {
        if self.delta == 0 {
            return Err(ApiError::invalid_field("delta", "Delta cannot be zero"));
        }
        match self.reason.trim() {
            "" => Err(ApiError::invalid_field("reason", "Reason cannot be blank")),
            reason => Ok(reason),
        }
    }
}

async fn find_supply(state: &AppState, tenant_id: Uuid, supply_id: Uuid) -> ApiResult<Supply> {
    Supply::find_by_id(&state.db, tenant_id, supply_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Supply"))
}

pub async fn list_supplies(
    State(state): State<AppState>,
    scope: TenantScope,
    Query(filter): Query<SupplyFilter>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Supply>>> {
    scope.require(ResourcePermission::Read)?;

    let supplies = Supply::list(&state.db, scope.tenant_id, &filter, page.clamped()).await?;
    Ok(Json(supplies))
}

pub async fn low_stock(
    State(state): State<AppState>,
    scope: TenantScope,
) -> ApiResult<Json<Vec<Supply>>> {
    scope.require(ResourcePermission::Read)?;
    Ok(Json(Supply::list_low_stock(&state.db, scope.tenant_id).await?))
}

pub async fn create_supply(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<CreateSupplyRequest>,
) -> ApiResult<impl IntoResponse> {
    scope.require(ResourcePermission::Write)?;

    let supply = Supply::create(
        &state.db,
        scope.tenant_id,
        CreateSupply {
            name: req.name.trim().to_string(),
            sku: req.sku.trim().to_string(),
            category: req.category,
            unit: req.unit.unwrap_or_else(|| "unit".to_string()),
            quantity: req.quantity,
            reorder_level: req.reorder_level,
            reorder_quantity: req.reorder_quantity.unwrap_or(1),
            unit_cost_cents: req.unit_cost_cents,
            supplier: req.supplier,
        },
    )
    .await?;

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "supply", supply.id, "created")
            .with_details(json!({ "sku": supply.sku, "quantity": supply.quantity })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(supply)))
}

pub async fn get_supply(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SupplyPath>,
) -> ApiResult<Json<Supply>> {
    scope.require(ResourcePermission::Read)?;
    Ok(Json(find_supply(&state, scope.tenant_id, path.supply_id).await?))
}

pub async fn update_supply(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SupplyPath>,
    ValidatedJson(req): ValidatedJson<UpdateSupplyRequest>,
) -> ApiResult<Json<Supply>> {
    scope.require(ResourcePermission::Write)?;

    if let Some(Some(cost)) = req.unit_cost_cents {
        if cost < 0 {
            return Err(ApiError::invalid_field(
                "unit_cost_cents",
                "Unit cost cannot be negative",
            ));
        }
    }

    let supply = Supply::update(
        &state.db,
        scope.tenant_id,
        path.supply_id,
        UpdateSupply {
            name: req.name.map(|n| n.trim().to_string()),
            sku: req.sku.map(|s| s.trim().to_string()),
            category: req.category,
            unit: req.unit,
            reorder_level: req.reorder_level,
            reorder_quantity: req.reorder_quantity,
            unit_cost_cents: req.unit_cost_cents,
            supplier: req.supplier,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Supply"))?;

    Ok(Json(supply))
}

pub async fn delete_supply(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SupplyPath>,
) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Manage)?;

    if !Supply::delete(&state.db, scope.tenant_id, path.supply_id).await? {
        return Err(ApiError::not_found("Supply"));
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "supply", path.supply_id, "deleted"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SupplyPath>,
    ValidatedJson(req): ValidatedJson<AdjustStockRequest>,
) -> ApiResult<Json<Supply>> {
    scope.require(ResourcePermission::Write)?;

    let reason = req.checked_reason()?;

    let supply = match Supply::adjust_stock(&state.db, scope.tenant_id, path.supply_id, req.delta).await? {
        StockAdjustment::Applied(supply) => supply,
        StockAdjustment::Insufficient { available } => {
            return Err(ApiError::Conflict(format!(
                "Insufficient stock: {} available, adjustment of {} requested",
                available, req.delta
            )))
        }
        StockAdjustment::NotFound => return Err(ApiError::not_found("Supply")),
    };

    if supply.is_low_stock() {
        tracing::info!(
            tenant_id = %scope.tenant_id,
            supply_id = %supply.id,
            quantity = supply.quantity,
            reorder_level = supply.reorder_level,
            "Supply is low on stock"
        );
    }

    events::record(
        &state.db,
        NewEvent::new(scope.tenant_id, scope.user_id, "supply", supply.id, "stock_adjusted").with_details(
            json!({ "delta": req.delta, "reason": reason, "quantity": supply.quantity }),
        ),
    )
    .await;

    Ok(Json(supply))
}

pub async fn upload_image(
    State(state): State<AppState>,
    scope: TenantScope,
    Path(path): Path<SupplyPath>,
    multipart: Multipart,
) -> ApiResult<Json<Supply>> {
    scope.require(ResourcePermission::Write)?;
    let store = state.image_store()?;
    find_supply(&state, scope.tenant_id, path.supply_id).await?;

    let image = read_image(multipart).await?;
    let public_id = format!("{}-{}", scope.tenant_id, path.supply_id);
    let url = store.upload(IMAGE_FOLDER, &public_id, image).await?;

    let supply = Supply::set_image_url(&state.db, scope.tenant_id, path.supply_id, &url)
        .await?
        .ok_or_else(|| ApiError::not_found("Supply"))?;

    Ok(Json(supply))
}

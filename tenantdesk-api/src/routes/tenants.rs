/// Tenant endpoints
///
/// # Endpoints
///
/// - `POST /v1/tenants` - create a tenant; the caller becomes its owner
/// - `GET /v1/tenants` - tenants the caller belongs to, with their role
/// - `GET /v1/tenants/:tenant_id` - (Read)
/// - `PUT /v1/tenants/:tenant_id` - (Manage) `settings` keys are merged
/// - `DELETE /v1/tenants/:tenant_id` - (Own) removes everything the tenant owns
///
/// Creating a tenant does not move the current session; call
/// `/v1/auth/switch-tenant` to work in the new one.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tenantdesk_shared::{
    auth::{authorization::ResourcePermission, middleware::AuthContext},
    models::{
        double_option,
        event_log::NewEvent,
        membership::{Membership, MembershipRole},
        tenant::{CreateTenant, Tenant, TenantSummary, UpdateTenant},
    },
};
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    middleware::tenant::TenantScope,
    routes::events,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTenantRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 100, message = "Industry must be at most 100 characters"))]
    pub industry: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub contact_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTenantRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub industry: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub contact_email: Option<Option<String>>,

    /// JSON object; top-level keys replace stored ones
    pub settings: Option<JsonValue>,
}

pub async fn create_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<CreateTenantRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut tx = state.db.begin().await?;
    let tenant = Tenant::create(
        &mut *tx,
        CreateTenant {
            name: req.name,
            industry: req.industry,
            contact_email: req.contact_email,
        },
    )
    .await?;
    Membership::create(&mut *tx, tenant.id, auth.user_id, MembershipRole::Owner).await?;
    tx.commit().await?;

    tracing::info!(tenant_id = %tenant.id, user_id = %auth.user_id, "Tenant created");
    events::record(
        &state.db,
        NewEvent::new(tenant.id, auth.user_id, "tenant", tenant.id, "created")
            .with_details(json!({ "name": tenant.name })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn list_tenants(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<TenantSummary>>> {
    Ok(Json(Tenant::list_for_user(&state.db, auth.user_id).await?))
}

pub async fn get_tenant(State(state): State<AppState>, scope: TenantScope) -> ApiResult<Json<Tenant>> {
    scope.require(ResourcePermission::Read)?;

    let tenant = Tenant::find_by_id(&state.db, scope.tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant"))?;
    Ok(Json(tenant))
}

pub async fn update_tenant(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(req): ValidatedJson<UpdateTenantRequest>,
) -> ApiResult<Json<Tenant>> {
    scope.require(ResourcePermission::Manage)?;

    if req.settings.as_ref().is_some_and(|s| !s.is_object()) {
        return Err(ApiError::invalid_field("settings", "Settings must be a JSON object"));
    }

    let tenant = Tenant::update(
        &state.db,
        scope.tenant_id,
        UpdateTenant {
            name: req.name,
            industry: req.industry,
            contact_email: req.contact_email,
            settings: req.settings,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Tenant"))?;

    events::record(
        &state.db,
        NewEvent::new(tenant.id, scope.user_id, "tenant", tenant.id, "updated"),
    )
    .await;

    Ok(Json(tenant))
}

pub async fn delete_tenant(State(state): State<AppState>, scope: TenantScope) -> ApiResult<StatusCode> {
    scope.require(ResourcePermission::Own)?;

    if !Tenant::delete(&state.db, scope.tenant_id).await? {
        return Err(ApiError::not_found("Tenant"));
    }

    tracing::info!(tenant_id = %scope.tenant_id, user_id = %scope.user_id, "Tenant deleted");
    Ok(StatusCode::NO_CONTENT)
}

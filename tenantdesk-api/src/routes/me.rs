/// The caller's own account
///
/// # Endpoints
///
/// - `PUT /v1/me` - change display name
/// - `GET /v1/me/profile` - profile (empty fields when never saved)
/// - `PUT /v1/me/profile` - replace the profile
/// - `POST /v1/me/avatar` - multipart `file`; uploads and sets `avatar_url`

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Deserialize;
use tenantdesk_shared::{
    auth::middleware::AuthContext,
    models::{
        profile::{Profile, UpsertProfile},
        user::{UpdateUser, User},
    },
};
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{read_image, ValidatedJson},
};

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMeRequest {
    /// `null` clears the name
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileRequest {
    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    pub phone: Option<String>,

    #[validate(length(max = 100, message = "Job title must be at most 100 characters"))]
    pub job_title: Option<String>,

    #[validate(length(max = 2000, message = "Bio must be at most 2000 characters"))]
    pub bio: Option<String>,

    /// IANA zone name, e.g. `Europe/Berlin`
    #[validate(length(max = 64, message = "Timezone must be at most 64 characters"))]
    pub timezone: Option<String>,
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<UpdateMeRequest>,
) -> ApiResult<Json<User>> {
    let user = User::update(
        &state.db,
        auth.user_id,
        UpdateUser {
            name: Some(req.name.map(|n| n.trim().to_string())),
            ..Default::default()
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(user))
}

pub async fn get_profile(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<Profile>> {
    Ok(Json(Profile::find_or_empty(&state.db, auth.user_id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<ProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let profile = Profile::upsert(
        &state.db,
        auth.user_id,
        UpsertProfile {
            phone: req.phone,
            job_title: req.job_title,
            bio: req.bio,
            timezone: req.timezone,
        },
    )
    .await?;

    Ok(Json(profile))
}

/// Upload an avatar image
///
/// # Errors
///
/// - `400 Bad Request`: missing `file`, unsupported type, or over 5 MiB
/// - `503 Service Unavailable`: image hosting not configured or unreachable
pub async fn upload_avatar(
    State(state): State<AppState>,
    auth: AuthContext,
    multipart: Multipart,
) -> ApiResult<Json<User>> {
    let store = state.image_store()?;
    let image = read_image(multipart).await?;

    let url = store
        .upload("tenantdesk/avatars", &auth.user_id.to_string(), image)
        .await?;

    let user = User::update(
        &state.db,
        auth.user_id,
        UpdateUser {
            avatar_url: Some(Some(url)),
            ..Default::default()
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;

    tracing::info!(user_id = %user.id, "Avatar updated");

    Ok(Json(user))
}

/// Authentication endpoints
///
/// # Endpoints
///
/// Public:
/// - `POST /v1/auth/register` - create an account (new workspace or invitation)
/// - `POST /v1/auth/login` - password login
/// - `POST /v1/auth/select-tenant` - finish a login that needs a tenant choice
/// - `POST /v1/auth/refresh` - rotate the refresh token
/// - `POST /v1/auth/logout` - end one or all sessions
/// - `POST /v1/auth/verify-email` - confirm the email address
/// - `POST /v1/auth/forgot-password` - email a reset link
/// - `POST /v1/auth/reset-password` - set a new password with the link's token
///
/// Authenticated:
/// - `POST /v1/auth/switch-tenant` - new session in another tenant
/// - `POST /v1/auth/resend-verification` - email a fresh verification link
/// - `GET /v1/auth/me` - current user, tenants and profile
///
/// # Tenant Selection
///
/// A user with several memberships who logs in without naming a tenant gets
///
/// ```json
/// {
///   "tenant_selection_required": true,
///   "selection_token": "eyJ...",
///   "tenants": [{ "id": "...", "name": "Acme", "role": "owner", ... }]
/// }
/// ```
///
/// and exchanges the 10-minute `selection_token` at `/select-tenant`.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tenantdesk_shared::{
    auth::{
        jwt::{self, Claims, TokenType},
        middleware::AuthContext,
        password, session,
        session::SessionTokens,
        token::{self, TokenKind},
    },
    models::{
        event_log::NewEvent,
        invitation::Invitation,
        membership::{Membership, MembershipRole},
        one_time_token::{OneTimeToken, TokenPurpose},
        profile::Profile,
        tenant::{default_workspace_name, CreateTenant, Tenant, TenantSummary},
        user::{CreateUser, UpdateUser, User},
    },
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    routes::events,
    services::mailer::Email,
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Strength is checked separately
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    /// Name of the new workspace (ignored when accepting an invitation)
    #[validate(length(min = 1, max = 100, message = "Tenant name must be 1-100 characters"))]
    pub tenant_name: Option<String>,

    #[validate(length(max = 100, message = "Industry must be at most 100 characters"))]
    pub industry: Option<String>,

    /// `tdi_...` token from an invitation email
    pub invitation_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Skip the selection prompt by naming the tenant up front
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SelectTenantRequest {
    #[validate(length(min = 1, message = "Selection token is required"))]
    pub selection_token: String,
    pub tenant_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SwitchTenantRequest {
    pub tenant_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogoutRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,

    /// End every session of the user, not just this one
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TokenRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// Tokens plus the signed-in user
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub tokens: SessionTokens,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct TenantSelectionResponse {
    pub tenant_selection_required: bool,
    pub selection_token: String,
    pub tenants: Vec<TenantSummary>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Session(SessionResponse),
    TenantSelection(TenantSelectionResponse),
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    /// Tenant of the current session
    pub tenant_id: Uuid,
    pub tenants: Vec<TenantSummary>,
    pub profile: Profile,
}

pub(crate) fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
}

fn check_password_strength(password: &str) -> ApiResult<()> {
    password::validate_password_strength(password).map_err(|e| ApiError::invalid_field("password", e))
}

/// Issues a session and stamps the login time
async fn start_session(
    state: &AppState,
    user: User,
    tenant_id: Uuid,
    user_agent: Option<&str>,
) -> ApiResult<SessionResponse> {
    let mut tx = state.db.begin().await?;
    let tokens = session::issue(&mut *tx, &state.session, user.id, tenant_id, user_agent).await?;
    User::update_last_login(&mut *tx, user.id).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, tenant_id = %tenant_id, "Session started");

    Ok(SessionResponse { tokens, user })
}

/// Session for the only (or requested) tenant, or the selection prompt
async fn session_or_selection(
    state: &AppState,
    user: User,
    requested_tenant: Option<Uuid>,
    user_agent: Option<&str>,
) -> ApiResult<LoginResponse> {
    let tenants = Tenant::list_for_user(&state.db, user.id).await?;

    if let Some(tenant_id) = requested_tenant {
        if !tenants.iter().any(|t| t.id == tenant_id) {
            return Err(ApiError::Forbidden("Not a member of this tenant".to_string()));
        }
        return Ok(LoginResponse::Session(
            start_session(state, user, tenant_id, user_agent).await?,
        ));
    }

    match tenants.as_slice() {
        [] => Err(ApiError::Forbidden(
            "This account does not belong to any tenant".to_string(),
        )),
        [only] => {
            let tenant_id = only.id;
            Ok(LoginResponse::Session(
                start_session(state, user, tenant_id, user_agent).await?,
            ))
        }
        _ => {
            let claims = Claims::new(user.id, None, TokenType::TenantSelection);
            let selection_token = jwt::create_token(&claims, state.jwt_secret())?;
            Ok(LoginResponse::TenantSelection(TenantSelectionResponse {
                tenant_selection_required: true,
                selection_token,
                tenants,
            }))
        }
    }
}

fn send_verification_email(state: &AppState, user: &User, token: &str) {
    let link = state.config.public_link("/verify-email", token);
    state
        .mailer
        .send_in_background(Email::verification(&user.email, user.display_name(), &link));
}

/// Register a new user
///
/// Without `invitation_token` a new tenant is created with the user as
/// owner. With one, the user joins the inviting tenant with the invited
/// role; an existing account may accept by giving its current password.
///
/// # Errors
///
/// - `400 Bad Request`: validation failed, invitation invalid or for another email
/// - `401 Unauthorized`: existing account, wrong password (invitation flow)
/// - `409 Conflict`: email already registered, or already a member
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    check_password_strength(&req.password)?;

    let email = req.email.trim().to_lowercase();
    let name = req.name.as_deref().map(str::trim).map(str::to_string);

    let mut tx = state.db.begin().await?;

    let (user, tenant_id, event) = match req.invitation_token.as_deref() {
        Some(raw_token) => {
            if !TokenKind::Invitation.matches_format(raw_token) {
                return Err(ApiError::BadRequest("Invalid invitation token".to_string()));
            }

            let invitation = Invitation::find_by_hash_for_update(&mut *tx, &token::hash_token(raw_token))
                .await?
                .filter(Invitation::is_usable)
                .ok_or_else(|| {
                    ApiError::BadRequest("Invitation is invalid or has expired".to_string())
                })?;

            if !invitation.email.eq_ignore_ascii_case(&email) {
                return Err(ApiError::BadRequest(
                    "Invitation was sent to a different email address".to_string(),
                ));
            }

            let user = match User::find_by_email(&mut *tx, &email).await? {
                Some(existing) => {
                    if !password::verify_password(&req.password, &existing.password_hash)? {
                        return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
                    }
                    existing
                }
                None => {
                    User::create(
                        &mut *tx,
                        CreateUser {
                            email: email.clone(),
                            password_hash: password::hash_password(&req.password)?,
                            name: name.clone(),
                        },
                    )
                    .await?
                }
            };

            Membership::create(&mut *tx, invitation.tenant_id, user.id, invitation.role).await?;
            Invitation::mark_accepted(&mut *tx, invitation.id).await?;

            let event = NewEvent::new(invitation.tenant_id, user.id, "membership", user.id, "joined")
                .with_details(json!({ "role": invitation.role, "invitation_id": invitation.id }));
            (user, invitation.tenant_id, event)
        }
        None => {
            let user = User::create(
                &mut *tx,
                CreateUser {
                    email: email.clone(),
                    password_hash: password::hash_password(&req.password)?,
                    name: name.clone(),
                },
            )
            .await?;

            let tenant = Tenant::create(
                &mut *tx,
                CreateTenant {
                    name: req
                        .tenant_name
                        .as_deref()
                        .map(str::trim)
                        .map(str::to_string)
                        .unwrap_or_else(|| {
                            default_workspace_name(
                                name.as_deref()
                                    .unwrap_or_else(|| email.split('@').next().unwrap_or(&email)),
                            )
                        }),
                    industry: req.industry.clone(),
                    contact_email: Some(email.clone()),
                },
            )
            .await?;

            Membership::create(&mut *tx, tenant.id, user.id, MembershipRole::Owner).await?;

            let event = NewEvent::new(tenant.id, user.id, "tenant", tenant.id, "created")
                .with_details(json!({ "name": tenant.name }));
            (user, tenant.id, event)
        }
    };

    let verification = if user.email_verified {
        None
    } else {
        let (raw, hash) = token::generate(TokenKind::EmailVerification);
        OneTimeToken::create(&mut *tx, user.id, TokenPurpose::EmailVerification, &hash).await?;
        Some(raw)
    };

    let tokens = session::issue(&mut *tx, &state.session, user.id, tenant_id, user_agent(&headers)).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, tenant_id = %tenant_id, "User registered");

    if let Some(raw) = verification {
        send_verification_email(&state, &user, &raw);
    }
    events::record(&state.db, event).await;

    Ok((StatusCode::CREATED, Json(SessionResponse { tokens, user })))
}

/// Password login
///
/// # Errors
///
/// - `401 Unauthorized`: unknown email or wrong password
/// - `403 Forbidden`: no memberships, or not a member of `tenant_id`
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login failed: wrong password");
        return Err(invalid());
    }

    let response = session_or_selection(&state, user, req.tenant_id, user_agent(&headers)).await?;
    Ok(Json(response))
}

pub async fn select_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<SelectTenantRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let claims = jwt::validate_selection_token(&req.selection_token, state.jwt_secret())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    if !Membership::is_member(&state.db, req.tenant_id, user.id).await? {
        return Err(ApiError::Forbidden("Not a member of this tenant".to_string()));
    }

    Ok(Json(start_session(&state, user, req.tenant_id, user_agent(&headers)).await?))
}

pub async fn switch_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<SwitchTenantRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    if !Membership::is_member(&state.db, req.tenant_id, user.id).await? {
        return Err(ApiError::Forbidden("Not a member of this tenant".to_string()));
    }

    Ok(Json(start_session(&state, user, req.tenant_id, user_agent(&headers)).await?))
}

/// Rotate a refresh token
///
/// The presented token stops working. Presenting an already-rotated token
/// revokes every session of the user.
///
/// # Errors
///
/// - `401 Unauthorized`: invalid, expired or reused token, or membership revoked
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> ApiResult<Json<SessionTokens>> {
    let tokens = session::rotate(&state.db, &state.session, &req.refresh_token, user_agent(&headers)).await?;
    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> ApiResult<StatusCode> {
    let user_id = session::revoke(&state.db, &state.session, &req.refresh_token).await?;

    if req.all {
        let revoked = session::revoke_all(&state.db, user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Logged out of all sessions");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Confirm an email address
///
/// Responds like `/login`: a session, or the tenant-selection prompt.
///
/// # Errors
///
/// - `400 Bad Request`: unknown, used or expired token
pub async fn verify_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<TokenRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let invalid = || ApiError::BadRequest("Verification link is invalid or has expired".to_string());

    if !TokenKind::EmailVerification.matches_format(&req.token) {
        return Err(invalid());
    }

    let mut tx = state.db.begin().await?;
    let consumed = OneTimeToken::consume(&mut *tx, &token::hash_token(&req.token), TokenPurpose::EmailVerification)
        .await?
        .ok_or_else(invalid)?;
    User::mark_email_verified(&mut *tx, consumed.user_id).await?;
    tx.commit().await?;

    let user = User::find_by_id(&state.db, consumed.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    tracing::info!(user_id = %user.id, "Email verified");

    let response = session_or_selection(&state, user, None, user_agent(&headers)).await?;
    Ok(Json(response))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<StatusCode> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    if user.email_verified {
        return Err(ApiError::Conflict("Email is already verified".to_string()));
    }

    let (raw, hash) = token::generate(TokenKind::EmailVerification);
    let mut tx = state.db.begin().await?;
    OneTimeToken::invalidate_for_user(&mut *tx, user.id, TokenPurpose::EmailVerification).await?;
    OneTimeToken::create(&mut *tx, user.id, TokenPurpose::EmailVerification, &hash).await?;
    tx.commit().await?;

    send_verification_email(&state, &user, &raw);

    Ok(StatusCode::ACCEPTED)
}

/// Email a password reset link
///
/// Always 202, whether or not the address has an account.
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if let Some(user) = User::find_by_email(&state.db, &req.email).await? {
        let (raw, hash) = token::generate(TokenKind::PasswordReset);

        let mut tx = state.db.begin().await?;
        OneTimeToken::invalidate_for_user(&mut *tx, user.id, TokenPurpose::PasswordReset).await?;
        OneTimeToken::create(&mut *tx, user.id, TokenPurpose::PasswordReset, &hash).await?;
        tx.commit().await?;

        let link = state.config.public_link("/reset-password", &raw);
        state
            .mailer
            .send_in_background(Email::password_reset(&user.email, user.display_name(), &link));
    } else {
        tracing::debug!("Password reset requested for unknown email");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "If an account exists for that email, a reset link has been sent"
        })),
    ))
}

/// Set a new password with a reset token
///
/// Every session of the user is revoked.
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> ApiResult<StatusCode> {
    let invalid = || ApiError::BadRequest("Reset link is invalid or has expired".to_string());

    if !TokenKind::PasswordReset.matches_format(&req.token) {
        return Err(invalid());
    }
    check_password_strength(&req.password)?;
    let password_hash = password::hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;
    let consumed = OneTimeToken::consume(&mut *tx, &token::hash_token(&req.token), TokenPurpose::PasswordReset)
        .await?
        .ok_or_else(invalid)?;

    User::update(
        &mut *tx,
        consumed.user_id,
        UpdateUser {
            password_hash: Some(password_hash),
            ..Default::default()
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;

    let revoked = session::revoke_all(&mut *tx, consumed.user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id = %consumed.user_id, revoked, "Password reset");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<MeResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let tenants = Tenant::list_for_user(&state.db, user.id).await?;
    let profile = Profile::find_or_empty(&state.db, user.id).await?;

    Ok(Json(MeResponse {
        user,
        tenant_id: auth.tenant_id,
        tenants,
        profile,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let req = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            name: None,
            tenant_name: None,
            industry: None,
            invitation_token: None,
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_weak_password_is_field_error() {
        match check_password_strength("alllowercase1!") {
            Err(ApiError::ValidationError(details)) => assert_eq!(details[0].field, "password"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_selection_response_shape() {
        let response = LoginResponse::TenantSelection(TenantSelectionResponse {
            tenant_selection_required: true,
            selection_token: "tok".to_string(),
            tenants: vec![],
        });
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["tenant_selection_required"], true);
        assert_eq!(value["selection_token"], "tok");
    }
}

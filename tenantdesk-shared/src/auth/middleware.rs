/// Bearer-token authentication for Axum
///
/// [`jwt_auth_middleware`] validates the `Authorization: Bearer <token>`
/// header as an access token and stores an [`AuthContext`] in the request
/// extensions. Handlers then take `AuthContext` as an extractor.
///
/// # Example
///
/// ```no_run
/// use axum::{
///     extract::{Request, State},
///     middleware::{self, Next},
///     response::Response,
///     routing::get,
///     Router,
/// };
/// use tenantdesk_shared::auth::middleware::{jwt_auth_middleware, AuthContext, AuthError};
///
/// async fn whoami(auth: AuthContext) -> String {
///     format!("user {} in tenant {}", auth.user_id, auth.tenant_id)
/// }
///
/// async fn authenticate(
///     State(secret): State<String>,
///     req: Request,
///     next: Next,
/// ) -> Result<Response, AuthError> {
///     jwt_auth_middleware(secret, req, next).await
/// }
///
/// let secret = "a-secret-of-at-least-thirty-two-bytes".to_string();
/// let app: Router = Router::new()
///     .route("/whoami", get(whoami))
///     .layer(middleware::from_fn_with_state(secret, authenticate));
/// ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};

/// Identity of the caller, set by the JWT middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,

    /// Tenant the session is scoped to
    pub tenant_id: Uuid,
}

#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    InvalidFormat(String),
    InvalidToken(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AuthError::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing credentials".to_string(),
            ),
            AuthError::InvalidFormat(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AuthError::InvalidToken(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
        };

        let mut response = (status, Json(json!({ "error": error, "message": message }))).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            header::HeaderValue::from_static("Bearer"),
        );
        response
    }
}

/// Token from an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Validates the bearer token and attaches an [`AuthContext`]
pub async fn jwt_auth_middleware(
    secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers())?;

    let claims = validate_access_token(token, &secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
        JwtError::WrongType { .. } => AuthError::InvalidToken("Not an access token".to_string()),
        _ => AuthError::InvalidToken("Invalid token".to_string()),
    })?;

    let tenant_id = claims
        .tenant_id
        .ok_or_else(|| AuthError::InvalidToken("Token is not scoped to a tenant".to_string()))?;

    req.extensions_mut().insert(AuthContext {
        user_id: claims.sub,
        tenant_id,
    });

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .ok_or(AuthError::MissingCredentials)
    }
}

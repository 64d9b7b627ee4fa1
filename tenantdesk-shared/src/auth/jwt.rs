/// JWT creation and validation
///
/// Tokens are HS256-signed and carry the user, the tenant the session is
/// scoped to, and the token type.
///
/// # Token Types
///
/// - **Access** (1 hour): authenticates API calls
/// - **Refresh** (7 days): exchanged for a new access/refresh pair; carries a
///   `jti` that names its row in `refresh_tokens`
/// - **TenantSelection** (10 minutes): proves a user authenticated but has not
///   yet picked one of several tenants; carries no tenant
///
/// # Example
///
/// ```
/// use tenantdesk_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let claims = Claims::new(Uuid::new_v4(), Some(Uuid::new_v4()), TokenType::Access);
/// let token = create_token(&claims, "a-secret-of-at-least-thirty-two-bytes")?;
///
/// let validated = validate_access_token(&token, "a-secret-of-at-least-thirty-two-bytes")?;
/// assert_eq!(validated.sub, claims.sub);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of the `iss` claim
pub const ISSUER: &str = "tenantdesk";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid issuer")]
    InvalidIssuer,

    /// Token decoded fine but is the wrong kind for this use
    #[error("Expected {expected} token, got {actual}")]
    WrongType {
        expected: &'static str,
        actual: &'static str,
    },

    /// Access/refresh token without a tenant
    #[error("Token is not scoped to a tenant")]
    MissingTenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    TenantSelection,
}

impl TokenType {
    /// Default lifetime for the token type
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(1),
            TokenType::Refresh => Duration::days(7),
            TokenType::TenantSelection => Duration::minutes(10),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::TenantSelection => "tenant_selection",
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user ID
    pub sub: Uuid,

    /// Issuer - always "tenantdesk"
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Tenant the session is scoped to (absent on selection tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,

    pub token_type: TokenType,

    /// Token ID, set on refresh tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<Uuid>,
}

impl Claims {
    /// Creates claims with the token type's default lifetime
    pub fn new(user_id: Uuid, tenant_id: Option<Uuid>, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, tenant_id, token_type, token_type.default_expiration())
    }

    /// Creates claims expiring after `expires_in`
    pub fn with_expiration(
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            tenant_id,
            token_type,
            jti: None,
        }
    }

    /// Attaches a token ID
    pub fn with_jti(mut self, jti: Uuid) -> Self {
        self.jti = Some(jti);
        self
    }

    /// Tenant claim, required on access and refresh tokens
    pub fn require_tenant(&self) -> Result<Uuid, JwtError> {
        self.tenant_id.ok_or(JwtError::MissingTenant)
    }
}

/// Signs claims with HS256
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Verifies signature, expiry, not-before and issuer, and returns the claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

fn validate_typed(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != expected {
        return Err(JwtError::WrongType {
            expected: expected.as_str(),
            actual: claims.token_type.as_str(),
        });
    }

    Ok(claims)
}

/// Validates an access token; it must name a tenant
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_typed(token, secret, TokenType::Access)?;
    claims.require_tenant()?;
    Ok(claims)
}

/// Validates a refresh token; it must name a tenant and carry a `jti`
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_typed(token, secret, TokenType::Refresh)?;
    claims.require_tenant()?;

    if claims.jti.is_none() {
        return Err(JwtError::ValidationError("Refresh token has no jti".to_string()));
    }

    Ok(claims)
}

/// Validates a tenant-selection token
pub fn validate_selection_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::TenantSelection)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_token_type_expiration() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::hours(1));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(7));
        assert_eq!(
            TokenType::TenantSelection.default_expiration(),
            Duration::minutes(10)
        );
    }

    #[test]
    fn test_access_token_roundtrip() {
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();

        let claims = Claims::new(user_id, Some(tenant_id), TokenType::Access);
        let token = create_token(&claims, SECRET).unwrap();
        let validated = validate_access_token(&token, SECRET).unwrap();

        assert_eq!(validated.sub, user_id);
        assert_eq!(validated.tenant_id, Some(tenant_id));
        assert_eq!(validated.iss, ISSUER);
        assert!(validated.jti.is_none());
    }

    #[test]
    fn test_refresh_token_requires_jti() {
        let claims = Claims::new(Uuid::new_v4(), Some(Uuid::new_v4()), TokenType::Refresh);
        let token = create_token(&claims, SECRET).unwrap();
        assert!(validate_refresh_token(&token, SECRET).is_err());

        let jti = Uuid::new_v4();
        let token = create_token(&claims.with_jti(jti), SECRET).unwrap();
        let validated = validate_refresh_token(&token, SECRET).unwrap();
        assert_eq!(validated.jti, Some(jti));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let claims = Claims::new(Uuid::new_v4(), Some(Uuid::new_v4()), TokenType::Access);
        let token = create_token(&claims, SECRET).unwrap();
        assert!(validate_token(&token, "another-secret-key-at-least-32-bytes").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = Claims::with_expiration(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            TokenType::Access,
            Duration::seconds(-60),
        );
        assert!(claims.exp < Utc::now().timestamp());

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_type_confusion_rejected() {
        let refresh = Claims::new(Uuid::new_v4(), Some(Uuid::new_v4()), TokenType::Refresh)
            .with_jti(Uuid::new_v4());
        let token = create_token(&refresh, SECRET).unwrap();

        assert!(matches!(
            validate_access_token(&token, SECRET),
            Err(JwtError::WrongType { expected: "access", actual: "refresh" })
        ));
        assert!(validate_selection_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_access_token_without_tenant_rejected() {
        let claims = Claims::new(Uuid::new_v4(), None, TokenType::Access);
        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(
            validate_access_token(&token, SECRET),
            Err(JwtError::MissingTenant)
        ));
    }

    #[test]
    fn test_selection_token_has_no_tenant() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, None, TokenType::TenantSelection);
        let token = create_token(&claims, SECRET).unwrap();

        let validated = validate_selection_token(&token, SECRET).unwrap();
        assert_eq!(validated.sub, user_id);
        assert!(validated.tenant_id.is_none());
    }
}

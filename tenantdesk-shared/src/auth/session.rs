/// Login sessions with rotating refresh tokens
///
/// A session is an access/refresh JWT pair scoped to one tenant. Each
/// session owns one `refresh_tokens` row whose ID is the refresh token's
/// `jti`. Refreshing consumes that row and writes a new one, so every
/// refresh token works exactly once.
///
/// # Reuse Detection
///
/// A refresh token that verifies cryptographically but whose row is already
/// gone has been used before. That only happens if the token leaked (or a
/// client retried after a lost response), so every session of the user is
/// revoked and the caller has to log in again.
///
/// Several rows per user are normal: one per device or browser.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

use super::jwt::{create_token, validate_refresh_token, Claims, JwtError, TokenType};
use super::token::hash_token;
use crate::models::membership::Membership;
use crate::models::refresh_token::{NewRefreshToken, RefreshToken};

/// Signing key and lifetimes for issued tokens
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl SessionConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_ttl: TokenType::Access.default_expiration(),
            refresh_ttl: TokenType::Refresh.default_expiration(),
        }
    }
}

/// Token pair handed to the client
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Jwt(#[from] JwtError),

    #[error("Refresh token is invalid or expired")]
    InvalidRefreshToken,

    #[error("Refresh token was already used; all sessions have been revoked")]
    Reused,

    #[error("User is no longer a member of this tenant")]
    MembershipRevoked,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Starts a new session for `user_id` in `tenant_id`
///
/// Expired rows of the user are pruned on the way.
pub async fn issue(
    conn: &mut PgConnection,
    config: &SessionConfig,
    user_id: Uuid,
    tenant_id: Uuid,
    user_agent: Option<&str>,
) -> Result<SessionTokens, SessionError> {
    let pruned = RefreshToken::prune_expired(&mut *conn, user_id).await?;
    if pruned > 0 {
        debug!(user_id = %user_id, pruned, "Pruned expired refresh tokens");
    }

    let jti = Uuid::new_v4();

    let access = Claims::with_expiration(user_id, Some(tenant_id), TokenType::Access, config.access_ttl);
    let refresh = Claims::with_expiration(user_id, Some(tenant_id), TokenType::Refresh, config.refresh_ttl)
        .with_jti(jti);

    let access_token = create_token(&access, &config.jwt_secret)?;
    let refresh_token = create_token(&refresh, &config.jwt_secret)?;

    RefreshToken::create(
        &mut *conn,
        NewRefreshToken {
            id: jti,
            user_id,
            tenant_id,
            token_hash: hash_token(&refresh_token),
            user_agent: user_agent.map(|ua| ua.chars().take(512).collect()),
            expires_at: Utc::now() + config.refresh_ttl,
        },
    )
    .await?;

    Ok(SessionTokens {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: config.access_ttl.num_seconds(),
        user_id,
        tenant_id,
    })
}

/// Exchanges a refresh token for a new session
///
/// The old row is consumed and the new one written in one transaction.
pub async fn rotate(
    pool: &PgPool,
    config: &SessionConfig,
    refresh_token: &str,
    user_agent: Option<&str>,
) -> Result<SessionTokens, SessionError> {
    let claims = validate_refresh_token(refresh_token, &config.jwt_secret)?;
    let tenant_id = claims.require_tenant()?;
    let jti = claims.jti.ok_or(SessionError::InvalidRefreshToken)?;

    let mut tx = pool.begin().await?;

    let Some(row) = RefreshToken::take(&mut *tx, jti).await? else {
        let revoked = RefreshToken::delete_for_user(&mut *tx, claims.sub).await?;
        tx.commit().await?;

        warn!(
            user_id = %claims.sub,
            jti = %jti,
            revoked,
            "Refresh token reuse detected, revoked all sessions"
        );
        return Err(SessionError::Reused);
    };

    if row.token_hash != hash_token(refresh_token) || row.user_id != claims.sub {
        let revoked = RefreshToken::delete_for_user(&mut *tx, row.user_id).await?;
        tx.commit().await?;

        warn!(user_id = %row.user_id, revoked, "Refresh token mismatch, revoked all sessions");
        return Err(SessionError::Reused);
    }

    if row.expires_at <= Utc::now() {
        tx.commit().await?;
        return Err(SessionError::InvalidRefreshToken);
    }

    if Membership::get_role(&mut *tx, tenant_id, claims.sub).await?.is_none() {
        tx.commit().await?;
        return Err(SessionError::MembershipRevoked);
    }

    let tokens = issue(&mut *tx, config, claims.sub, tenant_id, user_agent).await?;
    tx.commit().await?;

    debug!(user_id = %claims.sub, tenant_id = %tenant_id, "Rotated refresh token");

    Ok(tokens)
}

/// Ends the session a refresh token belongs to
///
/// Idempotent: an already-revoked token is not an error. Returns the user
/// the token was issued to.
pub async fn revoke(
    db: impl PgExecutor<'_>,
    config: &SessionConfig,
    refresh_token: &str,
) -> Result<Uuid, SessionError> {
    let claims = validate_refresh_token(refresh_token, &config.jwt_secret)?;
    let jti = claims.jti.ok_or(SessionError::InvalidRefreshToken)?;

    sqlx::query("DELETE FROM refresh_tokens WHERE id = $1 AND user_id = $2 AND token_hash = $3")
        .bind(jti)
        .bind(claims.sub)
        .bind(hash_token(refresh_token))
        .execute(db)
        .await?;

    Ok(claims.sub)
}

/// Ends every session of a user
pub async fn revoke_all(db: impl PgExecutor<'_>, user_id: Uuid) -> Result<u64, SessionError> {
    Ok(RefreshToken::delete_for_user(db, user_id).await?)
}

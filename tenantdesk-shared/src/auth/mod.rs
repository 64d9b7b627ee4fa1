/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength rules
/// - [`jwt`]: access, refresh and tenant-selection JWTs
/// - [`token`]: opaque single-use tokens for email links and invitations
/// - [`session`]: refresh-token rotation backed by `refresh_tokens`
/// - [`middleware`]: bearer-token middleware and the `AuthContext` extractor
/// - [`authorization`]: role checks against tenant memberships
///
/// # Example
///
/// ```
/// use tenantdesk_shared::auth::password::{hash_password, verify_password};
/// use tenantdesk_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Fr3sh&Clean")?;
/// assert!(verify_password("Fr3sh&Clean", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), Some(Uuid::new_v4()), TokenType::Access);
/// let token = create_token(&claims, "a-secret-of-at-least-thirty-two-bytes")?;
/// assert!(validate_access_token(&token, "a-secret-of-at-least-thirty-two-bytes").is_ok());
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod session;
pub mod token;

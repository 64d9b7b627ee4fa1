/// Opaque single-use tokens
///
/// Email verification links, password reset links and tenant invitations all
/// carry a random token that the user presents back exactly once. Only the
/// SHA-256 hash is stored, so a database leak does not yield usable links.
///
/// # Format
///
/// `{prefix}{40 base62 chars}` where the prefix names the purpose:
/// `tdv_` (verification), `tdr_` (password reset), `tdi_` (invitation).
///
/// ```
/// use tenantdesk_shared::auth::token::{generate, hash_token, TokenKind};
///
/// let (token, hash) = generate(TokenKind::Invitation);
/// assert!(token.starts_with("tdi_"));
/// assert_eq!(hash, hash_token(&token));
/// assert!(TokenKind::Invitation.matches_format(&token));
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of the random part
const RANDOM_LENGTH: usize = 40;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EmailVerification,
    PasswordReset,
    Invitation,
}

impl TokenKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "tdv_",
            TokenKind::PasswordReset => "tdr_",
            TokenKind::Invitation => "tdi_",
        }
    }

    /// Cheap shape check before touching the database
    pub fn matches_format(&self, token: &str) -> bool {
        token
            .strip_prefix(self.prefix())
            .map(|rest| rest.len() == RANDOM_LENGTH && rest.bytes().all(|b| b.is_ascii_alphanumeric()))
            .unwrap_or(false)
    }
}

/// Generates a token and its storage hash
pub fn generate(kind: TokenKind) -> (String, String) {
    let mut rng = rand::thread_rng();
    let random: String = (0..RANDOM_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();

    let token = format!("{}{}", kind.prefix(), random);
    let hash = hash_token(&token);
    (token, hash)
}

/// Hex-encoded SHA-256 of a token (64 chars)
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

//! # TenantDesk Shared Library
//!
//! This crate contains the data layer and authentication primitives used by
//! the TenantDesk API server.
//!
//! ## Module Organization
//!
//! - `db`: Connection pooling and migrations
//! - `models`: Database models and their queries
//! - `auth`: Password hashing, JWTs, opaque tokens, sessions and RBAC

pub mod auth;
pub mod db;
pub mod models;

/// Current version of the TenantDesk shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

/// Database models for TenantDesk
///
/// One module per table (or tightly coupled group of tables). Each model is
/// a `sqlx::FromRow` struct with associated async functions that take any
/// Postgres executor, so the same query runs against the pool or inside a
/// transaction.
///
/// # Models
///
/// - `tenant`, `user`, `membership`, `profile`: identity and access
/// - `refresh_token`, `one_time_token`, `invitation`: authentication state
/// - `project`, `sprint`, `task`, `board`, `team`, `comment`: work tracking
/// - `event_log`: append-only activity log
/// - `supply`, `reorder`: inventory and restocking
///
/// Every tenant-owned query takes the tenant ID and filters on it, so a
/// row from another tenant reads as "not found".

use serde::{Deserialize, Deserializer};

pub mod board;
pub mod comment;
pub mod event_log;
pub mod invitation;
pub mod membership;
pub mod one_time_token;
pub mod profile;
pub mod project;
pub mod refresh_token;
pub mod reorder;
pub mod sprint;
pub mod supply;
pub mod task;
pub mod team;
pub mod tenant;
pub mod user;

/// Default page size for list endpoints
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a client may request
pub const MAX_PAGE_SIZE: i64 = 200;

/// Limit/offset pagination, read from the query string
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Clamps the limit into `1..=MAX_PAGE_SIZE` and the offset to `>= 0`
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.max(0),
        }
    }
}

/// Distinguishes an absent field from an explicit `null`
///
/// Use with `#[serde(default, deserialize_with = "double_option")]` on an
/// `Option<Option<T>>` field: absent → `None`, `null` → `Some(None)`,
/// value → `Some(Some(v))`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

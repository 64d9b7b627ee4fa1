//! `GET /health`
//!
//! Answers 200 whenever the process is up. `status` drops to `degraded` when
//! PostgreSQL does not respond or the schema is behind this build, so a load
//! balancer can still tell a sick instance from a dead one.

use crate::app::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use tenantdesk_shared::db::{
    migrations::get_migration_status,
    pool::{get_pool_stats, health_check as probe, PoolStats},
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub pool: PoolStats,

    /// Migration versions not yet applied; absent when the database is down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_migrations: Option<Vec<i64>>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let reachable = probe(&state.db)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Database probe failed"))
        .is_ok();

    let pending_migrations = if reachable {
        get_migration_status(&state.db)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Could not read migration status"))
            .ok()
            .map(|status| status.pending_versions)
    } else {
        None
    };

    let schema_current = pending_migrations.as_ref().is_some_and(|p| p.is_empty());

    Json(HealthResponse {
        status: if reachable && schema_current { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database: if reachable { "connected" } else { "disconnected" },
        pool: get_pool_stats(&state.db),
        pending_migrations,
    })
}

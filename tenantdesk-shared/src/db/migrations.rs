/// Schema migrations
///
/// The SQL files under the workspace `migrations/` directory are compiled
/// into [`MIGRATOR`]. The API applies them at startup; tests call
/// [`ensure_database_exists`] first so a fresh test database is created on
/// demand.
///
/// ```no_run
/// use tenantdesk_shared::db::{migrations, pool};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = pool::create_pool(pool::DatabaseConfig::from_url(std::env::var("DATABASE_URL")?)).await?;
/// migrations::run_migrations(&pool).await?;
///
/// let status = migrations::get_migration_status(&pool).await?;
/// assert!(status.is_up_to_date, "pending: {:?}", status.pending_versions);
/// # Ok(())
/// # }
/// ```

use sqlx::{
    migrate::{MigrateDatabase, MigrateError, Migrator},
    postgres::PgPool,
    Postgres,
};
use std::collections::HashSet;

pub static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub applied_migrations: usize,
    pub latest_version: Option<i64>,

    /// Embedded versions the database has not recorded as successful
    pub pending_versions: Vec<i64>,

    pub is_up_to_date: bool,
}

/// Applies whatever has not run yet; each file is its own transaction
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    let before = embedded_migration_count();
    tracing::info!(embedded = before, "Applying database migrations");

    MIGRATOR.run(pool).await.inspect_err(|e| {
        tracing::error!(error = %e, "Database migration failed");
    })?;

    tracing::info!("Database schema is current");
    Ok(())
}

pub fn embedded_migration_count() -> usize {
    MIGRATOR.iter().count()
}

/// Compares the `_sqlx_migrations` bookkeeping table with [`MIGRATOR`]
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let tracked: Option<String> =
        sqlx::query_scalar("SELECT to_regclass('public._sqlx_migrations')::text")
            .fetch_one(pool)
            .await?;

    let applied: Vec<i64> = match tracked {
        Some(_) => {
            sqlx::query_scalar(
                "SELECT version FROM _sqlx_migrations WHERE success ORDER BY version",
            )
            .fetch_all(pool)
            .await?
        }
        None => Vec::new(),
    };

    Ok(status_from(&applied, MIGRATOR.iter().map(|m| m.version)))
}

fn status_from(applied: &[i64], embedded: impl Iterator<Item = i64>) -> MigrationStatus {
    let done: HashSet<i64> = applied.iter().copied().collect();
    let pending_versions: Vec<i64> = embedded.filter(|v| !done.contains(v)).collect();

    MigrationStatus {
        applied_migrations: applied.len(),
        latest_version: applied.iter().copied().max(),
        is_up_to_date: pending_versions.is_empty(),
        pending_versions,
    }
}

/// Creates the target database when it is missing
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    if Postgres::database_exists(database_url).await? {
        return Ok(());
    }
    tracing::info!("Database not found, creating it");
    Postgres::create_database(database_url).await
}

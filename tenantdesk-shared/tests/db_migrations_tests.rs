/// Integration tests for database migrations
///
/// Skipped when `DATABASE_URL` is unset. Run single-threaded against a
/// scratch database:
///
/// ```text
/// cargo test -p tenantdesk-shared --test db_migrations_tests -- --test-threads=1
/// ```

use tenantdesk_shared::db::migrations::{
    embedded_migration_count, ensure_database_exists, get_migration_status, run_migrations,
};
use tenantdesk_shared::db::pool::{close_pool, create_pool, DatabaseConfig};

async fn migrated_pool() -> Option<sqlx::PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;

    ensure_database_exists(&url).await.expect("Failed to create database");
    let pool = create_pool(DatabaseConfig::from_url(url))
        .await
        .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Migrations failed");

    Some(pool)
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let Some(pool) = migrated_pool().await else { return };

    let first = get_migration_status(&pool).await.expect("status");
    run_migrations(&pool).await.expect("Second run failed");
    let second = get_migration_status(&pool).await.expect("status");

    assert_eq!(first.applied_migrations, second.applied_migrations);
    assert!(second.is_up_to_date);
    assert!(second.applied_migrations >= embedded_migration_count());

    close_pool(pool).await;
}

#[tokio::test]
async fn test_migration_creates_all_tables() {
    let Some(pool) = migrated_pool().await else { return };

    let expected = [
        "tenants",
        "users",
        "memberships",
        "profiles",
        "refresh_tokens",
        "one_time_tokens",
        "invitations",
        "projects",
        "sprints",
        "tasks",
        "boards",
        "board_tasks",
        "teams",
        "team_members",
        "task_teams",
        "comments",
        "event_log",
        "supplies",
        "reorder_requests",
    ];

    for table in expected {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .expect("Failed to query information_schema");

        assert!(exists, "Table '{}' should exist after migrations", table);
    }

    close_pool(pool).await;
}

#[tokio::test]
async fn test_migration_creates_enums() {
    let Some(pool) = migrated_pool().await else { return };

    for type_name in [
        "membership_role",
        "token_purpose",
        "invitation_status",
        "project_status",
        "sprint_status",
        "task_status",
        "task_priority",
        "team_role",
        "reorder_status",
    ] {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_type WHERE typname = $1)")
                .bind(type_name)
                .fetch_one(&pool)
                .await
                .expect("Failed to query pg_type");

        assert!(exists, "Enum '{}' should exist after migrations", type_name);
    }

    close_pool(pool).await;
}

/// Model-level workflow tests against PostgreSQL
///
/// Cover the multi-statement operations: session rotation, board ordering,
/// sprint lifecycle and reorder receipts. Skipped when `DATABASE_URL` is
/// unset.

use sqlx::PgPool;
use tenantdesk_shared::auth::session::{self, SessionConfig, SessionError};
use tenantdesk_shared::db::migrations::{ensure_database_exists, run_migrations};
use tenantdesk_shared::db::pool::{create_pool, DatabaseConfig};
use tenantdesk_shared::models::board::{default_columns, Board};
use tenantdesk_shared::models::membership::{Membership, MembershipRole};
use tenantdesk_shared::models::project::{CreateProject, Project, ProjectStatus};
use tenantdesk_shared::models::reorder::{ReorderError, ReorderRequest, ReorderStatus};
use tenantdesk_shared::models::sprint::{CreateSprint, Sprint, SprintStatus};
use tenantdesk_shared::models::supply::{CreateSupply, StockAdjustment, Supply};
use tenantdesk_shared::models::task::{CreateTask, Task, TaskPriority, TaskStatus};
use tenantdesk_shared::models::tenant::{CreateTenant, Tenant};
use tenantdesk_shared::models::user::{CreateUser, User};
use uuid::Uuid;

const SECRET: &str = "model-tests-secret-at-least-32-bytes!";

async fn pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    ensure_database_exists(&url).await.expect("create database");
    let pool = create_pool(DatabaseConfig::from_url(url)).await.expect("pool");
    run_migrations(&pool).await.expect("migrations");
    Some(pool)
}

/// A fresh tenant with an owner
async fn seed(pool: &PgPool) -> (Tenant, User) {
    let tenant = Tenant::create(
        pool,
        CreateTenant {
            name: "Sparkle Cleaning".to_string(),
            industry: Some("cleaning".to_string()),
            contact_email: None,
        },
    )
    .await
    .expect("tenant");

    let user = User::create(
        pool,
        CreateUser {
            email: format!("owner-{}@sparkle.example", Uuid::new_v4()),
            password_hash: "$argon2id$placeholder".to_string(),
            name: Some("Owner".to_string()),
        },
    )
    .await
    .expect("user");

    Membership::create(pool, tenant.id, user.id, MembershipRole::Owner)
        .await
        .expect("membership");

    (tenant, user)
}

async fn project(pool: &PgPool, tenant_id: Uuid) -> Project {
    Project::create(
        pool,
        tenant_id,
        CreateProject {
            name: "Office deep clean".to_string(),
            description: None,
            status: ProjectStatus::Active,
            start_date: None,
            due_date: None,
            owner_id: None,
        },
    )
    .await
    .expect("project")
}

async fn task(pool: &PgPool, tenant_id: Uuid, project_id: Uuid, title: &str) -> Task {
    Task::create(
        pool,
        tenant_id,
        project_id,
        CreateTask {
            title: title.to_string(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            sprint_id: None,
            assignee_id: None,
            reporter_id: None,
            due_date: None,
        },
    )
    .await
    .expect("task")
}

#[tokio::test]
async fn test_refresh_rotation_and_reuse_detection() {
    let Some(pool) = pool().await else { return };
    let (tenant, user) = seed(&pool).await;
    let config = SessionConfig::new(SECRET);

    let mut conn = pool.acquire().await.unwrap();
    let first = session::issue(&mut conn, &config, user.id, tenant.id, Some("test"))
        .await
        .unwrap();
    let other_device = session::issue(&mut conn, &config, user.id, tenant.id, None)
        .await
        .unwrap();
    drop(conn);

    let second = session::rotate(&pool, &config, &first.refresh_token, None)
        .await
        .unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_eq!(second.tenant_id, tenant.id);

    // Presenting the consumed token again revokes every session
    let reused = session::rotate(&pool, &config, &first.refresh_token, None).await;
    assert!(matches!(reused, Err(SessionError::Reused)));

    for token in [&second.refresh_token, &other_device.refresh_token] {
        let result = session::rotate(&pool, &config, token, None).await;
        assert!(matches!(result, Err(SessionError::Reused)));
    }
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let Some(pool) = pool().await else { return };
    let (tenant, user) = seed(&pool).await;
    let config = SessionConfig::new(SECRET);

    let mut conn = pool.acquire().await.unwrap();
    let tokens = session::issue(&mut conn, &config, user.id, tenant.id, None)
        .await
        .unwrap();
    drop(conn);

    assert_eq!(session::revoke(&pool, &config, &tokens.refresh_token).await.unwrap(), user.id);
    assert_eq!(session::revoke(&pool, &config, &tokens.refresh_token).await.unwrap(), user.id);
}

#[tokio::test]
async fn test_board_positions_stay_dense() {
    let Some(pool) = pool().await else { return };
    let (tenant, _) = seed(&pool).await;
    let project = project(&pool, tenant.id).await;
    let board = Board::create(&pool, tenant.id, project.id, "Main", default_columns())
        .await
        .unwrap();

    let a = task(&pool, tenant.id, project.id, "Vacuum").await;
    let b = task(&pool, tenant.id, project.id, "Mop").await;
    let c = task(&pool, tenant.id, project.id, "Dust").await;

    let mut tx = pool.begin().await.unwrap();
    for t in [&a, &b, &c] {
        Board::place_task(&mut tx, board.id, t.id, "todo", None).await.unwrap();
    }
    // Move c to the front, then a to another column
    Board::place_task(&mut tx, board.id, c.id, "todo", Some(0)).await.unwrap();
    Board::place_task(&mut tx, board.id, a.id, "done", Some(5)).await.unwrap();
    tx.commit().await.unwrap();

    let placed = Board::placements(&pool, board.id).await.unwrap();
    let todo: Vec<_> = placed
        .iter()
        .filter(|p| p.column_name == "todo")
        .map(|p| (p.task_id, p.position))
        .collect();
    assert_eq!(todo, vec![(c.id, 0), (b.id, 1)]);

    let done: Vec<_> = placed.iter().filter(|p| p.column_name == "done").collect();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].position, 0);

    let mut tx = pool.begin().await.unwrap();
    assert!(Board::remove_task(&mut tx, board.id, c.id).await.unwrap());
    assert!(!Board::remove_task(&mut tx, board.id, c.id).await.unwrap());
    tx.commit().await.unwrap();

    let placed = Board::placements(&pool, board.id).await.unwrap();
    let b_pos = placed.iter().find(|p| p.task_id == b.id).unwrap().position;
    assert_eq!(b_pos, 0);
}

#[tokio::test]
async fn test_sprint_lifecycle() {
    let Some(pool) = pool().await else { return };
    let (tenant, _) = seed(&pool).await;
    let project = project(&pool, tenant.id).await;

    let dates = |offset: u64| {
        let start = chrono::NaiveDate::from_ymd_opt(2026, 3, 2).unwrap() + chrono::Days::new(offset);
        CreateSprint {
            name: format!("Sprint {}", offset),
            goal: None,
            start_date: start,
            end_date: start + chrono::Days::new(13),
        }
    };

    let first = Sprint::create(&pool, tenant.id, project.id, dates(0)).await.unwrap();
    let second = Sprint::create(&pool, tenant.id, project.id, dates(14)).await.unwrap();

    let started = Sprint::start(&pool, tenant.id, first.id).await.unwrap().unwrap();
    assert_eq!(started.status, SprintStatus::Active);

    // Only one active sprint per project
    let err = Sprint::start(&pool, tenant.id, second.id).await.unwrap_err();
    assert!(err.as_database_error().and_then(|e| e.constraint()) == Some("sprints_one_active_per_project"));

    let open = task(&pool, tenant.id, project.id, "Windows").await;
    let finished = task(&pool, tenant.id, project.id, "Floors").await;
    for (t, status) in [(&open, TaskStatus::InProgress), (&finished, TaskStatus::Done)] {
        sqlx::query("UPDATE tasks SET sprint_id = $1, status = $2 WHERE id = $3")
            .bind(first.id)
            .bind(status)
            .bind(t.id)
            .execute(&pool)
            .await
            .unwrap();
    }

    let mut tx = pool.begin().await.unwrap();
    let completion = Sprint::complete(&mut tx, tenant.id, first.id).await.unwrap().unwrap();
    tx.commit().await.unwrap();

    assert_eq!(completion.returned_to_backlog, 1);
    let open = Task::find_by_id(&pool, tenant.id, open.id).await.unwrap().unwrap();
    let finished = Task::find_by_id(&pool, tenant.id, finished.id).await.unwrap().unwrap();
    assert_eq!(open.sprint_id, None);
    assert_eq!(finished.sprint_id, Some(first.id));
}

#[tokio::test]
async fn test_stock_adjustment_never_goes_negative() {
    let Some(pool) = pool().await else { return };
    let (tenant, _) = seed(&pool).await;

    let supply = Supply::create(
        &pool,
        tenant.id,
        CreateSupply {
            name: "Microfiber cloth".to_string(),
            sku: format!("MF-{}", Uuid::new_v4()),
            category: None,
            unit: "pack".to_string(),
            quantity: 3,
            reorder_level: 5,
            reorder_quantity: 20,
            unit_cost_cents: None,
            supplier: None,
        },
    )
    .await
    .unwrap();

    match Supply::adjust_stock(&pool, tenant.id, supply.id, -4).await.unwrap() {
        StockAdjustment::Insufficient { available } => assert_eq!(available, 3),
        other => panic!("unexpected {:?}", other),
    }

    match Supply::adjust_stock(&pool, tenant.id, supply.id, -3).await.unwrap() {
        StockAdjustment::Applied(s) => assert_eq!(s.quantity, 0),
        other => panic!("unexpected {:?}", other),
    }

    assert!(matches!(
        Supply::adjust_stock(&pool, tenant.id, Uuid::new_v4(), 1).await.unwrap(),
        StockAdjustment::NotFound
    ));
}

#[tokio::test]
async fn test_reorder_partial_then_full_receipt() {
    let Some(pool) = pool().await else { return };
    let (tenant, user) = seed(&pool).await;

    let supply = Supply::create(
        &pool,
        tenant.id,
        CreateSupply {
            name: "Floor cleaner".to_string(),
            sku: format!("FC-{}", Uuid::new_v4()),
            category: Some("chemicals".to_string()),
            unit: "litre".to_string(),
            quantity: 2,
            reorder_level: 5,
            reorder_quantity: 10,
            unit_cost_cents: Some(799),
            supplier: None,
        },
    )
    .await
    .unwrap();

    let mut tx = pool.begin().await.unwrap();
    let created = ReorderRequest::create_for_low_stock(&mut tx, tenant.id, user.id)
        .await
        .unwrap();
    // A second run finds the open request and creates nothing
    let again = ReorderRequest::create_for_low_stock(&mut tx, tenant.id, user.id)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(created.len(), 1);
    assert!(again.is_empty());
    let request = &created[0];
    assert_eq!(request.quantity_requested, 10);

    let mut tx = pool.begin().await.unwrap();
    let err = ReorderRequest::receive(&mut tx, tenant.id, request.id, 4, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReorderError::NotReceivable(ReorderStatus::Pending)));

    ReorderRequest::transition(&mut tx, tenant.id, request.id, ReorderStatus::Approved, user.id)
        .await
        .unwrap();
    let ordered =
        ReorderRequest::transition(&mut tx, tenant.id, request.id, ReorderStatus::Ordered, user.id)
            .await
            .unwrap();
    assert!(ordered.ordered_at.is_some());
    assert_eq!(ordered.approved_by, Some(user.id));

    let err = ReorderRequest::receive(&mut tx, tenant.id, request.id, 4, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReorderError::DiscrepancyReasonRequired { requested: 10, received: 4 }));

    let partial = ReorderRequest::receive(&mut tx, tenant.id, request.id, 4, Some("Backordered"))
        .await
        .unwrap();
    assert_eq!(partial.request.status, ReorderStatus::Partial);
    assert_eq!(partial.request.quantity_received, 4);
    assert_eq!(partial.supply.quantity, 6);

    let full = ReorderRequest::receive(&mut tx, tenant.id, request.id, 6, None)
        .await
        .unwrap();
    assert_eq!(full.request.status, ReorderStatus::Received);
    assert_eq!(full.request.quantity_received, 10);
    assert_eq!(full.supply.quantity, 12);
    tx.commit().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    let err = ReorderRequest::transition(&mut tx, tenant.id, request.id, ReorderStatus::Canceled, user.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReorderError::InvalidTransition { .. }));
    let err = ReorderRequest::delete(&mut tx, tenant.id, request.id).await.unwrap_err();
    assert!(matches!(err, ReorderError::NotDeletable(ReorderStatus::Received)));
    tx.rollback().await.unwrap();
}

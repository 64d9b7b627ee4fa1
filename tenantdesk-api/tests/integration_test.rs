/// End-to-end API tests
///
/// Each test registers its own users and workspaces, so tests can share a
/// database and run in parallel. All tests are skipped when `DATABASE_URL`
/// is unset.

mod common;

use axum::http::StatusCode;
use common::{parse_id, Account, TestContext, PASSWORD};
use uuid::Uuid;
use serde_json::json;

fn tenant_path(account: &Account, rest: &str) -> String {
    format!("/v1/tenants/{}{}", account.tenant_id, rest)
}

/// Invites `email` to the owner's tenant and accepts through registration
async fn invite_and_join(ctx: &TestContext, owner: &Account, name: &str, role: &str) -> Account {
    let email = format!("{}-{}@tenantdesk.test", name.to_lowercase(), Uuid::new_v4());
    let (status, body) = ctx
        .post(
            &tenant_path(owner, "/invitations"),
            Some(&owner.access_token),
            json!({ "email": email, "role": role }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "invite failed: {}", body);
    assert_eq!(body["status"], "pending");

    let token = ctx.token_from_email(&email).await;
    let (status, body) = ctx
        .post(
            "/v1/auth/register",
            None,
            json!({
                "email": email,
                "password": PASSWORD,
                "name": name,
                "invitation_token": token,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "accept failed: {}", body);
    assert_eq!(parse_id(&body["tenant_id"]), owner.tenant_id);

    Account {
        email,
        user_id: parse_id(&body["user_id"]),
        tenant_id: owner.tenant_id,
        access_token: body["access_token"].as_str().unwrap().to_string(),
        refresh_token: body["refresh_token"].as_str().unwrap().to_string(),
    }
}

#[tokio::test]
async fn test_register_verify_and_login() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;

    let (status, me) = ctx.get("/v1/auth/me", &ada.access_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["email_verified"], false);
    assert_eq!(me["tenants"].as_array().unwrap().len(), 1);
    assert_eq!(me["tenants"][0]["role"], "owner");
    assert!(me["user"].get("password_hash").is_none());

    let token = ctx.token_from_email(&ada.email).await;
    let (status, session) = ctx
        .post("/v1/auth/verify-email", None, json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", session);
    assert_eq!(session["user"]["email_verified"], true);

    // Single use
    let (status, _) = ctx
        .post("/v1/auth/verify-email", None, json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .post(
            "/v1/auth/login",
            None,
            json!({ "email": ada.email, "password": "Wr0ng&Password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = ctx
        .post(
            "/v1/auth/login",
            None,
            json!({ "email": ada.email.to_uppercase(), "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", login);
    assert_eq!(parse_id(&login["tenant_id"]), ada.tenant_id);
    assert_eq!(login["token_type"], "Bearer");
}

#[tokio::test]
async fn test_register_rejects_weak_password_and_duplicate_email() {
    let Some(ctx) = TestContext::new().await else { return };

    let (status, body) = ctx
        .post(
            "/v1/auth/register",
            None,
            json!({ "email": "weak@tenantdesk.test", "password": "alllowercase" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "password");

    let ada = ctx.register("Ada").await;
    let (status, _) = ctx
        .post(
            "/v1/auth/register",
            None,
            json!({ "email": ada.email, "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_refresh_rotation_detects_reuse() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;

    let (status, rotated) = ctx
        .post(
            "/v1/auth/refresh",
            None,
            json!({ "refresh_token": ada.refresh_token }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_refresh = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, ada.refresh_token);

    // Replaying the consumed token revokes the whole family
    let (status, _) = ctx
        .post(
            "/v1/auth/refresh",
            None,
            json!({ "refresh_token": ada.refresh_token }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = ctx
        .post("/v1/auth/refresh", None, json!({ "refresh_token": new_refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_with_several_tenants_requires_selection() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;

    let (status, second) = ctx
        .post(
            "/v1/tenants",
            Some(&ada.access_token),
            json!({ "name": "Ada's Laundry" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", second);
    let second_id = parse_id(&second["id"]);

    let (status, login) = ctx
        .post(
            "/v1/auth/login",
            None,
            json!({ "email": ada.email, "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["tenant_selection_required"], true);
    assert_eq!(login["tenants"].as_array().unwrap().len(), 2);
    assert!(login.get("access_token").is_none());

    let (status, session) = ctx
        .post(
            "/v1/auth/select-tenant",
            None,
            json!({
                "selection_token": login["selection_token"],
                "tenant_id": second_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", session);
    assert_eq!(parse_id(&session["tenant_id"]), second_id);

    // The selection token is not an access token
    let selection = login["selection_token"].as_str().unwrap();
    let (status, _) = ctx.get("/v1/auth/me", selection).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tenant_isolation_and_roles() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;
    let bo = ctx.register("Bo").await;

    // Bo's session is scoped to Bo's tenant
    let (status, _) = ctx.get(&tenant_path(&ada, "/projects"), &bo.access_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx.get("/v1/tenants/not-a-uuid/projects", &bo.access_token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .request(axum::http::Method::GET, &tenant_path(&ada, "/projects"), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let viewer = invite_and_join(&ctx, &ada, "Cy", "viewer").await;
    let (status, _) = ctx.get(&tenant_path(&ada, "/projects"), &viewer.access_token).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx
        .post(
            &tenant_path(&ada, "/projects"),
            Some(&viewer.access_token),
            json!({ "name": "Spring deep clean" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Promotion takes effect on the next request
    let (status, member) = ctx
        .put(
            &tenant_path(&ada, &format!("/users/{}/role", viewer.user_id)),
            &ada.access_token,
            json!({ "role": "member" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", member);
    let (status, _) = ctx
        .post(
            &tenant_path(&ada, "/projects"),
            Some(&viewer.access_token),
            json!({ "name": "Spring deep clean" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // The only owner cannot step down
    let (status, _) = ctx
        .put(
            &tenant_path(&ada, &format!("/users/{}/role", ada.user_id)),
            &ada.access_token,
            json!({ "role": "admin" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Removal revokes access immediately
    let (status, _) = ctx
        .delete(
            &tenant_path(&ada, &format!("/users/{}", viewer.user_id)),
            &ada.access_token,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = ctx.get(&tenant_path(&ada, "/projects"), &viewer.access_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invitation_conflicts_and_revoke() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;

    let invite = json!({ "email": "dee@tenantdesk.test", "role": "member" });
    let (status, invitation) = ctx
        .post(&tenant_path(&ada, "/invitations"), Some(&ada.access_token), invite.clone())
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(invitation.get("token_hash").is_none());

    let (status, _) = ctx
        .post(&tenant_path(&ada, "/invitations"), Some(&ada.access_token), invite)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .post(
            &tenant_path(&ada, "/invitations"),
            Some(&ada.access_token),
            json!({ "email": ada.email }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let path = tenant_path(&ada, &format!("/invitations/{}", invitation["id"].as_str().unwrap()));
    let (status, _) = ctx.delete(&path, &ada.access_token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = ctx.delete(&path, &ada.access_token).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_project_sprint_and_task_lifecycle() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;
    let bo = ctx.register("Bo").await;
    let token = ada.access_token.as_str();

    let (status, project) = ctx
        .post(
            &tenant_path(&ada, "/projects"),
            Some(token),
            json!({ "name": "Office tower contract", "status": "active" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", project);
    assert_eq!(parse_id(&project["owner_id"]), ada.user_id);
    let project_path = tenant_path(&ada, &format!("/projects/{}", project["id"].as_str().unwrap()));

    let (status, _) = ctx
        .post(
            &tenant_path(&ada, "/projects"),
            Some(token),
            json!({ "name": "Backwards", "start_date": "2025-03-10", "due_date": "2025-03-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut sprint_ids = Vec::new();
    for name in ["Week 1", "Week 2"] {
        let (status, sprint) = ctx
            .post(
                &format!("{}/sprints", project_path),
                Some(token),
                json!({ "name": name, "start_date": "2025-03-03", "end_date": "2025-03-14" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", sprint);
        assert_eq!(sprint["status"], "planned");
        sprint_ids.push(sprint["id"].as_str().unwrap().to_string());
    }

    let (status, task) = ctx
        .post(
            &format!("{}/tasks", project_path),
            Some(token),
            json!({ "title": "Polish lobby floors", "sprint_id": sprint_ids[0], "priority": "high" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", task);
    assert_eq!(task["status"], "todo");
    assert_eq!(parse_id(&task["reporter_id"]), ada.user_id);
    let task_path = format!("{}/tasks/{}", project_path, task["id"].as_str().unwrap());

    // Bo belongs to another tenant
    let (status, body) = ctx
        .post(
            &format!("{}/tasks", project_path),
            Some(token),
            json!({ "title": "Windows", "assignee_id": bo.user_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "assignee_id");

    let (status, _) = ctx
        .post(
            &format!("{}/sprints/{}/start", project_path, sprint_ids[0]),
            Some(token),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx
        .post(
            &format!("{}/sprints/{}/start", project_path, sprint_ids[1]),
            Some(token),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, completion) = ctx
        .post(
            &format!("{}/sprints/{}/complete", project_path, sprint_ids[0]),
            Some(token),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", completion);
    assert_eq!(completion["sprint"]["status"], "completed");
    assert_eq!(completion["returned_to_backlog"], 1);

    let (status, task) = ctx.get(&task_path, token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(task["sprint_id"].is_null());

    let (status, task) = ctx
        .put(&task_path, token, json!({ "status": "done", "assignee_id": ada.user_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "done");

    let (status, tasks) = ctx
        .get(&format!("{}/tasks?status=done", project_path), token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tasks.as_array().unwrap().len(), 1);

    let (status, comment) = ctx
        .post(
            &tenant_path(&ada, &format!("/tasks/{}/comments", task["id"].as_str().unwrap())),
            Some(token),
            json!({ "body": "Used the new buffer, looks great" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["author_name"], "Ada");

    let (status, events) = ctx
        .get(&tenant_path(&ada, "/events?entity_type=task"), token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert!(actions.contains(&"created"));
    assert!(actions.contains(&"commented"));

    let (status, _) = ctx.delete(&project_path, token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = ctx.get(&task_path, token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_board_placement_keeps_positions_dense() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;
    let token = ada.access_token.as_str();

    let (_, project) = ctx
        .post(&tenant_path(&ada, "/projects"), Some(token), json!({ "name": "Hotel" }))
        .await;
    let project_path = tenant_path(&ada, &format!("/projects/{}", project["id"].as_str().unwrap()));

    let (status, board) = ctx
        .post(&format!("{}/boards", project_path), Some(token), json!({ "name": "Floors" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(board["columns"], json!(["todo", "in_progress", "in_review", "done"]));
    let board_path = format!("{}/boards/{}", project_path, board["id"].as_str().unwrap());

    let mut task_ids = Vec::new();
    for title in ["Lobby", "Hallway", "Suites"] {
        let (_, task) = ctx
            .post(&format!("{}/tasks", project_path), Some(token), json!({ "title": title }))
            .await;
        let id = task["id"].as_str().unwrap().to_string();
        let (status, _) = ctx
            .put(&format!("{}/tasks/{}", board_path, id), token, json!({ "column": "todo" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        task_ids.push(id);
    }

    // Move the last task to the top
    let (status, placed) = ctx
        .put(
            &format!("{}/tasks/{}", board_path, task_ids[2]),
            token,
            json!({ "column": "todo", "position": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(placed["position"], 0);

    let (status, _) = ctx
        .put(
            &format!("{}/tasks/{}", board_path, task_ids[0]),
            token,
            json!({ "column": "blocked" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .delete(&format!("{}/tasks/{}", board_path, task_ids[0]), token)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, detail) = ctx.get(&board_path, token).await;
    assert_eq!(status, StatusCode::OK);
    let placed: Vec<(String, i64)> = detail["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| (t["task_id"].as_str().unwrap().to_string(), t["position"].as_i64().unwrap()))
        .collect();
    assert_eq!(
        placed,
        vec![(task_ids[2].clone(), 0), (task_ids[1].clone(), 1)]
    );

    // Occupied columns cannot be dropped
    let (status, _) = ctx
        .put(&board_path, token, json!({ "columns": ["in_progress", "done"] }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_stock_and_reorder_workflow() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;
    let token = ada.access_token.as_str();

    let (status, supply) = ctx
        .post(
            &tenant_path(&ada, "/supplies"),
            Some(token),
            json!({
                "name": "Microfiber cloths",
                "sku": "MFC-50",
                "unit": "pack",
                "quantity": 8,
                "reorder_level": 5,
                "reorder_quantity": 10,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", supply);
    let supply_id = supply["id"].as_str().unwrap().to_string();
    let supply_path = tenant_path(&ada, &format!("/supplies/{}", supply_id));

    let (status, _) = ctx
        .post(
            &tenant_path(&ada, "/supplies"),
            Some(token),
            json!({ "name": "Duplicate", "sku": "MFC-50" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .post(
            &format!("{}/adjust", supply_path),
            Some(token),
            json!({ "delta": -9, "reason": "weekly use" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, adjusted) = ctx
        .post(
            &format!("{}/adjust", supply_path),
            Some(token),
            json!({ "delta": -6, "reason": "weekly use" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(adjusted["quantity"], 2);

    let (_, low) = ctx.get(&tenant_path(&ada, "/supplies/low-stock"), token).await;
    assert_eq!(low.as_array().unwrap().len(), 1);

    let (status, auto) = ctx
        .post(&tenant_path(&ada, "/reorders/auto"), Some(token), json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let created = auto["created"].as_array().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["quantity_requested"], 10);
    let reorder_path = tenant_path(&ada, &format!("/reorders/{}", created[0]["id"].as_str().unwrap()));

    // An open request already covers the supply
    let (status, auto) = ctx
        .post(&tenant_path(&ada, "/reorders/auto"), Some(token), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(auto["created"].as_array().unwrap().is_empty());

    let (status, _) = ctx
        .post(&format!("{}/receive", reorder_path), Some(token), json!({ "quantity": 4 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .put(&format!("{}/status", reorder_path), token, json!({ "status": "ordered" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for next in ["approved", "ordered"] {
        let (status, request) = ctx
            .put(&format!("{}/status", reorder_path), token, json!({ "status": next }))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", request);
        assert_eq!(request["status"], next);
    }

    let (status, body) = ctx
        .post(&format!("{}/receive", reorder_path), Some(token), json!({ "quantity": 4 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "discrepancy_reason");

    let (status, receipt) = ctx
        .post(
            &format!("{}/receive", reorder_path),
            Some(token),
            json!({ "quantity": 4, "discrepancy_reason": "supplier short-shipped" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", receipt);
    assert_eq!(receipt["request"]["status"], "partial");
    assert_eq!(receipt["supply"]["quantity"], 6);

    let (status, receipt) = ctx
        .post(&format!("{}/receive", reorder_path), Some(token), json!({ "quantity": 6 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", receipt);
    assert_eq!(receipt["request"]["status"], "received");
    assert_eq!(receipt["request"]["quantity_received"], 10);
    assert_eq!(receipt["supply"]["quantity"], 12);

    let (status, _) = ctx
        .put(&format!("{}/status", reorder_path), token, json!({ "status": "canceled" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = ctx.delete(&reorder_path, token).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_health() {
    let Some(ctx) = TestContext::new().await else { return };

    let (status, body) = ctx
        .request(axum::http::Method::GET, "/health", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_team_membership_assignment_and_cascade() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;
    let bo = ctx.register("Bo").await;
    let eli = invite_and_join(&ctx, &ada, "Eli", "member").await;
    let token = ada.access_token.as_str();

    let (status, team) = ctx
        .post(&tenant_path(&ada, "/teams"), Some(token), json!({ "name": "Night crew" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", team);
    let team_id = parse_id(&team["id"]);
    let team_path = tenant_path(&ada, &format!("/teams/{}", team_id));
    let eli_path = format!("{}/members/{}", team_path, eli.user_id);

    let (status, body) = ctx.put(&eli_path, token, json!({ "role": "leed" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    let (_, members) = ctx.get(&format!("{}/members", team_path), token).await;
    assert!(members.as_array().unwrap().is_empty());

    let (status, members) = ctx.put(&eli_path, token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{}", members);
    assert_eq!(members[0]["role"], "member");

    let (status, members) = ctx.put(&eli_path, token, json!({ "role": "lead" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(members.as_array().unwrap().len(), 1);
    assert_eq!(members[0]["role"], "lead");

    // Bo is not in Ada's tenant
    let (status, body) = ctx
        .put(&format!("{}/members/{}", team_path, bo.user_id), token, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "user_id");

    let (_, project) = ctx
        .post(&tenant_path(&ada, "/projects"), Some(token), json!({ "name": "Warehouse" }))
        .await;
    let (_, task) = ctx
        .post(
            &tenant_path(&ada, &format!("/projects/{}/tasks", project["id"].as_str().unwrap())),
            Some(token),
            json!({ "title": "Scrub loading dock" }),
        )
        .await;
    let task_path = format!("{}/tasks/{}", team_path, task["id"].as_str().unwrap());

    for _ in 0..2 {
        let (status, _) = ctx.put(&task_path, token, json!({})).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (_, tasks) = ctx.get(&format!("{}/tasks", team_path), token).await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);
    assert_eq!(tasks[0]["title"], "Scrub loading dock");

    // Deleting needs Manage
    let (status, _) = ctx.delete(&team_path, &eli.access_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx.delete(&team_path, token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM team_members WHERE team_id = $1")
        .bind(team_id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    let assignments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_teams WHERE team_id = $1")
        .bind(team_id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!((members, assignments), (0, 0));

    let (status, _) = ctx.get(&team_path, token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_edit_and_delete_permissions() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;
    let eli = invite_and_join(&ctx, &ada, "Eli", "member").await;

    let (_, project) = ctx
        .post(&tenant_path(&ada, "/projects"), Some(&ada.access_token), json!({ "name": "Clinic" }))
        .await;
    let (_, task) = ctx
        .post(
            &tenant_path(&ada, &format!("/projects/{}/tasks", project["id"].as_str().unwrap())),
            Some(&ada.access_token),
            json!({ "title": "Disinfect waiting room" }),
        )
        .await;
    let comments_path = tenant_path(&ada, &format!("/tasks/{}/comments", task["id"].as_str().unwrap()));

    let mut comment_paths = Vec::new();
    for body in ["Chairs done", "Need more wipes", "Floor still wet"] {
        let (status, comment) = ctx
            .post(&comments_path, Some(&eli.access_token), json!({ "body": body }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", comment);
        comment_paths.push(format!("{}/{}", comments_path, comment["id"].as_str().unwrap()));
    }

    // Only the author edits, even over an owner
    let (status, _) = ctx
        .put(&comment_paths[0], &ada.access_token, json!({ "body": "Rewritten" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, edited) = ctx
        .put(&comment_paths[0], &eli.access_token, json!({ "body": "  Chairs and tables done " }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", edited);
    assert_eq!(edited["body"], "Chairs and tables done");
    assert_eq!(edited["edited"], true);
    let (status, _) = ctx
        .put(&comment_paths[0], &eli.access_token, json!({ "body": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Author deletes their own, an admin or owner deletes anyone's
    let (status, _) = ctx.delete(&comment_paths[0], &eli.access_token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = ctx.delete(&comment_paths[1], &ada.access_token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // A demoted author loses delete rights on their own comment
    let (status, _) = ctx
        .put(
            &tenant_path(&ada, &format!("/users/{}/role", eli.user_id)),
            &ada.access_token,
            json!({ "role": "viewer" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx.delete(&comment_paths[2], &eli.access_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, remaining) = ctx.get(&comments_path, &ada.access_token).await;
    assert_eq!(remaining.as_array().unwrap().len(), 1);
    assert_eq!(remaining[0]["body"], "Floor still wet");
}

#[tokio::test]
async fn test_logout_everywhere_ends_all_sessions() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;

    let (status, laptop) = ctx
        .post("/v1/auth/login", None, json!({ "email": ada.email, "password": PASSWORD }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let laptop_refresh = laptop["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = ctx
        .post(
            "/v1/auth/logout",
            None,
            json!({ "refresh_token": ada.refresh_token, "all": true }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for token in [&ada.refresh_token, &laptop_refresh] {
        let (status, _) = ctx
            .post("/v1/auth/refresh", None, json!({ "refresh_token": token }))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_plain_logout_keeps_other_sessions() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;

    let (_, laptop) = ctx
        .post("/v1/auth/login", None, json!({ "email": ada.email, "password": PASSWORD }))
        .await;

    let (status, _) = ctx
        .post("/v1/auth/logout", None, json!({ "refresh_token": ada.refresh_token }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = ctx
        .post("/v1/auth/refresh", None, json!({ "refresh_token": laptop["refresh_token"] }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_switch_tenant_rescopes_the_session() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;
    let bo = ctx.register("Bo").await;

    let (_, laundry) = ctx
        .post("/v1/tenants", Some(&ada.access_token), json!({ "name": "Ada's Laundry" }))
        .await;
    let laundry_id = parse_id(&laundry["id"]);
    let laundry_projects = format!("/v1/tenants/{}/projects", laundry_id);

    let (status, _) = ctx.get(&laundry_projects, &ada.access_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, session) = ctx
        .post(
            "/v1/auth/switch-tenant",
            Some(&ada.access_token),
            json!({ "tenant_id": laundry_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", session);
    assert_eq!(parse_id(&session["tenant_id"]), laundry_id);
    let switched = session["access_token"].as_str().unwrap();

    let (status, _) = ctx.get(&laundry_projects, switched).await;
    assert_eq!(status, StatusCode::OK);
    let (status, me) = ctx.get("/v1/auth/me", switched).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_id(&me["tenant_id"]), laundry_id);

    let (status, _) = ctx
        .post(
            "/v1/auth/switch-tenant",
            Some(switched),
            json!({ "tenant_id": bo.tenant_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .post("/v1/auth/switch-tenant", None, json!({ "tenant_id": laundry_id }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_reset_revokes_sessions() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;

    // Unknown addresses get the same answer
    let (status, unknown) = ctx
        .post(
            "/v1/auth/forgot-password",
            None,
            json!({ "email": "nobody-here@tenantdesk.test" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, known) = ctx
        .post("/v1/auth/forgot-password", None, json!({ "email": ada.email }))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(unknown, known);
    assert!(ctx
        .mail
        .sent()
        .await
        .iter()
        .all(|email| email.to != "nobody-here@tenantdesk.test"));

    let token = ctx.token_from_link(&ada.email, "/reset-password").await;

    let (status, body) = ctx
        .post(
            "/v1/auth/reset-password",
            None,
            json!({ "token": token, "password": "weakpassword" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "password");

    let new_password = "Sp0tless&Shiny-77";
    let (status, _) = ctx
        .post(
            "/v1/auth/reset-password",
            None,
            json!({ "token": token, "password": new_password }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = ctx
        .post(
            "/v1/auth/reset-password",
            None,
            json!({ "token": token, "password": "An0ther&Password" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .post("/v1/auth/refresh", None, json!({ "refresh_token": ada.refresh_token }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = ctx
        .post("/v1/auth/login", None, json!({ "email": ada.email, "password": PASSWORD }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = ctx
        .post("/v1/auth/login", None, json!({ "email": ada.email, "password": new_password }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_blank_adjustment_reason_is_rejected() {
    let Some(ctx) = TestContext::new().await else { return };
    let ada = ctx.register("Ada").await;
    let token = ada.access_token.as_str();

    let (_, supply) = ctx
        .post(
            &tenant_path(&ada, "/supplies"),
            Some(token),
            json!({ "name": "Trash bags", "sku": "TB-30", "quantity": 20 }),
        )
        .await;
    let adjust_path = tenant_path(&ada, &format!("/supplies/{}/adjust", supply["id"].as_str().unwrap()));

    let (status, body) = ctx
        .post(&adjust_path, Some(token), json!({ "delta": -1, "reason": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "reason");

    let (status, supply) = ctx
        .post(&adjust_path, Some(token), json!({ "delta": -1, "reason": " stocked carts " }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(supply["quantity"], 19);

    let (_, events) = ctx
        .get(&tenant_path(&ada, "/events?entity_type=supply"), token)
        .await;
    let adjusted = events
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["action"] == "stock_adjusted")
        .expect("adjustment event");
    assert_eq!(adjusted["details"]["reason"], "stocked carts");
}

#[tokio::test]
async fn test_responses_are_compressed_on_request() {
    use axum::{body::Body, http::{header, Request}};
    use tower::ServiceExt;

    let Some(ctx) = TestContext::new().await else { return };

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
}

/// Integration tests for tenant resolution and tenant-scoped data access
///
/// Tests:
/// 1. A regular user naming another tenant is rejected with 403
/// 2. Tasks of another tenant are invisible
/// 3. `:own` permission holders learn nothing about missing tasks
/// 4. Platform users must select a tenant
/// 5. Inactive tenants are not resolved, even when the member names their own
use axum::http::{header, Method, StatusCode};
use chrono::Utc;
use serde_json::json;
use tenantgate::{
    auth::models::{Role, Task},
    domain::{TaskId, TenantId, UserId},
};

use crate::support::{empty, json_request, read_json, Session, TestApp};

async fn seed_task(app: &TestApp, tenant_id: TenantId, assigned_to: Option<UserId>) -> TaskId {
    let id = TaskId::new();
    app.store
        .seed_task(Task {
            id,
            tenant_id,
            title: "Follow up".to_string(),
            status: "open".to_string(),
            assigned_to,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await;
    id
}

fn with_tenant_header(session: &Session, uri: &str, tenant: &str) -> axum::http::Request<axum::body::Body> {
    empty(session.request(Method::GET, uri).header("X-Tenant-Id", tenant))
}

#[tokio::test]
async fn naming_another_tenant_is_forbidden() {
    let app = TestApp::new();
    let (acme, _) = app.register("acme", "a@acme.com").await;
    let (_, globex_id) = app.register("globex", "g@globex.com").await;

    for identifier in ["globex".to_string(), globex_id.to_string(), "does-not-exist".to_string()] {
        let response = app.send(with_tenant_header(&acme, "/api/v1/tasks", &identifier)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "identifier {identifier}");
        assert_eq!(read_json(response).await["error"], "tenant_access_denied");
    }

    // Naming the own tenant is fine
    let response = app.send(with_tenant_header(&acme, "/api/v1/tenant", "acme")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["slug"], "acme");

    assert!(app.audit_actions().await.iter().any(|a| a == "tenant.spoof_attempt"));
}

#[tokio::test]
async fn subdomain_names_the_tenant_when_base_domain_is_set() {
    let mut config = crate::support::test_config();
    config.server.base_domain = Some("crm.example.com".to_string());
    let app = TestApp::with_config(config);
    let (acme, _) = app.register("acme", "a@acme.com").await;
    app.register("globex", "g@globex.com").await;

    let own = app
        .send(empty(acme.request(Method::GET, "/api/v1/tenant").header(header::HOST, "acme.crm.example.com")))
        .await;
    assert_eq!(own.status(), StatusCode::OK);

    let other = app
        .send(empty(acme.request(Method::GET, "/api/v1/tenant").header(header::HOST, "globex.crm.example.com")))
        .await;
    assert_eq!(other.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tasks_of_another_tenant_are_not_found() {
    let app = TestApp::new();
    let (acme, _) = app.register("acme", "a@acme.com").await;
    let (globex, globex_id) = app.register("globex", "g@globex.com").await;
    let foreign = seed_task(&app, globex_id, None).await;

    let response = app.send(acme.get(&format!("/api/v1/tasks/{foreign}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let update = app
        .send(json_request(
            acme.request(Method::PATCH, &format!("/api/v1/tasks/{foreign}")),
            json!({ "status": "done" }),
        ))
        .await;
    assert_eq!(update.status(), StatusCode::NOT_FOUND);

    let listed = read_json(app.send(acme.get("/api/v1/tasks")).await).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    // The owning tenant still sees it untouched
    let response = app.send(globex.get(&format!("/api/v1/tasks/{foreign}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "open");
}

#[tokio::test]
async fn own_permission_holders_get_forbidden_for_missing_and_foreign_tasks() {
    let app = TestApp::new();
    let (_, acme_id) = app.register("acme", "a@acme.com").await;
    let member = app.add_user(Some(acme_id), "m@acme.com", Role::Member).await;
    let colleague = app.add_user(Some(acme_id), "c@acme.com", Role::Member).await;
    let session = app.login_session("m@acme.com", Some("acme")).await;

    let mine = seed_task(&app, acme_id, Some(member.id)).await;
    let theirs = seed_task(&app, acme_id, Some(colleague.id)).await;
    let missing = TaskId::new();

    let response = app.send(session.get(&format!("/api/v1/tasks/{mine}"))).await;
    assert_eq!(response.status(), StatusCode::OK);

    for id in [theirs, missing] {
        let response = app.send(session.get(&format!("/api/v1/tasks/{id}"))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(read_json(response).await["error"], "ownership_denied");
    }

    let update = app
        .send(json_request(
            session.request(Method::PATCH, &format!("/api/v1/tasks/{mine}")),
            json!({ "status": "done" }),
        ))
        .await;
    assert_eq!(update.status(), StatusCode::OK);
    assert_eq!(read_json(update).await["status"], "done");

    // Listing is narrowed to own tasks
    let listed = read_json(app.send(session.get("/api/v1/tasks")).await).await;
    let ids: Vec<&str> = listed.as_array().unwrap().iter().filter_map(|t| t["id"].as_str()).collect();
    let expected = mine.to_string();
    assert_eq!(ids, vec![expected.as_str()]);
}

#[tokio::test]
async fn member_cannot_create_tasks_but_owner_can() {
    let app = TestApp::new();
    let (owner, acme_id) = app.register("acme", "a@acme.com").await;
    app.add_user(Some(acme_id), "m@acme.com", Role::Member).await;
    let member = app.login_session("m@acme.com", Some("acme")).await;

    let body = json!({ "title": "Call the customer" });
    let denied =
        app.send(json_request(member.request(Method::POST, "/api/v1/tasks"), body.clone())).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(denied).await["error"], "insufficient_permission");

    let created = app.send(json_request(owner.request(Method::POST, "/api/v1/tasks"), body)).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let task = read_json(created).await;
    assert_eq!(task["tenantId"], acme_id.to_string());
    assert_eq!(task["status"], "open");
}

#[tokio::test]
async fn platform_user_must_select_a_tenant() {
    let app = TestApp::new();
    app.register("acme", "a@acme.com").await;
    app.add_user(None, "root@platform.io", Role::SuperAdmin).await;
    let session = app.login_session("root@platform.io", None).await;
    assert!(session.cookie("tenant_id").is_none());

    let response = app.send(session.get("/api/v1/tenant")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], "tenant_not_resolved");

    let response = app.send(with_tenant_header(&session, "/api/v1/tenant", "acme")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(with_tenant_header(&session, "/api/v1/tenant", "nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inactive_tenant_is_not_resolved() {
    let app = TestApp::new();
    let (session, acme_id) = app.register("acme", "a@acme.com").await;

    let public = app.send(Session::default().get("/public/forms/acme/tenant")).await;
    assert_eq!(public.status(), StatusCode::OK);
    let body = read_json(public).await;
    assert_eq!(body["slug"], "acme");
    assert!(body.get("settings").is_none());

    app.store.set_tenant_active(&acme_id, false).await;

    let public = app.send(Session::default().get("/public/forms/acme/tenant")).await;
    assert_eq!(public.status(), StatusCode::NOT_FOUND);

    let response = app.send(session.get("/api/v1/tenant")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Naming the own deactivated tenant is not a spoofing attempt
    for identifier in ["acme".to_string(), acme_id.to_string()] {
        let response = app.send(with_tenant_header(&session, "/api/v1/tenant", &identifier)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "identifier {identifier}");
        assert_eq!(read_json(response).await["error"], "tenant_not_found");
    }
    assert!(!app.audit_actions().await.iter().any(|a| a == "tenant.spoof_attempt"));

    let login = app.login("a@acme.com", crate::support::PASSWORD, Some("acme")).await;
    assert_eq!(login.status(), StatusCode::UNAUTHORIZED);
}

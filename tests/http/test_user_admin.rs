/// Integration tests for tenant user administration
use axum::http::{Method, StatusCode};
use serde_json::json;
use tenantgate::auth::models::Role;

use crate::support::{json_request, read_json, Session, TestApp, PASSWORD};

fn role_change(session: &Session, id: impl std::fmt::Display, role: &str) -> axum::http::Request<axum::body::Body> {
    json_request(
        session.request(Method::PATCH, &format!("/api/v1/users/{id}/role")),
        json!({ "role": role }),
    )
}

#[tokio::test]
async fn owner_lists_only_own_tenant_users() {
    let app = TestApp::new();
    let (owner, acme_id) = app.register("acme", "a@acme.com").await;
    app.add_user(Some(acme_id), "m@acme.com", Role::Member).await;
    app.register("globex", "g@globex.com").await;

    let response = app.send(owner.get("/api/v1/users")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let mut emails: Vec<&str> =
        body.as_array().unwrap().iter().filter_map(|u| u["email"].as_str()).collect();
    emails.sort_unstable();
    assert_eq!(emails, vec!["a@acme.com", "m@acme.com"]);
    assert!(body[0].get("passwordHash").is_none());
}

#[tokio::test]
async fn member_cannot_list_users() {
    let app = TestApp::new();
    let (_, acme_id) = app.register("acme", "a@acme.com").await;
    app.add_user(Some(acme_id), "m@acme.com", Role::Member).await;
    let member = app.login_session("m@acme.com", Some("acme")).await;

    let response = app.send(member.get("/api/v1/users")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(response).await["error"], "insufficient_permission");
}

#[tokio::test]
async fn role_change_ends_the_target_sessions() {
    let app = TestApp::new();
    let (owner, acme_id) = app.register("acme", "a@acme.com").await;
    let member = app.add_user(Some(acme_id), "m@acme.com", Role::Member).await;
    let member_session = app.login_session("m@acme.com", Some("acme")).await;

    let response = app.send(role_change(&owner, member.id, "admin")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["role"], "admin");

    assert_eq!(app.send(member_session.get("/auth/me")).await.status(), StatusCode::UNAUTHORIZED);

    // After logging in again the new permissions apply
    let fresh = app.login_session("m@acme.com", Some("acme")).await;
    assert_eq!(app.send(fresh.get("/api/v1/users")).await.status(), StatusCode::OK);
    assert!(app.audit_actions().await.iter().any(|a| a == "user.role_changed"));
}

#[tokio::test]
async fn only_owners_grant_owner() {
    let app = TestApp::new();
    let (owner, acme_id) = app.register("acme", "a@acme.com").await;
    app.add_user(Some(acme_id), "admin@acme.com", Role::Admin).await;
    let member = app.add_user(Some(acme_id), "m@acme.com", Role::Member).await;
    let admin = app.login_session("admin@acme.com", Some("acme")).await;

    let response = app.send(role_change(&admin, member.id, "owner")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.send(role_change(&owner, member.id, "super_admin")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.send(role_change(&owner, member.id, "owner")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn users_of_other_tenants_are_not_found() {
    let app = TestApp::new();
    let (owner, _) = app.register("acme", "a@acme.com").await;
    let (_, globex_id) = app.register("globex", "g@globex.com").await;
    let outsider = app.add_user(Some(globex_id), "m@globex.com", Role::Member).await;

    let response = app.send(role_change(&owner, outsider.id, "admin")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response =
        app.send(owner.post(&format!("/api/v1/users/{}/deactivate", outsider.id))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivated_user_loses_sessions_and_login() {
    let app = TestApp::new();
    let (owner, acme_id) = app.register("acme", "a@acme.com").await;
    let member = app.add_user(Some(acme_id), "m@acme.com", Role::Member).await;
    let member_session = app.login_session("m@acme.com", Some("acme")).await;

    let response = app.send(owner.post(&format!("/api/v1/users/{}/deactivate", member.id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["isActive"], false);

    assert_eq!(app.send(member_session.get("/auth/me")).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.send(member_session.post("/auth/refresh")).await.status(),
        StatusCode::UNAUTHORIZED
    );
    let login = app.login("m@acme.com", PASSWORD, Some("acme")).await;
    assert_eq!(login.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(login).await["error"], "invalid_credentials");
}

#[tokio::test]
async fn self_administration_is_rejected() {
    let app = TestApp::new();
    let (owner, _) = app.register("acme", "a@acme.com").await;
    let me = read_json(app.send(owner.get("/auth/me")).await).await;
    let id = me["user"]["id"].as_str().unwrap().to_string();

    let response = app.send(role_change(&owner, &id, "member")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.send(owner.post(&format!("/api/v1/users/{id}/deactivate"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

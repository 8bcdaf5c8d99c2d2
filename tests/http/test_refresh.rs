/// Integration tests for refresh token rotation
///
/// Tests:
/// 1. Refresh rotates the refresh cookie and issues a new access token
/// 2. Presenting a rotated-out token revokes the whole family
/// 3. Expired refresh tokens are rejected without setting cookies
/// 4. The tenant cookie must match the token's tenant
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use tenantgate::domain::UserId;

use crate::support::{read_json, set_cookies, TestApp};

async fn owner_id(app: &TestApp, session: &crate::support::Session) -> UserId {
    let body = read_json(app.send(session.get("/auth/me")).await).await;
    UserId::parse(body["user"]["id"].as_str().expect("user id")).expect("user id parses")
}

#[tokio::test]
async fn refresh_rotates_tokens() {
    let app = TestApp::new();
    let (mut session, _) = app.register("acme", "a@acme.com").await;
    let first_refresh = session.cookie("refresh_token").unwrap().to_string();

    let response = app.send(session.post("/auth/refresh")).await;
    assert_eq!(response.status(), StatusCode::OK);
    session.absorb(&response);

    let second_refresh = session.cookie("refresh_token").unwrap().to_string();
    assert_ne!(first_refresh, second_refresh);
    assert!(first_refresh.starts_with("rt_") && second_refresh.starts_with("rt_"));

    let body = read_json(response).await;
    assert_eq!(body["user"]["email"], "a@acme.com");
    assert_eq!(app.send(session.get("/auth/me")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn reusing_a_rotated_token_revokes_the_family() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;
    let stolen = session.clone();

    let mut legit = session;
    let response = app.send(legit.post("/auth/refresh")).await;
    assert_eq!(response.status(), StatusCode::OK);
    legit.absorb(&response);

    // Attacker replays the old token
    let replay = app.send(stolen.post("/auth/refresh")).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&replay).is_empty());
    assert_eq!(read_json(replay).await["error"], "token_revoked");

    // The legitimate holder's newer token died with the family
    let response = app.send(legit.post("/auth/refresh")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let owner = owner_id(&app, &legit).await;
    assert!(app.store.refresh_tokens_for(&owner).await.iter().all(|t| t.is_revoked));
    assert!(app.audit_actions().await.iter().any(|a| a == "auth.refresh.reuse_detected"));
}

#[tokio::test]
async fn expired_refresh_token_is_rejected_without_new_cookies() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;
    let owner = owner_id(&app, &session).await;

    for token in app.store.refresh_tokens_for(&owner).await {
        app.store.set_refresh_expiry(&token.id, Utc::now() - Duration::minutes(1)).await;
    }

    let response = app.send(session.post("/auth/refresh")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(read_json(response).await["error"], "token_invalid");
}

#[tokio::test]
async fn refresh_requires_matching_tenant_cookie() {
    let app = TestApp::new();
    let (mut session, _) = app.register("acme", "a@acme.com").await;
    let (_, globex_id) = app.register("globex", "g@globex.com").await;

    session.set_cookie("tenant_id", &globex_id.to_string());
    let response = app.send(session.post("/auth/refresh")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_without_cookie_requires_authentication() {
    let app = TestApp::new();
    let response = app.send(crate::support::Session::default().post("/auth/refresh")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["error"], "authentication_required");
}

#[tokio::test]
async fn refresh_cookie_alone_is_not_enough() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;

    let mut stolen = crate::support::Session::default();
    for name in ["refresh_token", "tenant_id"] {
        let value = session.cookie(name).expect("session cookie").to_string();
        stolen.set_cookie(name, &value);
    }

    let response = app.send(stolen.post("/auth/refresh")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(read_json(response).await["error"], "authentication_required");

    // A garbage access token does not identify anyone either
    stolen.set_cookie("access_token", "not.a.jwt");
    let response = app.send(stolen.post("/auth/refresh")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The token was never consumed, so the legitimate session still rotates
    let response = app.send(session.post("/auth/refresh")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// Integration tests for password reset and password change
use std::time::{Duration, Instant};

use axum::http::{Method, Request, StatusCode};
use serde_json::json;

use crate::support::{json_request, read_json, TestApp, PASSWORD};

const NEW_PASSWORD: &str = "N3w!Passw0rd";

fn reset_request(email: &str) -> Request<axum::body::Body> {
    json_request(
        Request::builder().method(Method::POST).uri("/auth/password-reset/request"),
        json!({ "email": email, "tenantSlug": "acme" }),
    )
}

fn confirm_request(token: &str, password: &str) -> Request<axum::body::Body> {
    json_request(
        Request::builder().method(Method::POST).uri("/auth/password-reset/confirm"),
        json!({ "token": token, "newPassword": password }),
    )
}

#[tokio::test]
async fn reset_request_answers_the_same_for_unknown_emails() {
    let app = TestApp::new();
    app.register("acme", "a@acme.com").await;

    let started = Instant::now();
    let known = app.send(reset_request("a@acme.com")).await;
    assert!(started.elapsed() >= Duration::from_millis(50));

    let started = Instant::now();
    let unknown = app.send(reset_request("ghost@acme.com")).await;
    assert!(started.elapsed() >= Duration::from_millis(50));

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(read_json(known).await, read_json(unknown).await);
}

#[tokio::test]
async fn completed_reset_replaces_password_and_ends_sessions() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;

    let response = app.send(reset_request("a@acme.com")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = app.reset_token_for("a@acme.com").await;
    assert!(token.starts_with("pr_"));

    let response = app.send(confirm_request(&token, NEW_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Single use
    let again = app.send(confirm_request(&token, "An0ther!Pass")).await;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    let body = read_json(again).await;
    assert_eq!(body["error"], "validation_failed");
    assert_eq!(body["field"], "token");

    assert_eq!(app.send(session.get("/auth/me")).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.send(session.post("/auth/refresh")).await.status(), StatusCode::UNAUTHORIZED);

    let old = app.login("a@acme.com", PASSWORD, Some("acme")).await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);
    let new = app.login("a@acme.com", NEW_PASSWORD, Some("acme")).await;
    assert_eq!(new.status(), StatusCode::OK);

    let actions = app.audit_actions().await;
    assert!(actions.iter().any(|a| a == "auth.password_reset.completed"));
}

#[tokio::test]
async fn tampered_reset_token_is_rejected() {
    let app = TestApp::new();
    app.register("acme", "a@acme.com").await;
    app.send(reset_request("a@acme.com")).await;
    let token = app.reset_token_for("a@acme.com").await;

    let (id, _) = token.split_once('.').unwrap();
    let forged = format!("{id}.AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
    let response = app.send(confirm_request(&forged, NEW_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.send(confirm_request("not-a-token", NEW_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The genuine token still works
    let response = app.send(confirm_request(&token, NEW_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn weak_new_password_is_rejected_with_field() {
    let app = TestApp::new();
    app.register("acme", "a@acme.com").await;
    app.send(reset_request("a@acme.com")).await;
    let token = app.reset_token_for("a@acme.com").await;

    let response = app.send(confirm_request(&token, "short")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["field"], "new_password");
}

#[tokio::test]
async fn change_password_reissues_session_and_kills_other_devices() {
    let app = TestApp::new();
    let (mut session, _) = app.register("acme", "a@acme.com").await;
    let other_device = app.login_session("a@acme.com", Some("acme")).await;

    let wrong = app
        .send(json_request(
            session.request(Method::POST, "/auth/password/change"),
            json!({ "currentPassword": "Wr0ng!Pass", "newPassword": NEW_PASSWORD }),
        ))
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(wrong).await["error"], "invalid_credentials");

    let response = app
        .send(json_request(
            session.request(Method::POST, "/auth/password/change"),
            json!({ "currentPassword": PASSWORD, "newPassword": NEW_PASSWORD }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    session.absorb(&response);

    assert_eq!(app.send(session.get("/auth/me")).await.status(), StatusCode::OK);
    assert_eq!(app.send(other_device.get("/auth/me")).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.login("a@acme.com", NEW_PASSWORD, Some("acme")).await.status(),
        StatusCode::OK
    );
}

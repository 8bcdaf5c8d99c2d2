/// Integration tests for the double-submit CSRF check
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;

use crate::support::{empty, json_request, read_json, TestApp};

fn cookie_header(session: &crate::support::Session) -> String {
    ["access_token", "refresh_token", "tenant_id", "csrf_token"]
        .iter()
        .filter_map(|name| session.cookie(name).map(|value| format!("{name}={value}")))
        .collect::<Vec<_>>()
        .join("; ")
}

#[tokio::test]
async fn unsafe_request_without_csrf_header_is_forbidden() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;

    let missing = json_request(
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/tasks")
            .header(header::COOKIE, cookie_header(&session)),
        json!({ "title": "Call back" }),
    );
    let response = app.send(missing).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(response).await["error"], "forbidden");

    let mismatched = json_request(
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/tasks")
            .header(header::COOKIE, cookie_header(&session))
            .header("X-CSRF-Token", "not-the-cookie-value"),
        json!({ "title": "Call back" }),
    );
    assert_eq!(app.send(mismatched).await.status(), StatusCode::FORBIDDEN);

    let matching =
        json_request(session.request(Method::POST, "/api/v1/tasks"), json!({ "title": "Call back" }));
    assert_eq!(app.send(matching).await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn safe_methods_skip_the_check() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;

    let request = empty(
        Request::builder()
            .method(Method::GET)
            .uri("/api/v1/tasks")
            .header(header::COOKIE, cookie_header(&session)),
    );
    assert_eq!(app.send(request).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_and_logout_are_exempt() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;

    // `TestApp::login` never sends a CSRF header
    let login = app.login("a@acme.com", crate::support::PASSWORD, Some("acme")).await;
    assert_eq!(login.status(), StatusCode::OK);

    let logout = empty(
        Request::builder()
            .method(Method::POST)
            .uri("/auth/logout")
            .header(header::COOKIE, cookie_header(&session)),
    );
    assert_eq!(app.send(logout).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn account_endpoints_are_protected() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;

    let request = empty(
        Request::builder()
            .method(Method::POST)
            .uri("/auth/sessions/revoke-all")
            .header(header::COOKIE, cookie_header(&session)),
    );
    assert_eq!(app.send(request).await.status(), StatusCode::FORBIDDEN);

    // Nothing was revoked
    assert_eq!(app.send(session.get("/auth/me")).await.status(), StatusCode::OK);
}

/// Integration tests for the session lifecycle
///
/// Tests:
/// 1. Registration and login set the session cookies
/// 2. Repeated failures lock the account behind the generic error
/// 3. Logout is idempotent
/// 4. Revoking all sessions kills outstanding access tokens
/// 5. Bearer tokens follow the environment policy
/// 6. Credential endpoints are rate limited
use axum::http::{header, Method, Request, StatusCode};
use tenantgate::config::Environment;

use crate::support::{empty, read_json, set_cookies, test_config, Session, TestApp, PASSWORD};

#[tokio::test]
async fn register_then_login_sets_cookies_and_owner_role() {
    let app = TestApp::new();
    let (_, _) = app.register("acme", "a@acme.com").await;

    let response = app.login("a@acme.com", PASSWORD, Some("acme")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let names: Vec<String> = set_cookies(&response).into_iter().map(|(name, _)| name).collect();
    for expected in ["access_token", "refresh_token", "tenant_id", "csrf_token"] {
        assert!(names.iter().any(|n| n == expected), "missing {expected} cookie");
    }

    let access_header = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("access_token="))
        .expect("access cookie")
        .to_string();
    assert!(access_header.contains("HttpOnly"));
    assert!(access_header.contains("SameSite=Lax"));

    let body = read_json(response).await;
    assert_eq!(body["user"]["role"], "owner");
    assert_eq!(body["tenant"]["slug"], "acme");
    assert!(body["user"].get("passwordHash").is_none());
    assert!(body["csrfToken"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn sixth_attempt_after_five_failures_is_rejected_even_with_correct_password() {
    let app = TestApp::new();
    app.register("acme", "a@acme.com").await;

    for _ in 0..5 {
        let response = app.login("a@acme.com", "Wr0ng!Pass", Some("acme")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.login("a@acme.com", PASSWORD, Some("acme")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
    let body = read_json(response).await;
    assert_eq!(body["error"], "invalid_credentials");
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn unknown_email_and_wrong_password_look_the_same() {
    let app = TestApp::new();
    app.register("acme", "a@acme.com").await;

    let wrong = read_json(app.login("a@acme.com", "Wr0ng!Pass", Some("acme")).await).await;
    let unknown = read_json(app.login("nobody@acme.com", PASSWORD, Some("acme")).await).await;
    let no_tenant = read_json(app.login("a@acme.com", PASSWORD, Some("globex")).await).await;
    assert_eq!(wrong, unknown);
    assert_eq!(wrong, no_tenant);
}

#[tokio::test]
async fn logout_twice_succeeds_both_times() {
    let app = TestApp::new();
    let (mut session, _) = app.register("acme", "a@acme.com").await;
    let old = session.clone();

    let first = app.send(session.post("/auth/logout")).await;
    assert_eq!(first.status(), StatusCode::OK);
    session.absorb(&first);
    assert!(session.cookie("access_token").is_none());
    assert!(session.cookie("refresh_token").is_none());
    assert_eq!(read_json(first).await["success"], true);

    let second = app.send(session.post("/auth/logout")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(read_json(second).await["success"], true);

    // The refresh token from before logout is dead
    let refresh = app.send(old.post("/auth/refresh")).await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_returns_user_tenant_and_permissions() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;

    let response = app.send(session.get("/auth/me")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["user"]["email"], "a@acme.com");
    assert_eq!(body["tenant"]["slug"], "acme");
    let permissions: Vec<&str> =
        body["permissions"].as_array().unwrap().iter().filter_map(|p| p.as_str()).collect();
    assert!(permissions.contains(&"users:manage"));
    assert!(permissions.contains(&"tenant:manage"));

    let anonymous = app.send(Session::default().get("/auth/me")).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoke_all_invalidates_outstanding_access_tokens() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;
    let other_device = app.login_session("a@acme.com", Some("acme")).await;

    let response = app.send(session.post("/auth/sessions/revoke-all")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["tokenVersion"], 1);

    for stale in [&session, &other_device] {
        let me = app.send(stale.get("/auth/me")).await;
        assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
        let refresh = app.send(stale.post("/auth/refresh")).await;
        assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
    }

    // A fresh login works again
    let fresh = app.login_session("a@acme.com", Some("acme")).await;
    assert_eq!(app.send(fresh.get("/auth/me")).await.status(), StatusCode::OK);
}

fn bearer_request(token: &str) -> Request<axum::body::Body> {
    empty(
        Request::builder()
            .method(Method::GET)
            .uri("/auth/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}")),
    )
}

#[tokio::test]
async fn bearer_tokens_accepted_outside_production() {
    let app = TestApp::new();
    let (session, _) = app.register("acme", "a@acme.com").await;

    let response = app.send(bearer_request(session.access_token())).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn bearer_tokens_rejected_in_production_unless_enabled() {
    let mut config = test_config();
    config.environment = Environment::Production;
    let app = TestApp::with_config(config);
    let (session, _) = app.register("acme", "a@acme.com").await;

    let response = app.send(bearer_request(session.access_token())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Cookies still work
    assert_eq!(app.send(session.get("/auth/me")).await.status(), StatusCode::OK);

    let mut config = test_config();
    config.environment = Environment::Production;
    config.auth.allow_bearer_tokens = true;
    let app = TestApp::with_config(config);
    let (session, _) = app.register("acme", "a@acme.com").await;
    let response = app.send(bearer_request(session.access_token())).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_is_rate_limited_per_client() {
    let mut config = test_config();
    config.server.auth_rate_limit_per_minute = 3;
    let app = TestApp::with_config(config);

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let response = app.login("a@acme.com", PASSWORD, Some("acme")).await;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            assert!(response.headers().contains_key(header::RETRY_AFTER));
        }
        statuses.push(response.status());
    }
    assert_eq!(&statuses[..3], &[StatusCode::UNAUTHORIZED; 3]);
    assert_eq!(statuses[3], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let response = app.send(Session::default().get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "ok");
}

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, request::Builder, Method, Request, Response},
    Router,
};
use axum_extra::extract::cookie::Cookie;
use serde_json::{json, Value};
use tenantgate::{
    api::{build_router, AppState},
    auth::{hashing::HashCost, models::{NewUser, Role, User}, PasswordHasher},
    config::{AppConfig, Environment},
    domain::{TenantId, UserId},
    services::MemoryEmailSender,
    storage::{MemoryStore, Repositories, UserRepository},
};
use tower::ServiceExt;

pub const PASSWORD: &str = "Str0ng!Pass";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig { environment: Environment::Test, ..AppConfig::default() };
    let light = HashCost::light();
    config.auth.password_hash_memory_kib = light.memory_kib;
    config.auth.password_hash_iterations = light.iterations;
    config.auth.password_reset_min_response_ms = 50;
    config.auth.password_reset_jitter_ms = 10;
    config.server.auth_rate_limit_per_minute = 1000;
    config
}

pub struct TestApp {
    router: Router,
    pub store: Arc<MemoryStore>,
    pub email: Arc<MemoryEmailSender>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let email = Arc::new(MemoryEmailSender::new());
        let repos = Repositories::in_memory(store.clone());
        let state = AppState::build(config, repos, email.clone()).expect("build app state");
        Self { router: build_router(state), store, email }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("request")
    }

    /// Register a tenant whose owner is `email` with [`PASSWORD`].
    pub async fn register(&self, slug: &str, email: &str) -> (Session, TenantId) {
        let response = self
            .send(json_request(
                Request::builder().method(Method::POST).uri("/auth/register"),
                json!({
                    "companyName": format!("{slug} Inc"),
                    "tenantSlug": slug,
                    "name": "Owner",
                    "email": email,
                    "password": PASSWORD,
                }),
            ))
            .await;
        assert_eq!(response.status(), 201, "register {slug}");
        let session = Session::from_response(&response);
        let body = read_json(response).await;
        let tenant_id = TenantId::parse(body["tenant"]["id"].as_str().expect("tenant id"))
            .expect("tenant id parses");
        (session, tenant_id)
    }

    pub async fn login(&self, email: &str, password: &str, slug: Option<&str>) -> Response<Body> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(slug) = slug {
            body["tenantSlug"] = json!(slug);
        }
        self.send(json_request(Request::builder().method(Method::POST).uri("/auth/login"), body))
            .await
    }

    pub async fn login_session(&self, email: &str, slug: Option<&str>) -> Session {
        let response = self.login(email, PASSWORD, slug).await;
        assert_eq!(response.status(), 200, "login {email}");
        Session::from_response(&response)
    }

    /// Insert a user directly. Its password is [`PASSWORD`].
    pub async fn add_user(&self, tenant_id: Option<TenantId>, email: &str, role: Role) -> User {
        let hasher = PasswordHasher::new(HashCost::light()).expect("hasher");
        self.store
            .create_user(NewUser {
                id: UserId::new(),
                tenant_id,
                email: email.to_string(),
                name: email.to_string(),
                password_hash: hasher.hash(PASSWORD).expect("hash"),
                role,
            })
            .await
            .expect("create user")
    }

    /// Audit actions recorded so far. Audit writes are spawned, so give them a moment.
    pub async fn audit_actions(&self) -> Vec<String> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.store.audit_events().await.into_iter().map(|e| e.action).collect()
    }

    /// The reset link is mailed from a background task.
    pub async fn reset_token_for(&self, email: &str) -> String {
        for _ in 0..50 {
            if let Some(url) = self.email.last_reset_url(email).await {
                let (_, token) = url.split_once("token=").expect("token in reset url");
                return token.to_string();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no reset email sent to {email}");
    }
}

/// Cookie jar of a simulated browser.
#[derive(Debug, Clone, Default)]
pub struct Session {
    cookies: BTreeMap<String, String>,
}

impl Session {
    pub fn from_response(response: &Response<Body>) -> Self {
        let mut session = Self::default();
        session.absorb(response);
        session
    }

    /// Apply `Set-Cookie` headers; removal cookies delete the entry.
    pub fn absorb(&mut self, response: &Response<Body>) {
        for (name, value) in set_cookies(response) {
            if value.is_empty() {
                self.cookies.remove(&name);
            } else {
                self.cookies.insert(name, value);
            }
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn access_token(&self) -> &str {
        self.cookie("access_token").expect("access cookie")
    }

    /// Request carrying the cookies and the matching CSRF header.
    pub fn request(&self, method: Method, uri: &str) -> Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if !self.cookies.is_empty() {
            let header_value = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, header_value);
        }
        if let Some(csrf) = self.cookie("csrf_token") {
            builder = builder.header("X-CSRF-Token", csrf);
        }
        builder
    }

    pub fn get(&self, uri: &str) -> Request<Body> {
        empty(self.request(Method::GET, uri))
    }

    pub fn post(&self, uri: &str) -> Request<Body> {
        empty(self.request(Method::POST, uri))
    }
}

pub fn set_cookies(response: &Response<Body>) -> Vec<(String, String)> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value.to_string()).ok())
        .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
        .collect()
}

pub fn json_request(builder: Builder, body: Value) -> Request<Body> {
    builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
        .expect("build request")
}

pub fn empty(builder: Builder) -> Request<Body> {
    builder.body(Body::empty()).expect("build request")
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::auth::{
    hashing::PasswordHasher,
    jwt::AccessTokenIssuer,
    lockout::LockoutGuard,
    login_service::LoginService,
    middleware::{authenticate, authenticate_tenant, csrf_protect, AuthPipeline},
    password_reset::{PasswordResetService, ResetPolicy},
    refresh::RefreshTokenService,
    session::{CookiePolicy, SessionAuthenticator},
    tenant_guard::TenantResolver,
};
use crate::config::AppConfig;
use crate::errors::Result;
use crate::services::{audit::AuditLogger, email::EmailSender};
use crate::storage::Repositories;

use super::{
    docs, error,
    handlers::{
        auth::{
            change_password_handler, login_handler, logout_handler, me_handler,
            password_reset_confirm_handler, password_reset_request_handler, refresh_handler,
            register_handler, revoke_all_sessions_handler,
        },
        health::health_handler,
        public::public_form_tenant_handler,
        tasks::{create_task_handler, get_task_handler, list_tasks_handler, update_task_handler},
        tenant::get_tenant_handler,
        users::{deactivate_user_handler, list_users_handler, update_user_role_handler},
    },
    rate_limit::{limit_by_client, RateLimiter},
};

/// Everything the handlers share.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repos: Repositories,
    pub pipeline: AuthPipeline,
    pub login: Arc<LoginService>,
    pub password_reset: Arc<PasswordResetService>,
    pub audit: AuditLogger,
    pub cookies: CookiePolicy,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Wire services from configuration over the given repositories.
    pub fn build(
        config: AppConfig,
        repos: Repositories,
        email: Arc<dyn EmailSender>,
    ) -> Result<Self> {
        let auth = &config.auth;
        let production = config.environment.is_production();

        let hasher = PasswordHasher::new(auth.hash_cost())?;
        let issuer = Arc::new(AccessTokenIssuer::new(
            auth.jwt_secret.as_bytes(),
            auth.jwt_issuer.clone(),
            auth.access_token_ttl(),
        ));
        let audit = AuditLogger::new(repos.audit.clone());
        let refresh = RefreshTokenService::new(
            repos.refresh_tokens.clone(),
            auth.refresh_token_ttl(),
            auth.rotate_refresh_tokens,
        );
        let lockout = LockoutGuard::new(repos.login_attempts.clone(), config.lockout.clone());

        let allow_bearer = auth.allow_bearer_tokens || !production;
        if allow_bearer && production {
            warn!("Bearer tokens are accepted in production");
        }
        let pipeline = AuthPipeline {
            authenticator: Arc::new(SessionAuthenticator::new(
                issuer.clone(),
                repos.users.clone(),
                repos.permissions.clone(),
                allow_bearer,
            )),
            tenants: Arc::new(TenantResolver::new(
                repos.tenants.clone(),
                config.server.base_domain.clone(),
                audit.clone(),
            )),
        };

        let login = LoginService::new(
            repos.clone(),
            hasher.clone(),
            issuer,
            refresh.clone(),
            lockout.clone(),
            audit.clone(),
            email.clone(),
        )?;
        let password_reset = PasswordResetService::new(
            repos.clone(),
            hasher,
            refresh,
            lockout,
            audit.clone(),
            email,
            ResetPolicy::from_config(auth, &config.server.public_url),
        );

        let cookies = CookiePolicy {
            secure: production,
            access_ttl: auth.access_token_ttl(),
            refresh_ttl: auth.refresh_token_ttl(),
            csrf_ttl: auth.csrf_token_ttl(),
        };
        let rate_limiter = RateLimiter::per_minute(config.server.auth_rate_limit_per_minute);

        Ok(Self {
            config: Arc::new(config),
            repos,
            pipeline,
            login: Arc::new(login),
            password_reset: Arc::new(password_reset),
            audit,
            cookies,
            rate_limiter,
        })
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static("x-csrf-token"),
                HeaderName::from_static("x-tenant-id"),
            ]),
    )
}

pub fn build_router(state: AppState) -> Router {
    let rate_limited = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/password-reset/request", post(password_reset_request_handler))
        .route_layer(middleware::from_fn_with_state(state.rate_limiter.clone(), limit_by_client));

    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/password-reset/confirm", post(password_reset_confirm_handler))
        .route("/public/forms/{slug}/tenant", get(public_form_tenant_handler))
        .merge(rate_limited);

    let account = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/auth/password/change", post(change_password_handler))
        .route("/auth/sessions/revoke-all", post(revoke_all_sessions_handler))
        .route_layer(middleware::from_fn_with_state(state.pipeline.clone(), authenticate));

    let tenant_scoped = Router::new()
        .route("/api/v1/tenant", get(get_tenant_handler))
        .route("/api/v1/users", get(list_users_handler))
        .route("/api/v1/users/{id}/role", patch(update_user_role_handler))
        .route("/api/v1/users/{id}/deactivate", post(deactivate_user_handler))
        .route("/api/v1/tasks", get(list_tasks_handler).post(create_task_handler))
        .route("/api/v1/tasks/{id}", get(get_task_handler).patch(update_task_handler))
        .route_layer(middleware::from_fn_with_state(state.pipeline.clone(), authenticate_tenant));

    let cors = cors_layer(&state.config.server.cors_origins);
    let expose_internal = !state.config.environment.is_production();

    let mut router = Router::new()
        .merge(public)
        .merge(account)
        .merge(tenant_scoped)
        .with_state(state)
        .merge(docs::docs_router())
        .layer(middleware::from_fn(csrf_protect));
    if expose_internal {
        router = router.layer(middleware::from_fn(error::expose_internal_errors));
    }
    let router = router.layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

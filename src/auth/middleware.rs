//! Axum middleware for the session pipeline and CSRF protection.
//!
//! Stages run in a fixed order and stop at the first failure:
//! token extraction and verification, live user and token-version check,
//! tenant resolution. Permission checks run in the handlers, after the
//! pipeline has produced an immutable [`RequestContext`].

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{field, warn, Instrument};

use crate::api::error::ApiError;
use crate::api::extractors::client_info;
use crate::auth::models::{AuthContext, RequestContext};
use crate::auth::session::{csrf_tokens_match, SessionAuthenticator, CSRF_COOKIE, CSRF_HEADER_NAME};
use crate::auth::tenant_guard::TenantResolver;

/// Paths that accept unsafe methods without a CSRF token.
const CSRF_EXEMPT_PATHS: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/refresh",
    "/auth/logout",
    "/auth/password-reset/request",
    "/auth/password-reset/confirm",
    "/health",
];

/// Path prefixes exempt from CSRF checks (public form fetch and submission).
const CSRF_EXEMPT_PREFIXES: &[&str] = &["/public/forms/"];

/// Collaborators shared by the pipeline middleware.
#[derive(Clone)]
pub struct AuthPipeline {
    pub authenticator: Arc<SessionAuthenticator>,
    pub tenants: Arc<TenantResolver>,
}

impl std::fmt::Debug for AuthPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPipeline").finish_non_exhaustive()
    }
}

fn pipeline_span(request: &Request<Body>, stage: &'static str) -> tracing::Span {
    crate::request_span!(request.method(), request.uri().path(), stage = stage)
}

async fn authenticate_parts(
    pipeline: &AuthPipeline,
    headers: &HeaderMap,
) -> Result<AuthContext, ApiError> {
    let jar = CookieJar::from_headers(headers);
    match pipeline.authenticator.authenticate_request(headers, &jar).await {
        Ok(context) => {
            tracing::Span::current().record("user_id", field::display(&context.user_id()));
            Ok(context)
        }
        Err(err) => {
            warn!(error = %err, "authentication failed");
            Err(err.into())
        }
    }
}

/// Authenticate the caller without resolving a tenant. Used by account
/// endpoints that also serve platform users.
pub async fn authenticate(
    State(pipeline): State<AuthPipeline>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let span = pipeline_span(&request, "authenticate");
    async move {
        let context = authenticate_parts(&pipeline, request.headers()).await?;
        request.extensions_mut().insert(context);
        Ok::<_, ApiError>(next.run(request).await)
    }
    .instrument(span)
    .await
}

/// Authenticate the caller, then resolve and validate the request tenant.
pub async fn authenticate_tenant(
    State(pipeline): State<AuthPipeline>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let span = pipeline_span(&request, "authenticate_tenant");
    async move {
        let auth = authenticate_parts(&pipeline, request.headers()).await?;

        let identifier = pipeline.tenants.identifier_from_headers(request.headers());
        let client = client_info(request.headers(), request.extensions());
        let tenant =
            pipeline.tenants.resolve_for_user(&auth, identifier.as_deref(), &client).await?;
        tracing::Span::current().record("tenant_id", field::display(&tenant.id));

        request.extensions_mut().insert(auth.clone());
        request.extensions_mut().insert(RequestContext { auth, tenant });
        Ok::<_, ApiError>(next.run(request).await)
    }
    .instrument(span)
    .await
}

pub fn is_csrf_exempt(path: &str) -> bool {
    CSRF_EXEMPT_PATHS.contains(&path)
        || CSRF_EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Double-submit CSRF check for unsafe methods.
pub async fn csrf_protect(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let method = request.method();
    if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
        || is_csrf_exempt(request.uri().path())
    {
        return Ok(next.run(request).await);
    }

    let jar = CookieJar::from_headers(request.headers());
    let cookie = jar.get(CSRF_COOKIE).map(|c| c.value());
    let header = request.headers().get(CSRF_HEADER_NAME).and_then(|v| v.to_str().ok());

    if !csrf_tokens_match(cookie, header) {
        warn!(
            http.method = %method,
            http.path = %request.uri().path(),
            has_cookie = cookie.is_some(),
            has_header = header.is_some(),
            "CSRF token check failed"
        );
        return Err(ApiError::forbidden("Invalid CSRF token"));
    }

    Ok(next.run(request).await)
}

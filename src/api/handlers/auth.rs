//! Session endpoints: registration, login, refresh, logout, password flows
//! and the current-user view.
//!
//! Successful flows set the access, refresh, tenant and CSRF cookies through
//! [`CookiePolicy`](crate::auth::session::CookiePolicy). Token values never
//! appear in response bodies; the CSRF token is returned so single-page
//! clients can echo it without reading cookies.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::api::error::ApiError;
use crate::api::extractors::Client;
use crate::api::routes::AppState;
use crate::auth::{
    login_service::{RefreshInput, SessionTokens},
    models::{AuthContext, Tenant, UserProfile},
    session::{generate_csrf_token, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, TENANT_ID_COOKIE},
    validation::{
        ChangePasswordRequest, LoginRequest, PasswordResetConfirmRequest, PasswordResetRequest,
        RegisterRequest,
    },
};

/// Returned by every flow that starts or renews a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: UserProfile,
    pub tenant: Option<Tenant>,
    #[schema(value_type = String, format = DateTime)]
    pub access_token_expires_at: DateTime<Utc>,
    /// Echo this value in the `X-CSRF-Token` header on unsafe requests.
    pub csrf_token: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    pub user: UserProfile,
    pub tenant: Option<Tenant>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionsRevokedResponse {
    pub success: bool,
    pub token_version: i32,
}

const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent";

fn cookie_value<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    jar.get(name).map(|cookie| cookie.value()).filter(|value| !value.is_empty())
}

/// Add the session cookies for `tokens` plus a fresh CSRF token.
fn with_session_cookies(
    state: &AppState,
    jar: CookieJar,
    tokens: SessionTokens,
) -> (CookieJar, SessionResponse) {
    let policy = &state.cookies;
    let csrf_token = generate_csrf_token();

    let mut jar = jar.add(policy.access_cookie(&tokens.access.token));
    if let Some(refresh) = &tokens.refresh {
        jar = jar.add(policy.refresh_cookie(&refresh.raw));
    }
    if let Some(tenant) = &tokens.tenant {
        jar = jar.add(policy.tenant_cookie(&tenant.id.to_string()));
    }
    jar = jar.add(policy.csrf_cookie(&csrf_token));

    let body = SessionResponse {
        user: tokens.user.profile(),
        tenant: tokens.tenant,
        access_token_expires_at: tokens.access.expires_at,
        csrf_token,
    };
    (jar, body)
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Tenant and owner created, session started", body = SessionResponse),
        (status = 400, description = "Validation error", body = crate::api::error::ErrorBody),
        (status = 409, description = "Tenant slug or email already taken", body = crate::api::error::ErrorBody),
        (status = 429, description = "Too many requests", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register_handler(
    State(state): State<AppState>,
    Client(client): Client,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>), ApiError> {
    let tokens = state.login.register(payload, &client).await?;
    let (jar, body) = with_session_cookies(&state, jar, tokens);
    Ok((StatusCode::CREATED, jar, Json(body)))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started", body = SessionResponse),
        (status = 401, description = "Invalid email or password", body = crate::api::error::ErrorBody),
        (status = 429, description = "Too many requests", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(state): State<AppState>,
    Client(client): Client,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let tokens = state.login.login(payload, &client).await?;
    let (jar, body) = with_session_cookies(&state, jar, tokens);
    Ok((jar, Json(body)))
}

/// Exchange the refresh cookie for a new access token.
///
/// The caller is identified by the access token, which may have expired but
/// must carry a valid signature; its user must own the refresh token.
/// Nothing is set on failure.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Session renewed", body = SessionResponse),
        (status = 401, description = "Refresh token missing, invalid, expired or revoked", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh_handler(
    State(state): State<AppState>,
    Client(client): Client,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let authenticated = state.pipeline.authenticator.authenticate_request(&headers, &jar).await.ok();

    let input = RefreshInput {
        refresh_token: cookie_value(&jar, REFRESH_TOKEN_COOKIE),
        tenant_cookie: cookie_value(&jar, TENANT_ID_COOKIE),
        access_token: cookie_value(&jar, ACCESS_TOKEN_COOKIE),
    };
    let tokens = state.login.refresh(input, authenticated.as_ref(), &client).await?;

    let (jar, body) = with_session_cookies(&state, jar, tokens);
    Ok((jar, Json(body)))
}

/// Revoke the refresh tokens for the current tenant and clear every auth
/// cookie. Succeeds whether or not the caller is signed in.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Signed out", body = SuccessResponse)
    ),
    tag = "auth"
)]
pub async fn logout_handler(
    State(state): State<AppState>,
    Client(client): Client,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Json<SuccessResponse>) {
    let authenticated = state.pipeline.authenticator.authenticate_request(&headers, &jar).await.ok();
    if authenticated.is_none() {
        debug!("logout without a valid access token");
    }

    state
        .login
        .logout(
            authenticated.as_ref(),
            cookie_value(&jar, REFRESH_TOKEN_COOKIE),
            cookie_value(&jar, TENANT_ID_COOKIE),
            &client,
        )
        .await;

    (state.cookies.clear_all(jar), Json(SuccessResponse { success: true }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = CurrentUserResponse),
        (status = 401, description = "Not authenticated", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "auth"
)]
pub async fn me_handler(
    State(state): State<AppState>,
    context: AuthContext,
) -> Result<Json<CurrentUserResponse>, ApiError> {
    let tenant = match context.user.tenant_id {
        Some(tenant_id) => state.repos.tenants.find_by_id(&tenant_id).await?,
        None => None,
    };

    Ok(Json(CurrentUserResponse {
        permissions: context.permissions.to_sorted_vec(),
        user: context.user,
        tenant,
    }))
}

/// Change the caller's password. Every other session is ended; this one
/// continues with freshly issued cookies.
#[utoipa::path(
    post,
    path = "/auth/password/change",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = SessionResponse),
        (status = 400, description = "Validation error", body = crate::api::error::ErrorBody),
        (status = 401, description = "Current password is wrong", body = crate::api::error::ErrorBody),
        (status = 403, description = "Invalid CSRF token", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "auth"
)]
pub async fn change_password_handler(
    State(state): State<AppState>,
    Client(client): Client,
    context: AuthContext,
    jar: CookieJar,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let tenant = match context.user.tenant_id {
        Some(tenant_id) => state.repos.tenants.find_by_id(&tenant_id).await?,
        None => None,
    };
    let tokens = state.login.change_password(&context, tenant, payload, &client).await?;

    let (jar, body) = with_session_cookies(&state, jar, tokens);
    Ok((jar, Json(body)))
}

#[utoipa::path(
    post,
    path = "/auth/sessions/revoke-all",
    responses(
        (status = 200, description = "Every session of the caller revoked", body = SessionsRevokedResponse),
        (status = 401, description = "Not authenticated", body = crate::api::error::ErrorBody),
        (status = 403, description = "Invalid CSRF token", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "auth"
)]
pub async fn revoke_all_sessions_handler(
    State(state): State<AppState>,
    Client(client): Client,
    context: AuthContext,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionsRevokedResponse>), ApiError> {
    let version = state
        .login
        .revoke_all_for_user(&context.user_id(), context.user.tenant_id, &client)
        .await?;

    Ok((
        state.cookies.clear_all(jar),
        Json(SessionsRevokedResponse { success: true, token_version: version }),
    ))
}

/// Always answers with the same message after the same minimum delay.
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = MessageResponse),
        (status = 400, description = "Validation error", body = crate::api::error::ErrorBody),
        (status = 429, description = "Too many requests", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn password_reset_request_handler(
    State(state): State<AppState>,
    Client(client): Client,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.password_reset.request(payload, &client).await?;
    Ok(Json(MessageResponse { message: RESET_REQUESTED_MESSAGE.to_string() }))
}

#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired reset token", body = crate::api::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn password_reset_confirm_handler(
    State(state): State<AppState>,
    Client(client): Client,
    jar: CookieJar,
    Json(payload): Json<PasswordResetConfirmRequest>,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    state.password_reset.confirm(payload, &client).await?;
    Ok((
        state.cookies.clear_all(jar),
        Json(MessageResponse { message: "Password has been reset".to_string() }),
    ))
}

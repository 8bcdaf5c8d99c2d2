//! Session authentication, auth cookies and CSRF protection.
//!
//! [`SessionAuthenticator`] turns an access token into an [`AuthContext`]:
//! verify the signature and expiry, load the live user, compare token
//! versions, then load the role's permissions. Any failing step ends the
//! pipeline with a 401 and no partial identity.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;
use tracing::{debug, instrument, warn};

use crate::auth::hashing::{constant_time_eq, generate_secret};
use crate::auth::jwt::{AccessClaims, AccessTokenIssuer};
use crate::auth::models::{AuthContext, User};
use crate::auth::permissions::PermissionSet;
use crate::errors::{AuthErrorType, Error, Result};
use crate::storage::repository::{PermissionRepository, UserRepository};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const TENANT_ID_COOKIE: &str = "tenant_id";
pub const CSRF_COOKIE: &str = "csrf_token";

pub const CSRF_HEADER_NAME: &str = "X-CSRF-Token";
pub const TENANT_HEADER_NAME: &str = "X-Tenant-Id";

/// CSRF token byte length (32 bytes = 256 bits of entropy)
const CSRF_TOKEN_BYTES: usize = 32;

/// Random token for the double-submit CSRF check.
pub fn generate_csrf_token() -> String {
    generate_secret(CSRF_TOKEN_BYTES)
}

/// Timing-safe comparison of the CSRF cookie and header.
pub fn csrf_tokens_match(cookie: Option<&str>, header: Option<&str>) -> bool {
    match (cookie, header) {
        (Some(cookie), Some(header)) if !cookie.is_empty() => {
            constant_time_eq(cookie.as_bytes(), header.as_bytes())
        }
        _ => false,
    }
}

/// Builds the auth cookies with consistent attributes.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub secure: bool,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub csrf_ttl: Duration,
}

impl CookiePolicy {
    fn build(
        &self,
        name: &'static str,
        value: String,
        http_only: bool,
        ttl: Duration,
    ) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(http_only)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(ttl.num_seconds()))
            .build()
    }

    pub fn access_cookie(&self, token: &str) -> Cookie<'static> {
        self.build(ACCESS_TOKEN_COOKIE, token.to_string(), true, self.access_ttl)
    }

    pub fn refresh_cookie(&self, token: &str) -> Cookie<'static> {
        self.build(REFRESH_TOKEN_COOKIE, token.to_string(), true, self.refresh_ttl)
    }

    /// Readable by scripts so the client can send `X-Tenant-Id`.
    pub fn tenant_cookie(&self, tenant_id: &str) -> Cookie<'static> {
        self.build(TENANT_ID_COOKIE, tenant_id.to_string(), false, self.refresh_ttl)
    }

    /// Readable by scripts so the client can echo it in `X-CSRF-Token`.
    pub fn csrf_cookie(&self, token: &str) -> Cookie<'static> {
        self.build(CSRF_COOKIE, token.to_string(), false, self.csrf_ttl)
    }

    /// Add removal cookies for every auth cookie.
    pub fn clear_all(&self, jar: CookieJar) -> CookieJar {
        [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, TENANT_ID_COOKIE, CSRF_COOKIE]
            .into_iter()
            .fold(jar, |jar, name| {
                jar.add(
                    Cookie::build((name, ""))
                        .path("/")
                        .secure(self.secure)
                        .same_site(SameSite::Lax)
                        .removal()
                        .build(),
                )
            })
    }
}

/// Where an access token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    BearerHeader,
    Cookie,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Clone)]
pub struct SessionAuthenticator {
    issuer: Arc<AccessTokenIssuer>,
    users: Arc<dyn UserRepository>,
    permissions: Arc<dyn PermissionRepository>,
    allow_bearer: bool,
}

impl std::fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuthenticator").field("allow_bearer", &self.allow_bearer).finish()
    }
}

impl SessionAuthenticator {
    /// `allow_bearer` should be true outside production or when explicitly opted in.
    pub fn new(
        issuer: Arc<AccessTokenIssuer>,
        users: Arc<dyn UserRepository>,
        permissions: Arc<dyn PermissionRepository>,
        allow_bearer: bool,
    ) -> Self {
        Self { issuer, users, permissions, allow_bearer }
    }

    pub fn issuer(&self) -> &AccessTokenIssuer {
        &self.issuer
    }

    /// Pick the access token for this request.
    ///
    /// A bearer header is used only when allowed; otherwise the cookie is
    /// used. A request carrying only a disallowed bearer header is rejected.
    pub fn extract_token(
        &self,
        headers: &HeaderMap,
        jar: &CookieJar,
    ) -> Result<(String, TokenSource)> {
        let bearer = bearer_token(headers);

        if self.allow_bearer {
            if let Some(token) = bearer {
                return Ok((token.to_string(), TokenSource::BearerHeader));
            }
        }

        if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE).filter(|c| !c.value().is_empty()) {
            return Ok((cookie.value().to_string(), TokenSource::Cookie));
        }

        if bearer.is_some() {
            warn!("bearer token presented where only cookie sessions are accepted");
            return Err(Error::auth(
                "Bearer tokens are not accepted in this environment",
                AuthErrorType::AuthenticationRequired,
            ));
        }

        Err(Error::authentication_required())
    }

    /// Run the verification pipeline for a raw access token.
    #[instrument(skip(self, token), fields(user_id = tracing::field::Empty), name = "session_authenticate")]
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext> {
        let claims = self.issuer.verify(token).inspect_err(|err| {
            debug!(error = %err, kind = ?err.auth_error_type(), "access token rejected");
        })?;
        tracing::Span::current().record("user_id", tracing::field::display(&claims.sub));

        let user = self.load_live_user(&claims).await?;
        let permissions = self.permissions.permissions_for_role(user.role).await?;

        Ok(AuthContext {
            user: user.profile(),
            permissions: Arc::new(PermissionSet::new(permissions)),
            token_id: claims.jti,
        })
    }

    /// Authenticate from headers and cookies in one step.
    pub async fn authenticate_request(
        &self,
        headers: &HeaderMap,
        jar: &CookieJar,
    ) -> Result<AuthContext> {
        let (token, _) = self.extract_token(headers, jar)?;
        self.authenticate(&token).await
    }

    async fn load_live_user(&self, claims: &AccessClaims) -> Result<User> {
        let user = match self.users.find_by_id(&claims.sub).await? {
            Some(user) if user.is_active => user,
            Some(_) => {
                warn!(user_id = %claims.sub, "token presented for deactivated user");
                return Err(Error::auth("User account is not active", AuthErrorType::TokenRevoked));
            }
            None => {
                warn!(user_id = %claims.sub, "token presented for unknown user");
                return Err(Error::auth("Access token is invalid", AuthErrorType::TokenInvalid));
            }
        };

        if user.token_version != claims.tv {
            warn!(
                user_id = %user.id,
                token_version = claims.tv,
                current_version = user.token_version,
                "stale token version"
            );
            return Err(Error::auth("Token has been revoked", AuthErrorType::TokenRevoked));
        }

        if user.tenant_id != claims.tid {
            warn!(user_id = %user.id, "token tenant does not match user tenant");
            return Err(Error::auth("Access token is invalid", AuthErrorType::TokenInvalid));
        }

        Ok(user)
    }
}

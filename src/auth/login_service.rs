//! Registration, login, refresh, logout and credential changes.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::hashing::PasswordHasher;
use crate::auth::jwt::{AccessTokenIssuer, IssuedAccessToken};
use crate::auth::lockout::LockoutGuard;
use crate::auth::models::{AuthContext, NewTenant, NewUser, Role, Tenant, TenantSettings, User};
use crate::auth::refresh::{IssuedRefreshToken, RefreshTokenService};
use crate::auth::validation::{
    normalize_email, normalize_slug, ChangePasswordRequest, LoginRequest, RegisterRequest,
};
use crate::domain::{TenantId, UserId};
use crate::errors::{AuthErrorType, Error, Result, TenantErrorType};
use crate::services::audit::{actions, AuditEvent, AuditLogger, ClientInfo};
use crate::services::email::{spawn_email, EmailSender};
use crate::storage::Repositories;

/// Plaintext verified against the dummy hash when there is no real one.
const DUMMY_PASSWORD: &str = "tenantgate-dummy-password";

/// Credentials handed back to the client after a successful flow.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub user: User,
    pub tenant: Option<Tenant>,
    pub access: IssuedAccessToken,
    /// Absent when refresh rotation is off and the existing cookie stays valid.
    pub refresh: Option<IssuedRefreshToken>,
}

/// Cookies presented to the refresh endpoint.
#[derive(Debug, Clone, Default)]
pub struct RefreshInput<'a> {
    pub refresh_token: Option<&'a str>,
    pub tenant_cookie: Option<&'a str>,
    pub access_token: Option<&'a str>,
}

#[derive(Clone)]
pub struct LoginService {
    repos: Repositories,
    hasher: PasswordHasher,
    issuer: Arc<AccessTokenIssuer>,
    refresh: RefreshTokenService,
    lockout: LockoutGuard,
    audit: AuditLogger,
    email: Arc<dyn EmailSender>,
    /// Verified against on unknown users and locked accounts so every failure costs one hash.
    dummy_hash: Arc<String>,
}

impl std::fmt::Debug for LoginService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginService").field("hasher", &self.hasher).finish_non_exhaustive()
    }
}

fn parse_tenant_cookie(value: Option<&str>) -> Result<Option<TenantId>> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            TenantId::parse(v)
                .map_err(|_| Error::auth("Refresh token is invalid", AuthErrorType::TokenInvalid))
        })
        .transpose()
}

impl LoginService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: Repositories,
        hasher: PasswordHasher,
        issuer: Arc<AccessTokenIssuer>,
        refresh: RefreshTokenService,
        lockout: LockoutGuard,
        audit: AuditLogger,
        email: Arc<dyn EmailSender>,
    ) -> Result<Self> {
        let dummy_hash = Arc::new(hasher.hash(DUMMY_PASSWORD)?);
        Ok(Self { repos, hasher, issuer, refresh, lockout, audit, email, dummy_hash })
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    fn burn_dummy_verification(&self, password: &str) {
        let _ = self.hasher.verify(password, &self.dummy_hash);
    }

    async fn issue_session(&self, user: User, tenant: Option<Tenant>) -> Result<SessionTokens> {
        let access = self.issuer.issue(&user)?;
        let refresh = self.refresh.issue(&user.id, user.tenant_id.as_ref()).await?;
        Ok(SessionTokens { user, tenant, access, refresh: Some(refresh) })
    }

    /// Create a tenant with its first user as owner and sign that user in.
    #[instrument(skip(self, request, client), fields(tenant_slug = %request.tenant_slug), name = "auth_register")]
    pub async fn register(&self, request: RegisterRequest, client: &ClientInfo) -> Result<SessionTokens> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let slug = normalize_slug(&request.tenant_slug);

        if self.repos.tenants.slug_exists(&slug).await? {
            return Err(Error::conflict("Tenant slug is already taken", "tenant"));
        }
        if self.repos.users.email_exists(&email).await? {
            return Err(Error::conflict("Email is already registered", "user"));
        }

        let password_hash = self.hasher.hash(&request.password)?;
        let tenant_id = TenantId::new();
        let result = self
            .repos
            .tenants
            .create_with_owner(
                NewTenant {
                    id: tenant_id,
                    slug: slug.clone(),
                    name: request.company_name.trim().to_string(),
                    settings: TenantSettings::default(),
                },
                NewUser {
                    id: UserId::new(),
                    tenant_id: Some(tenant_id),
                    email: email.clone(),
                    name: request.name.trim().to_string(),
                    password_hash,
                    role: Role::Owner,
                },
            )
            .await;

        let (tenant, user) = match result {
            Ok(created) => created,
            Err(err) if err.is_unique_violation() => {
                return Err(Error::conflict("Tenant slug or email is already registered", "tenant"));
            }
            Err(err) => return Err(err),
        };

        info!(tenant_id = %tenant.id, user_id = %user.id, "tenant registered");
        self.audit.log(
            AuditEvent::new(actions::REGISTER, "tenant")
                .tenant(Some(tenant.id))
                .user(Some(user.id))
                .resource(tenant.id)
                .details(json!({ "slug": tenant.slug }))
                .client(client),
        );

        let sender = self.email.clone();
        let (to, name, company) = (user.email.clone(), user.name.clone(), tenant.name.clone());
        spawn_email("welcome", async move { sender.send_welcome_email(&to, &name, &company).await });

        self.issue_session(user, Some(tenant)).await
    }

    /// Email and password login.
    ///
    /// Unknown tenant, unknown user, wrong password, inactive user and an
    /// active lockout all fail with the same message after one hash
    /// verification.
    #[instrument(skip(self, request, client), fields(tenant_slug = ?request.tenant_slug), name = "auth_login")]
    pub async fn login(&self, request: LoginRequest, client: &ClientInfo) -> Result<SessionTokens> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let slug = request.tenant_slug.as_deref().map(normalize_slug).filter(|s| !s.is_empty());

        if self.lockout.is_locked(&email, slug.as_deref()).await? {
            self.burn_dummy_verification(&request.password);
            warn!(tenant_slug = ?slug, "login attempt on locked account");
            return Err(Error::auth("Invalid email or password", AuthErrorType::AccountLocked));
        }

        let tenant = match slug.as_deref() {
            Some(slug) => match self.repos.tenants.find_by_slug(slug).await?.filter(|t| t.is_active) {
                Some(tenant) => Some(tenant),
                None => {
                    self.burn_dummy_verification(&request.password);
                    self.record_failed_login(&email, Some(slug), None, None, client).await?;
                    return Err(Error::invalid_credentials());
                }
            },
            None => None,
        };
        let tenant_id = tenant.as_ref().map(|t| t.id);

        let user = self.repos.users.find_by_email(&email, tenant_id.as_ref()).await?;
        let verified = match &user {
            Some(user) => self.hasher.verify(&request.password, &user.password_hash),
            None => {
                self.burn_dummy_verification(&request.password);
                false
            }
        };

        let user = match user {
            Some(user) if verified && user.is_active => user,
            other => {
                let user_id = other.as_ref().map(|u| u.id);
                self.record_failed_login(&email, slug.as_deref(), tenant_id, user_id, client).await?;
                return Err(Error::invalid_credentials());
            }
        };

        self.lockout.record_success(&email, slug.as_deref()).await?;
        self.rehash_if_needed(&user, &request.password).await;
        let now = Utc::now();
        self.repos.users.record_login(&user.id, now).await?;
        let user = User { last_login_at: Some(now), ..user };

        info!(user_id = %user.id, tenant_id = ?tenant_id, "login succeeded");
        self.audit.log(
            AuditEvent::new(actions::LOGIN_SUCCESS, "user")
                .tenant(tenant_id)
                .user(Some(user.id))
                .resource(user.id)
                .client(client),
        );

        self.issue_session(user, tenant).await
    }

    async fn record_failed_login(
        &self,
        email: &str,
        slug: Option<&str>,
        tenant_id: Option<TenantId>,
        user_id: Option<UserId>,
        client: &ClientInfo,
    ) -> Result<()> {
        let locked_until = self.lockout.record_failure(email, slug).await?;
        warn!(tenant_slug = ?slug, user_id = ?user_id, "login failed");

        self.audit.log(
            AuditEvent::new(actions::LOGIN_FAILURE, "user")
                .tenant(tenant_id)
                .user(user_id)
                .details(json!({ "email": email, "tenantSlug": slug }))
                .client(client),
        );
        if let Some(until) = locked_until {
            self.audit.log(
                AuditEvent::new(actions::ACCOUNT_LOCKED, "user")
                    .tenant(tenant_id)
                    .user(user_id)
                    .details(json!({ "email": email, "lockedUntil": until }))
                    .client(client),
            );
        }
        Ok(())
    }

    async fn rehash_if_needed(&self, user: &User, password: &str) {
        if !self.hasher.needs_rehash(&user.password_hash) {
            return;
        }
        let result = match self.hasher.hash(password) {
            Ok(hash) => self.repos.users.update_password_hash(&user.id, &hash).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => info!(user_id = %user.id, "password hash upgraded"),
            Err(err) => warn!(user_id = %user.id, error = %err, "password rehash failed"),
        }
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The tenant cookie must match the tenant the refresh token was issued
    /// for; platform tokens carry no tenant. The caller must be identified by
    /// an authenticated context or a validly signed access token, and that
    /// user must own the refresh token.
    #[instrument(skip(self, input, authenticated, client), name = "auth_refresh")]
    pub async fn refresh(
        &self,
        input: RefreshInput<'_>,
        authenticated: Option<&AuthContext>,
        client: &ClientInfo,
    ) -> Result<SessionTokens> {
        let raw = input
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(Error::authentication_required)?;
        let tenant_id = parse_tenant_cookie(input.tenant_cookie)?;

        // A stolen refresh cookie alone is not enough: the caller must also
        // present a live session or a correctly signed, possibly expired, access token.
        let claimed_user = match authenticated {
            Some(ctx) => ctx.user_id(),
            None => input
                .access_token
                .filter(|t| !t.is_empty())
                .and_then(|t| self.issuer.decode_allow_expired(t).ok())
                .map(|claims| claims.sub)
                .ok_or_else(|| {
                    warn!("refresh attempted without a session or access token");
                    Error::authentication_required()
                })?,
        };

        let redemption = match self.refresh.redeem(raw, &claimed_user, tenant_id.as_ref()).await {
            Ok(redemption) => redemption,
            Err(err) => {
                if err.auth_error_type() == Some(AuthErrorType::TokenRevoked) {
                    self.audit.log(
                        AuditEvent::new(actions::REFRESH_REUSE, "refresh_token")
                            .tenant(tenant_id)
                            .user(Some(claimed_user))
                            .client(client),
                    );
                }
                return Err(err);
            }
        };

        let user = self
            .repos
            .users
            .find_by_id(&redemption.record.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| Error::auth("User account is not active", AuthErrorType::TokenRevoked))?;

        let tenant = match user.tenant_id {
            Some(id) => Some(
                self.repos
                    .tenants
                    .find_by_id(&id)
                    .await?
                    .filter(|t| t.is_active)
                    .ok_or_else(|| Error::tenant("Tenant not found", TenantErrorType::NotFound))?,
            ),
            None => None,
        };

        let access = self.issuer.issue(&user)?;
        Ok(SessionTokens { user, tenant, access, refresh: redemption.replacement })
    }

    /// Revoke the caller's refresh tokens for the tenant. Never fails.
    #[instrument(skip_all, name = "auth_logout")]
    pub async fn logout(
        &self,
        authenticated: Option<&AuthContext>,
        refresh_token: Option<&str>,
        tenant_cookie: Option<&str>,
        client: &ClientInfo,
    ) {
        let cookie_tenant = parse_tenant_cookie(tenant_cookie).ok().flatten();

        let target = match authenticated {
            Some(ctx) => Some((ctx.user_id(), ctx.user.tenant_id.or(cookie_tenant))),
            None => match refresh_token.filter(|t| !t.is_empty()) {
                Some(raw) => match self.refresh.owner_of(raw, cookie_tenant.as_ref()).await {
                    Ok(owner) => owner.map(|user_id| (user_id, cookie_tenant)),
                    Err(err) => {
                        warn!(error = %err, "could not resolve refresh token during logout");
                        None
                    }
                },
                None => None,
            },
        };

        let Some((user_id, tenant_id)) = target else {
            return;
        };

        if let Err(err) = self.refresh.revoke_for_tenant(&user_id, tenant_id.as_ref()).await {
            warn!(user_id = %user_id, error = %err, "failed to revoke refresh tokens during logout");
        }
        self.audit.log(
            AuditEvent::new(actions::LOGOUT, "session")
                .tenant(tenant_id)
                .user(Some(user_id))
                .client(client),
        );
    }

    /// Invalidate every access and refresh token of the user. Returns the new token version.
    #[instrument(skip(self, client), fields(user_id = %user_id), name = "auth_revoke_all")]
    pub async fn revoke_all_for_user(
        &self,
        user_id: &UserId,
        tenant_id: Option<TenantId>,
        client: &ClientInfo,
    ) -> Result<i32> {
        let version = self
            .repos
            .users
            .bump_token_version(user_id)
            .await?
            .ok_or_else(|| Error::not_found("user", user_id.to_string()))?;
        let revoked = self.refresh.revoke_all_for_user(user_id).await?;

        info!(user_id = %user_id, token_version = version, revoked, "all sessions revoked");
        self.audit.log(
            AuditEvent::new(actions::SESSIONS_REVOKED, "user")
                .tenant(tenant_id)
                .user(Some(*user_id))
                .resource(user_id)
                .details(json!({ "refreshTokensRevoked": revoked }))
                .client(client),
        );
        Ok(version)
    }

    /// Verify the current password, store the new one and start a fresh session.
    #[instrument(skip(self, ctx, request, client), fields(user_id = %ctx.user_id()), name = "auth_change_password")]
    pub async fn change_password(
        &self,
        ctx: &AuthContext,
        tenant: Option<Tenant>,
        request: ChangePasswordRequest,
        client: &ClientInfo,
    ) -> Result<SessionTokens> {
        request.validate()?;
        let user = self
            .repos
            .users
            .find_by_id(&ctx.user_id())
            .await?
            .ok_or_else(Error::authentication_required)?;

        if !self.hasher.verify(&request.current_password, &user.password_hash) {
            warn!(user_id = %user.id, "password change with wrong current password");
            return Err(Error::invalid_credentials());
        }
        if request.current_password == request.new_password {
            return Err(Error::validation_field(
                "New password must differ from the current password",
                "new_password",
            ));
        }

        let hash = self.hasher.hash(&request.new_password)?;
        let version = self
            .repos
            .users
            .set_password_and_bump_version(&user.id, &hash)
            .await?
            .ok_or_else(Error::authentication_required)?;
        self.refresh.revoke_all_for_user(&user.id).await?;
        self.repos.password_resets.invalidate_for_user(&user.id, Utc::now()).await?;

        self.audit.log(
            AuditEvent::new(actions::PASSWORD_CHANGED, "user")
                .tenant(user.tenant_id)
                .user(Some(user.id))
                .resource(user.id)
                .client(client),
        );

        let user = User { password_hash: hash, token_version: version, ..user };
        self.issue_session(user, tenant).await
    }
}

//! Password reset by emailed single-use token.
//!
//! Requests always succeed and always take at least the configured minimum
//! time plus random jitter, whether or not the account exists.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::json;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::hashing::{generate_secret, hash_token_secret, verify_token_secret, PasswordHasher};
use crate::auth::lockout::LockoutGuard;
use crate::auth::models::NewPasswordReset;
use crate::auth::refresh::RefreshTokenService;
use crate::auth::validation::{
    normalize_email, normalize_slug, PasswordResetConfirmRequest, PasswordResetRequest,
};
use crate::config::AuthConfig;
use crate::domain::ResetTokenId;
use crate::errors::{Error, Result};
use crate::services::audit::{actions, AuditEvent, AuditLogger, ClientInfo};
use crate::services::email::{spawn_email, EmailSender};
use crate::storage::Repositories;

pub const RESET_TOKEN_PREFIX: &str = "pr_";
const RESET_SECRET_BYTES: usize = 32;

/// Timing and link settings for reset requests.
#[derive(Debug, Clone)]
pub struct ResetPolicy {
    pub ttl: Duration,
    pub min_response: StdDuration,
    pub jitter: StdDuration,
    /// Frontend origin the emailed link points at.
    pub public_url: String,
}

impl ResetPolicy {
    pub fn from_config(auth: &AuthConfig, public_url: &str) -> Self {
        Self {
            ttl: auth.password_reset_ttl(),
            min_response: StdDuration::from_millis(auth.password_reset_min_response_ms),
            jitter: StdDuration::from_millis(auth.password_reset_jitter_ms),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn deadline(&self, started: Instant) -> Instant {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..=jitter_ms) };
        started + self.min_response + StdDuration::from_millis(jitter)
    }
}

fn parse_reset_token(raw: &str) -> Option<(ResetTokenId, &str)> {
    let rest = raw.strip_prefix(RESET_TOKEN_PREFIX)?;
    let (id, secret) = rest.split_once('.')?;
    if secret.is_empty() {
        return None;
    }
    Some((ResetTokenId::parse(id).ok()?, secret))
}

fn invalid_token() -> Error {
    Error::validation_field("Reset token is invalid or has expired", "token")
}

#[derive(Clone)]
pub struct PasswordResetService {
    repos: Repositories,
    hasher: PasswordHasher,
    refresh: RefreshTokenService,
    lockout: LockoutGuard,
    audit: AuditLogger,
    email: Arc<dyn EmailSender>,
    policy: ResetPolicy,
}

impl std::fmt::Debug for PasswordResetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordResetService").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl PasswordResetService {
    pub fn new(
        repos: Repositories,
        hasher: PasswordHasher,
        refresh: RefreshTokenService,
        lockout: LockoutGuard,
        audit: AuditLogger,
        email: Arc<dyn EmailSender>,
        policy: ResetPolicy,
    ) -> Self {
        Self { repos, hasher, refresh, lockout, audit, email, policy }
    }

    /// Start a reset. Always returns `Ok` once the padded deadline passes.
    #[instrument(skip(self, request, client), fields(tenant_slug = ?request.tenant_slug), name = "password_reset_request")]
    pub async fn request(&self, request: PasswordResetRequest, client: &ClientInfo) -> Result<()> {
        let started = Instant::now();
        let deadline = self.policy.deadline(started);

        request.validate()?;
        if let Err(err) = self.issue_reset(&request, client).await {
            warn!(error = %err, "password reset request failed");
        }

        tokio::time::sleep_until(deadline).await;
        Ok(())
    }

    async fn issue_reset(&self, request: &PasswordResetRequest, client: &ClientInfo) -> Result<()> {
        let email = normalize_email(&request.email);
        let slug = request.tenant_slug.as_deref().map(normalize_slug).filter(|s| !s.is_empty());

        let tenant_id = match slug.as_deref() {
            Some(slug) => match self.repos.tenants.find_by_slug(slug).await?.filter(|t| t.is_active) {
                Some(tenant) => Some(tenant.id),
                None => return Ok(()),
            },
            None => None,
        };
        let Some(user) = self
            .repos
            .users
            .find_by_email(&email, tenant_id.as_ref())
            .await?
            .filter(|u| u.is_active)
        else {
            return Ok(());
        };

        let now = Utc::now();
        self.repos.password_resets.invalidate_for_user(&user.id, now).await?;

        let id = ResetTokenId::new();
        let secret = generate_secret(RESET_SECRET_BYTES);
        self.repos
            .password_resets
            .insert(NewPasswordReset {
                id,
                user_id: user.id,
                tenant_id: user.tenant_id,
                token_hash: hash_token_secret(&secret),
                expires_at: now + self.policy.ttl,
            })
            .await?;

        let reset_url = format!(
            "{}/reset-password?token={}{}.{}",
            self.policy.public_url, RESET_TOKEN_PREFIX, id, secret
        );
        let sender = self.email.clone();
        let (to, name) = (user.email.clone(), user.name.clone());
        spawn_email("password_reset", async move {
            sender.send_password_reset_email(&to, &reset_url, &name).await
        });

        info!(user_id = %user.id, tenant_id = ?tenant_id, "password reset issued");
        self.audit.log(
            AuditEvent::new(actions::PASSWORD_RESET_REQUESTED, "user")
                .tenant(tenant_id)
                .user(Some(user.id))
                .resource(user.id)
                .client(client),
        );
        Ok(())
    }

    /// Complete a reset: set the new password and end every existing session.
    #[instrument(skip_all, name = "password_reset_confirm")]
    pub async fn confirm(&self, request: PasswordResetConfirmRequest, client: &ClientInfo) -> Result<()> {
        request.validate()?;
        let (id, secret) = parse_reset_token(&request.token).ok_or_else(invalid_token)?;

        let record = self.repos.password_resets.find_by_id(&id).await?.ok_or_else(invalid_token)?;
        if !verify_token_secret(secret, &record.token_hash) {
            warn!(reset_id = %id, "password reset with wrong secret");
            return Err(invalid_token());
        }

        let now = Utc::now();
        if !self.repos.password_resets.consume(&id, now).await? {
            return Err(invalid_token());
        }

        let user = self
            .repos
            .users
            .find_by_id(&record.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(invalid_token)?;

        let hash = self.hasher.hash(&request.new_password)?;
        self.repos.users.set_password_and_bump_version(&user.id, &hash).await?;
        self.repos.password_resets.invalidate_for_user(&user.id, now).await?;
        self.refresh.revoke_all_for_user(&user.id).await?;

        let slug = match user.tenant_id {
            Some(tenant_id) => self.repos.tenants.find_by_id(&tenant_id).await?.map(|t| t.slug),
            None => None,
        };
        self.lockout.clear(&user.email, slug.as_deref()).await?;

        info!(user_id = %user.id, "password reset completed");
        self.audit.log(
            AuditEvent::new(actions::PASSWORD_RESET_COMPLETED, "user")
                .tenant(user.tenant_id)
                .user(Some(user.id))
                .resource(user.id)
                .details(json!({ "resetId": id }))
                .client(client),
        );
        Ok(())
    }
}

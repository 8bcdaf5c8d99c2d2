//! Opaque refresh tokens with rotation and reuse detection.
//!
//! A raw token looks like `rt_{id}.{secret}`. The id is the primary key of
//! the stored record and the secret is only ever persisted as a SHA-256
//! digest, so reading the table never yields a usable token. Lookup is by id
//! followed by a constant-time digest comparison.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::auth::hashing::{generate_secret, hash_token_secret, verify_token_secret};
use crate::auth::models::{NewRefreshToken, RefreshTokenRecord};
use crate::domain::{RefreshTokenId, TenantId, UserId};
use crate::errors::{AuthErrorType, Error, Result};
use crate::storage::repository::RefreshTokenRepository;

pub const REFRESH_TOKEN_PREFIX: &str = "rt_";

/// 256 bits of entropy.
const REFRESH_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    /// Value for the cookie. Never stored.
    pub raw: String,
    pub id: RefreshTokenId,
    pub expires_at: DateTime<Utc>,
}

/// Result of presenting a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshRedemption {
    pub record: RefreshTokenRecord,
    /// Replacement token when rotation is enabled.
    pub replacement: Option<IssuedRefreshToken>,
}

#[derive(Clone)]
pub struct RefreshTokenService {
    repository: Arc<dyn RefreshTokenRepository>,
    ttl: Duration,
    rotate: bool,
}

impl std::fmt::Debug for RefreshTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenService")
            .field("ttl", &self.ttl)
            .field("rotate", &self.rotate)
            .finish()
    }
}

/// Split a raw token into its id and secret.
pub fn parse_refresh_token(raw: &str) -> Option<(RefreshTokenId, &str)> {
    let rest = raw.strip_prefix(REFRESH_TOKEN_PREFIX)?;
    let (id, secret) = rest.split_once('.')?;
    if secret.is_empty() {
        return None;
    }
    RefreshTokenId::parse(id).ok().map(|id| (id, secret))
}

fn invalid() -> Error {
    Error::auth("Refresh token is invalid", AuthErrorType::TokenInvalid)
}

impl RefreshTokenService {
    pub fn new(repository: Arc<dyn RefreshTokenRepository>, ttl: Duration, rotate: bool) -> Self {
        Self { repository, ttl, rotate }
    }

    pub fn rotates(&self) -> bool {
        self.rotate
    }

    #[instrument(skip(self), fields(user_id = %user_id), name = "refresh_issue")]
    pub async fn issue(
        &self,
        user_id: &UserId,
        tenant_id: Option<&TenantId>,
    ) -> Result<IssuedRefreshToken> {
        let id = RefreshTokenId::new();
        let secret = generate_secret(REFRESH_SECRET_BYTES);
        let expires_at = Utc::now() + self.ttl;

        self.repository
            .insert(NewRefreshToken {
                id,
                user_id: *user_id,
                tenant_id: tenant_id.copied(),
                token_hash: hash_token_secret(&secret),
                expires_at,
            })
            .await?;

        Ok(IssuedRefreshToken {
            raw: format!("{}{}.{}", REFRESH_TOKEN_PREFIX, id, secret),
            id,
            expires_at,
        })
    }

    /// Look up a raw token and check its secret and tenant.
    ///
    /// Does not check revocation or expiry.
    async fn authenticate(
        &self,
        raw: &str,
        expected_tenant: Option<&TenantId>,
    ) -> Result<RefreshTokenRecord> {
        let (id, secret) = parse_refresh_token(raw).ok_or_else(invalid)?;
        let record = self.repository.find_by_id(&id).await?.ok_or_else(invalid)?;

        if !verify_token_secret(secret, &record.token_hash) {
            warn!(token_id = %id, "refresh token secret mismatch");
            return Err(invalid());
        }

        if record.tenant_id.as_ref() != expected_tenant {
            warn!(token_id = %id, "refresh token presented for a different tenant");
            return Err(invalid());
        }

        Ok(record)
    }

    /// Redeem a refresh token.
    ///
    /// With rotation on, the token is consumed and replaced. Presenting a
    /// token that was already consumed or revoked revokes every token of that
    /// user in that tenant and fails with `TokenRevoked`.
    #[instrument(skip(self, raw), name = "refresh_redeem")]
    pub async fn redeem(
        &self,
        raw: &str,
        expected_user: &UserId,
        expected_tenant: Option<&TenantId>,
    ) -> Result<RefreshRedemption> {
        let record = self.authenticate(raw, expected_tenant).await?;
        if expected_user != &record.user_id {
            warn!(token_id = %record.id, "refresh token presented for a different user");
            return Err(invalid());
        }
        let now = Utc::now();

        if record.is_revoked {
            return Err(self.reuse_detected(&record, now).await);
        }

        if record.is_expired(now) {
            return Err(Error::auth("Refresh token has expired", AuthErrorType::TokenExpired));
        }

        if !self.rotate {
            return Ok(RefreshRedemption { record, replacement: None });
        }

        // Losing a race to a concurrent redemption is indistinguishable from replay.
        let consumed = match self.repository.consume(&record.id, now).await? {
            Some(consumed) => consumed,
            None if record.is_expired(Utc::now()) => {
                return Err(Error::auth("Refresh token has expired", AuthErrorType::TokenExpired));
            }
            None => return Err(self.reuse_detected(&record, now).await),
        };

        let replacement = self.issue(&consumed.user_id, consumed.tenant_id.as_ref()).await?;
        Ok(RefreshRedemption { record: consumed, replacement: Some(replacement) })
    }

    async fn reuse_detected(&self, record: &RefreshTokenRecord, now: DateTime<Utc>) -> Error {
        match self.repository.revoke_family(&record.user_id, record.tenant_id.as_ref(), now).await {
            Ok(revoked) => warn!(
                user_id = %record.user_id,
                tenant_id = ?record.tenant_id,
                token_id = %record.id,
                revoked,
                "refresh token reuse detected, token family revoked"
            ),
            Err(err) => return err,
        }
        Error::auth("Refresh token has been revoked", AuthErrorType::TokenRevoked)
    }

    /// Revoke the single token behind `raw` if it checks out. Never fails on a bad token.
    #[instrument(skip(self, raw), name = "refresh_revoke")]
    pub async fn revoke(&self, raw: &str, expected_tenant: Option<&TenantId>) -> Result<bool> {
        match self.authenticate(raw, expected_tenant).await {
            Ok(record) => self.repository.revoke(&record.id, Utc::now()).await,
            Err(err) if err.auth_error_type().is_some() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Owner of a token that checks out, revoked or not.
    pub async fn owner_of(&self, raw: &str, expected_tenant: Option<&TenantId>) -> Result<Option<UserId>> {
        match self.authenticate(raw, expected_tenant).await {
            Ok(record) => Ok(Some(record.user_id)),
            Err(err) if err.auth_error_type().is_some() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn revoke_for_tenant(&self, user_id: &UserId, tenant_id: Option<&TenantId>) -> Result<u64> {
        let revoked = self.repository.revoke_family(user_id, tenant_id, Utc::now()).await?;
        info!(user_id = %user_id, tenant_id = ?tenant_id, revoked, "refresh tokens revoked");
        Ok(revoked)
    }

    pub async fn revoke_all_for_user(&self, user_id: &UserId) -> Result<u64> {
        self.repository.revoke_all_for_user(user_id, Utc::now()).await
    }
}

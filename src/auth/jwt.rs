//! Access token issuing and verification (HS256 JWT).
//!
//! Access tokens are stateless. Verification here covers signature, issuer
//! and expiry only; the session pipeline additionally checks the embedded
//! token version against the live user row.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::auth::models::{Role, User};
use crate::domain::{TenantId, UserId};
use crate::errors::{AuthErrorType, Error, Result};

/// Claim set embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: UserId,
    /// Tenant of the user, absent for platform users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<TenantId>,
    pub role: Role,
    /// Must equal `users.token_version` at verification time
    pub tv: i32,
    pub jti: uuid::Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub jti: uuid::Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Signs and validates access tokens.
#[derive(Clone)]
pub struct AccessTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lenient_validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl AccessTokenIssuer {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let mut lenient_validation = validation.clone();
        lenient_validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            lenient_validation,
            issuer,
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<IssuedAccessToken> {
        self.issue_at(user, Utc::now())
    }

    pub(crate) fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedAccessToken> {
        let expires_at = now + self.ttl;
        let claims = AccessClaims {
            sub: user.id,
            tid: user.tenant_id,
            role: user.role,
            tv: user.token_version,
            jti: uuid::Uuid::new_v4(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| Error::internal(format!("Failed to sign access token: {}", err)))?;

        Ok(IssuedAccessToken { token, jti: claims.jti, expires_at })
    }

    /// Fails with `TokenExpired` or `TokenInvalid`.
    pub fn verify(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => {
                    Error::auth("Access token has expired", AuthErrorType::TokenExpired)
                }
                _ => Error::auth("Access token is invalid", AuthErrorType::TokenInvalid),
            })
    }

    /// Verify signature and issuer but accept an expired token.
    ///
    /// Used only to recover the user id during refresh and logout.
    pub fn decode_allow_expired(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.lenient_validation)
            .map(|data| data.claims)
            .map_err(|_| Error::auth("Access token is invalid", AuthErrorType::TokenInvalid))
    }
}

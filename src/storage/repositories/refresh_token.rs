//! Refresh token persistence.
//!
//! Consumption and revocation are single conditional `UPDATE` statements, so
//! two requests presenting the same token can never both succeed.

use crate::auth::models::{NewRefreshToken, RefreshTokenRecord};
use crate::domain::{RefreshTokenId, TenantId, UserId};
use crate::errors::{Error, Result};
use crate::storage::repository::RefreshTokenRepository;
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

const REFRESH_COLUMNS: &str =
    "id, user_id, tenant_id, token_hash, expires_at, is_revoked, revoked_at, created_at";

#[derive(Debug, Clone, FromRow)]
struct RefreshTokenRow {
    pub id: RefreshTokenId,
    pub user_id: UserId,
    pub tenant_id: Option<TenantId>,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshTokenRecord {
            id: row.id,
            user_id: row.user_id,
            tenant_id: row.tenant_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            is_revoked: row.is_revoked,
            revoked_at: row.revoked_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlxRefreshTokenRepository {
    pool: DbPool,
}

impl SqlxRefreshTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for SqlxRefreshTokenRepository {
    #[instrument(skip(self, token), fields(token_id = %token.id, user_id = %token.user_id), name = "db_insert_refresh_token")]
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "INSERT INTO refresh_tokens (id, user_id, tenant_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            REFRESH_COLUMNS
        ))
        .bind(token.id)
        .bind(token.user_id)
        .bind(token.tenant_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to store refresh token"))?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(token_id = %id), name = "db_find_refresh_token")]
    async fn find_by_id(&self, id: &RefreshTokenId) -> Result<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "SELECT {} FROM refresh_tokens WHERE id = $1",
            REFRESH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to fetch refresh token"))?;

        Ok(row.map(RefreshTokenRecord::from))
    }

    #[instrument(skip(self), fields(token_id = %id), name = "db_consume_refresh_token")]
    async fn consume(
        &self,
        id: &RefreshTokenId,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = $2 \
             WHERE id = $1 AND is_revoked = FALSE AND expires_at > $2 RETURNING {}",
            REFRESH_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to consume refresh token"))?;

        Ok(row.map(RefreshTokenRecord::from))
    }

    #[instrument(skip(self), fields(token_id = %id), name = "db_revoke_refresh_token")]
    async fn revoke(&self, id: &RefreshTokenId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = $2 \
             WHERE id = $1 AND is_revoked = FALSE",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to revoke refresh token"))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %user_id), name = "db_revoke_refresh_family")]
    async fn revoke_family(
        &self,
        user_id: &UserId,
        tenant_id: Option<&TenantId>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = $3 \
             WHERE user_id = $1 AND tenant_id IS NOT DISTINCT FROM $2 AND is_revoked = FALSE",
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to revoke refresh token family"))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(user_id = %user_id), name = "db_revoke_all_refresh_tokens")]
    async fn revoke_all_for_user(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = $2 \
             WHERE user_id = $1 AND is_revoked = FALSE",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to revoke refresh tokens"))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), name = "db_delete_expired_refresh_tokens")]
    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|err| Error::database(err, "Failed to delete expired refresh tokens"))?;

        Ok(result.rows_affected())
    }
}

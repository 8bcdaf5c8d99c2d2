//! Password reset token persistence.

use crate::auth::models::{NewPasswordReset, PasswordResetRecord};
use crate::domain::{ResetTokenId, TenantId, UserId};
use crate::errors::{Error, Result};
use crate::storage::repository::PasswordResetRepository;
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct PasswordResetRow {
    pub id: ResetTokenId,
    pub user_id: UserId,
    pub tenant_id: Option<TenantId>,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PasswordResetRow> for PasswordResetRecord {
    fn from(row: PasswordResetRow) -> Self {
        PasswordResetRecord {
            id: row.id,
            user_id: row.user_id,
            tenant_id: row.tenant_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            used_at: row.used_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlxPasswordResetRepository {
    pool: DbPool,
}

impl SqlxPasswordResetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PasswordResetRepository for SqlxPasswordResetRepository {
    #[instrument(skip(self, token), fields(user_id = %token.user_id), name = "db_insert_password_reset")]
    async fn insert(&self, token: NewPasswordReset) -> Result<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (id, user_id, tenant_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(token.tenant_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to store password reset token"))?;
        Ok(())
    }

    #[instrument(skip(self), fields(token_id = %id), name = "db_find_password_reset")]
    async fn find_by_id(&self, id: &ResetTokenId) -> Result<Option<PasswordResetRecord>> {
        let row = sqlx::query_as::<_, PasswordResetRow>(
            "SELECT id, user_id, tenant_id, token_hash, expires_at, used_at, created_at \
             FROM password_reset_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to fetch password reset token"))?;

        Ok(row.map(PasswordResetRecord::from))
    }

    #[instrument(skip(self), fields(token_id = %id), name = "db_consume_password_reset")]
    async fn consume(&self, id: &ResetTokenId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE password_reset_tokens SET used_at = $2 \
             WHERE id = $1 AND used_at IS NULL AND expires_at > $2",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to consume password reset token"))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(user_id = %user_id), name = "db_invalidate_password_resets")]
    async fn invalidate_for_user(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE password_reset_tokens SET used_at = $2 WHERE user_id = $1 AND used_at IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to invalidate password reset tokens"))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), name = "db_delete_stale_password_resets")]
    async fn delete_stale(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM password_reset_tokens WHERE expires_at < $1 OR used_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to delete stale password reset tokens"))?;

        Ok(result.rows_affected())
    }
}

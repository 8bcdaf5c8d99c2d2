//! Login attempt tracking and account lockouts.
//!
//! Keys are `(email, tenant_slug)`; callers pass emails already lowercased.

use crate::errors::{Error, Result};
use crate::storage::repository::LoginAttemptRepository;
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

// Data-modifying CTEs share one snapshot, so the failure inserted by this
// statement is not visible to the count and is added explicitly.
const RECORD_FAILURE_SQL: &str = r#"
WITH inserted AS (
    INSERT INTO login_attempts (email, tenant_slug, success, attempted_at)
    VALUES ($1, $2, FALSE, $3)
    RETURNING id
),
last_success AS (
    SELECT max(la.attempted_at) AS at
    FROM login_attempts la
    WHERE la.email = $1 AND la.tenant_slug = $2 AND la.success
),
failures AS (
    SELECT count(*) + 1 AS n
    FROM login_attempts la, last_success ls
    WHERE la.email = $1
      AND la.tenant_slug = $2
      AND NOT la.success
      AND la.attempted_at >= $4
      AND (ls.at IS NULL OR la.attempted_at > ls.at)
),
locked AS (
    INSERT INTO account_lockouts (email, tenant_slug, locked_until)
    SELECT $1, $2, $6 FROM failures WHERE failures.n >= $5
    ON CONFLICT (email, tenant_slug)
    DO UPDATE SET locked_until = GREATEST(account_lockouts.locked_until, EXCLUDED.locked_until)
    RETURNING locked_until
)
SELECT locked_until FROM locked
"#;

#[derive(Debug, Clone)]
pub struct SqlxLoginAttemptRepository {
    pool: DbPool,
}

impl SqlxLoginAttemptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptRepository for SqlxLoginAttemptRepository {
    #[instrument(skip(self, email), fields(tenant_slug = %tenant_slug), name = "db_active_lockout")]
    async fn active_lockout(
        &self,
        email: &str,
        tenant_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT locked_until FROM account_lockouts \
             WHERE email = $1 AND tenant_slug = $2 AND locked_until > $3",
        )
        .bind(email)
        .bind(tenant_slug)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to check account lockout"))
    }

    #[instrument(skip(self, email), fields(tenant_slug = %tenant_slug), name = "db_record_login_success")]
    async fn record_success(&self, email: &str, tenant_slug: &str, at: DateTime<Utc>) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| Error::database(err, "Failed to begin login success transaction"))?;

        sqlx::query(
            "INSERT INTO login_attempts (email, tenant_slug, success, attempted_at) VALUES ($1, $2, TRUE, $3)",
        )
        .bind(email)
        .bind(tenant_slug)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|err| Error::database(err, "Failed to record login success"))?;

        sqlx::query("DELETE FROM account_lockouts WHERE email = $1 AND tenant_slug = $2")
            .bind(email)
            .bind(tenant_slug)
            .execute(&mut *tx)
            .await
            .map_err(|err| Error::database(err, "Failed to clear account lockout"))?;

        tx.commit()
            .await
            .map_err(|err| Error::database(err, "Failed to commit login success"))
    }

    #[instrument(skip(self, email), fields(tenant_slug = %tenant_slug), name = "db_record_login_failure")]
    async fn record_failure(
        &self,
        email: &str,
        tenant_slug: &str,
        at: DateTime<Utc>,
        window_start: DateTime<Utc>,
        threshold: i64,
        locked_until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, DateTime<Utc>>(RECORD_FAILURE_SQL)
            .bind(email)
            .bind(tenant_slug)
            .bind(at)
            .bind(window_start)
            .bind(threshold)
            .bind(locked_until)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| Error::database(err, "Failed to record login failure"))
    }

    #[instrument(skip(self, email), fields(tenant_slug = %tenant_slug), name = "db_clear_lockout")]
    async fn clear_lockout(&self, email: &str, tenant_slug: &str) -> Result<()> {
        sqlx::query("DELETE FROM account_lockouts WHERE email = $1 AND tenant_slug = $2")
            .bind(email)
            .bind(tenant_slug)
            .execute(&self.pool)
            .await
            .map_err(|err| Error::database(err, "Failed to clear account lockout"))?;
        Ok(())
    }

    #[instrument(skip(self), name = "db_purge_login_attempts")]
    async fn purge_before(&self, before: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let attempts = sqlx::query("DELETE FROM login_attempts WHERE attempted_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|err| Error::database(err, "Failed to purge login attempts"))?;

        let lockouts = sqlx::query("DELETE FROM account_lockouts WHERE locked_until <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|err| Error::database(err, "Failed to purge expired lockouts"))?;

        Ok(attempts.rows_affected() + lockouts.rows_affected())
    }
}

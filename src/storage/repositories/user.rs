//! User repository backed by Postgres.

use crate::auth::models::{NewUser, Role, User};
use crate::domain::{TenantId, UserId};
use crate::errors::{Error, Result};
use crate::storage::repository::UserRepository;
use crate::storage::scope::TenantScope;
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

pub(crate) const USER_COLUMNS: &str = "id, tenant_id, email, name, password_hash, role, token_version, is_active, last_login_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub(crate) struct UserRow {
    pub id: UserId,
    pub tenant_id: Option<TenantId>,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
    pub token_version: i32,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        let role: Role = row
            .role
            .parse()
            .map_err(|_| Error::internal(format!("Unknown role '{}' on user {}", row.role, row.id)))?;

        Ok(User {
            id: row.id,
            tenant_id: row.tenant_id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role,
            token_version: row.token_version,
            is_active: row.is_active,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    #[instrument(skip(self, user), fields(user_id = %user.id), name = "db_create_user")]
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, tenant_id, email, name, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(user.tenant_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to create user"))?;

        row.try_into()
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_find_user")]
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to fetch user"))?;

        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self, email), name = "db_find_user_by_email")]
    async fn find_by_email(&self, email: &str, tenant_id: Option<&TenantId>) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1) AND tenant_id IS NOT DISTINCT FROM $2",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to fetch user by email"))?;

        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self, email), name = "db_email_exists")]
    async fn email_exists(&self, email: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1))")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| Error::database(err, "Failed to check email"))
    }

    #[instrument(skip(self, scope), fields(tenant_id = %scope.tenant_id()), name = "db_list_users")]
    async fn list_by_tenant(&self, scope: &TenantScope) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE tenant_id = $1 ORDER BY created_at",
            USER_COLUMNS
        ))
        .bind(scope.tenant_id())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to list users"))?;

        rows.into_iter().map(User::try_from).collect()
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_record_login")]
    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|err| Error::database(err, "Failed to record login"))?;
        Ok(())
    }

    #[instrument(skip(self, password_hash), fields(user_id = %id), name = "db_update_password_hash")]
    async fn update_password_hash(&self, id: &UserId, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|err| Error::database(err, "Failed to update password hash"))?;
        Ok(())
    }

    #[instrument(skip(self, password_hash), fields(user_id = %id), name = "db_set_password")]
    async fn set_password_and_bump_version(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<Option<i32>> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE users SET password_hash = $2, token_version = token_version + 1, updated_at = now() \
             WHERE id = $1 RETURNING token_version",
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to set password"))
    }

    #[instrument(skip(self), fields(user_id = %id), name = "db_bump_token_version")]
    async fn bump_token_version(&self, id: &UserId) -> Result<Option<i32>> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE users SET token_version = token_version + 1, updated_at = now() \
             WHERE id = $1 RETURNING token_version",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to bump token version"))
    }

    #[instrument(skip(self, scope), fields(tenant_id = %scope.tenant_id(), user_id = %id), name = "db_update_role")]
    async fn update_role(&self, scope: &TenantScope, id: &UserId, role: Role) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $3, token_version = token_version + 1, updated_at = now() \
             WHERE tenant_id = $1 AND id = $2 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(scope.tenant_id())
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to update role"))?;

        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self, scope), fields(tenant_id = %scope.tenant_id(), user_id = %id), name = "db_deactivate_user")]
    async fn deactivate(&self, scope: &TenantScope, id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET is_active = FALSE, token_version = token_version + 1, updated_at = now() \
             WHERE tenant_id = $1 AND id = $2 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(scope.tenant_id())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to deactivate user"))?;

        row.map(User::try_from).transpose()
    }
}

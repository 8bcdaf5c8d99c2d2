//! # Storage and Persistence
//!
//! Database connectivity, embedded migrations and the repositories backing
//! users, tenants, tokens, lockouts and tenant-scoped resources.

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repositories;
pub mod repository;
pub mod scope;
#[cfg(all(test, feature = "postgres_tests"))]
pub mod test_helpers;

use std::sync::Arc;

pub use crate::config::DatabaseConfig;

pub use memory::MemoryStore;
pub use migrations::run_migrations;
pub use pool::{create_pool, DbPool};
pub use repositories::{
    SqlxAuditSink, SqlxLoginAttemptRepository, SqlxPasswordResetRepository,
    SqlxPermissionRepository, SqlxRefreshTokenRepository, SqlxTaskRepository,
    SqlxTenantRepository, SqlxUserRepository,
};
pub use repository::{
    LoginAttemptRepository, PasswordResetRepository, PermissionRepository,
    RefreshTokenRepository, TaskRepository, TenantRepository, UserRepository,
};
pub use scope::TenantScope;

use crate::errors::{Error, Result};
use crate::services::audit::AuditSink;

/// Every repository the service needs, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub tenants: Arc<dyn TenantRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub permissions: Arc<dyn PermissionRepository>,
    pub login_attempts: Arc<dyn LoginAttemptRepository>,
    pub password_resets: Arc<dyn PasswordResetRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub audit: Arc<dyn AuditSink>,
    pool: Option<DbPool>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").field("postgres", &self.pool.is_some()).finish_non_exhaustive()
    }
}

impl Repositories {
    pub fn from_pool(pool: DbPool) -> Self {
        Self {
            users: Arc::new(SqlxUserRepository::new(pool.clone())),
            tenants: Arc::new(SqlxTenantRepository::new(pool.clone())),
            refresh_tokens: Arc::new(SqlxRefreshTokenRepository::new(pool.clone())),
            permissions: Arc::new(SqlxPermissionRepository::new(pool.clone())),
            login_attempts: Arc::new(SqlxLoginAttemptRepository::new(pool.clone())),
            password_resets: Arc::new(SqlxPasswordResetRepository::new(pool.clone())),
            tasks: Arc::new(SqlxTaskRepository::new(pool.clone())),
            audit: Arc::new(SqlxAuditSink::new(pool.clone())),
            pool: Some(pool),
        }
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            tenants: store.clone(),
            refresh_tokens: store.clone(),
            permissions: store.clone(),
            login_attempts: store.clone(),
            password_resets: store.clone(),
            tasks: store.clone(),
            audit: store,
            pool: None,
        }
    }

    /// Ping the database. Always healthy for the in-memory store.
    pub async fn check_health(&self) -> Result<()> {
        match &self.pool {
            Some(pool) => check_connection(pool).await,
            None => Ok(()),
        }
    }
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| Error::database(e, "Database connectivity check failed"))?;

    Ok(())
}

use crate::auth::models::Role;
use crate::errors::{Error, Result};
use crate::storage::repository::PermissionRepository;
use crate::storage::DbPool;
use async_trait::async_trait;
use tracing::instrument;

/// Reads the seeded role/permission catalog.
#[derive(Debug, Clone)]
pub struct SqlxPermissionRepository {
    pool: DbPool,
}

impl SqlxPermissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionRepository for SqlxPermissionRepository {
    #[instrument(skip(self), fields(role = %role), name = "db_permissions_for_role")]
    async fn permissions_for_role(&self, role: Role) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT permission_name FROM role_permissions WHERE role_name = $1 ORDER BY permission_name",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to load role permissions"))
    }
}

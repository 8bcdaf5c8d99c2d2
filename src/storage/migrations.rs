//! # Database Migration Management
//!
//! SQL migrations under `migrations/` are embedded into the binary at compile
//! time and applied in order on startup when `auto_migrate` is enabled.

use crate::errors::{Error, Result};
use crate::storage::DbPool;
use sqlx::migrate::Migrator;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    MIGRATOR.run(pool).await.map_err(|err| Error::Internal {
        message: "Failed to run database migrations".to_string(),
        source: Some(Box::new(err)),
    })?;

    info!(count = MIGRATOR.iter().count(), "Database migrations applied");
    Ok(())
}

/// Latest applied migration version, if any.
pub async fn current_version(pool: &DbPool) -> Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>(
        "SELECT version FROM _sqlx_migrations WHERE success ORDER BY version DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await
    .map_err(|err| Error::database(err, "Failed to read migration version"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_embedded_in_order() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert!(!versions.is_empty());
        let mut sorted = versions.clone();
        sorted.sort();
        assert_eq!(versions, sorted);
    }
}

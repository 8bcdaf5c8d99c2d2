//! Tenant scope for tenant-partitioned data access.
//!
//! A [`TenantScope`] can only be built from a resolved [`Tenant`], so every
//! repository method that takes one is unreachable until tenant resolution
//! has run. Postgres implementations both filter on `tenant_id` explicitly and
//! set `app.tenant_id` for the row-level-security policies.

use sqlx::{Postgres, Transaction};

use crate::auth::models::Tenant;
use crate::domain::TenantId;
use crate::errors::{Error, Result};
use crate::storage::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: TenantId,
}

impl TenantScope {
    pub fn for_resolved(tenant: &Tenant) -> Self {
        Self { tenant_id: tenant.id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Open a transaction with `app.tenant_id` set for its duration.
    pub async fn begin<'a>(&self, pool: &'a DbPool) -> Result<Transaction<'a, Postgres>> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|err| Error::database(err, "Failed to begin tenant-scoped transaction"))?;

        sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
            .bind(self.tenant_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|err| Error::database(err, "Failed to set tenant context"))?;

        Ok(tx)
    }
}

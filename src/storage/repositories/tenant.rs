//! Tenant repository backed by Postgres.

use crate::auth::models::{NewTenant, NewUser, Tenant, TenantSettings, User};
use crate::domain::TenantId;
use crate::errors::{Error, Result};
use crate::storage::repositories::user::{UserRow, USER_COLUMNS};
use crate::storage::repository::TenantRepository;
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::instrument;

const TENANT_COLUMNS: &str = "id, slug, name, is_active, settings, created_at";

#[derive(Debug, Clone, FromRow)]
struct TenantRow {
    pub id: TenantId,
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    pub settings: Json<TenantSettings>,
    pub created_at: DateTime<Utc>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            id: row.id,
            slug: row.slug,
            name: row.name,
            is_active: row.is_active,
            settings: row.settings.0,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlxTenantRepository {
    pool: DbPool,
}

impl SqlxTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for SqlxTenantRepository {
    #[instrument(skip(self), fields(tenant_id = %id), name = "db_find_tenant")]
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {} FROM tenants WHERE id = $1",
            TENANT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to fetch tenant"))?;

        Ok(row.map(Tenant::from))
    }

    #[instrument(skip(self), name = "db_find_tenant_by_slug")]
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {} FROM tenants WHERE slug = lower($1)",
            TENANT_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to fetch tenant by slug"))?;

        Ok(row.map(Tenant::from))
    }

    #[instrument(skip(self), name = "db_slug_exists")]
    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM tenants WHERE slug = lower($1))")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| Error::database(err, "Failed to check tenant slug"))
    }

    #[instrument(skip(self, tenant, owner), fields(tenant_id = %tenant.id, user_id = %owner.id), name = "db_create_tenant_with_owner")]
    async fn create_with_owner(&self, tenant: NewTenant, owner: NewUser) -> Result<(Tenant, User)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| Error::database(err, "Failed to begin registration transaction"))?;

        let tenant_row = sqlx::query_as::<_, TenantRow>(&format!(
            "INSERT INTO tenants (id, slug, name, settings) VALUES ($1, $2, $3, $4) RETURNING {}",
            TENANT_COLUMNS
        ))
        .bind(tenant.id)
        .bind(&tenant.slug)
        .bind(&tenant.name)
        .bind(Json(&tenant.settings))
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| Error::database(err, "Failed to create tenant"))?;

        let user_row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, tenant_id, email, name, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(owner.id)
        .bind(tenant_row.id)
        .bind(&owner.email)
        .bind(&owner.name)
        .bind(&owner.password_hash)
        .bind(owner.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| Error::database(err, "Failed to create tenant owner"))?;

        tx.commit()
            .await
            .map_err(|err| Error::database(err, "Failed to commit registration"))?;

        Ok((tenant_row.into(), user_row.try_into()?))
    }
}

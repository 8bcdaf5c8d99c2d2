//! Test database utilities for in-library tests.
//!
//! Each `TestDatabase` starts a fresh PostgreSQL container with all
//! migrations applied. Only compiled with the `postgres_tests` feature.

use crate::auth::models::{NewTenant, NewUser, Role, Tenant, TenantSettings, User};
use crate::config::DatabaseConfig;
use crate::domain::{TenantId, UserId};
use crate::storage::repositories::SqlxTenantRepository;
use crate::storage::repository::TenantRepository;
use crate::storage::{create_pool, DbPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

/// Keep this alive for the duration of the test; dropping it stops the container.
pub struct TestDatabase {
    pub pool: DbPool,
    _container: ContainerAsync<Postgres>,
}

impl TestDatabase {
    pub async fn new(prefix: &str) -> Self {
        let container = Postgres::default().start().await.unwrap_or_else(|e| {
            panic!("Failed to start PostgreSQL container for {}: {}", prefix, e)
        });

        let host = container
            .get_host()
            .await
            .unwrap_or_else(|e| panic!("Failed to get container host for {}: {}", prefix, e));

        let port = container
            .get_host_port_ipv4(5432)
            .await
            .unwrap_or_else(|e| panic!("Failed to get container port for {}: {}", prefix, e));

        let config = DatabaseConfig {
            url: format!("postgresql://postgres:postgres@{}:{}/postgres", host, port),
            auto_migrate: true,
            max_connections: 5,
            min_connections: 1,
            ..Default::default()
        };

        let pool = create_pool(&config)
            .await
            .unwrap_or_else(|e| panic!("Failed to create test pool for {}: {}", prefix, e));

        Self { pool, _container: container }
    }

    /// Create an active tenant whose owner has a placeholder hash.
    pub async fn seed_tenant(&self, slug: &str) -> (Tenant, User) {
        let tenant_id = TenantId::new();
        SqlxTenantRepository::new(self.pool.clone())
            .create_with_owner(
                NewTenant {
                    id: tenant_id,
                    slug: slug.to_string(),
                    name: format!("{slug} Inc"),
                    settings: TenantSettings::default(),
                },
                NewUser {
                    id: UserId::new(),
                    tenant_id: Some(tenant_id),
                    email: format!("owner@{slug}.test"),
                    name: "Owner".to_string(),
                    password_hash: "$argon2id$placeholder".to_string(),
                    role: Role::Owner,
                },
            )
            .await
            .unwrap_or_else(|e| panic!("Failed to seed tenant '{}': {}", slug, e))
    }
}

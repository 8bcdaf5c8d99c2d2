//! Audit log repository for authentication and tenant administration events.

use crate::errors::{Error, Result};
use crate::services::audit::{AuditEvent, AuditSink};
use crate::storage::DbPool;
use async_trait::async_trait;

/// Writes audit events to the append-only `audit_log` table.
#[derive(Debug, Clone)]
pub struct SqlxAuditSink {
    pool: DbPool,
}

impl SqlxAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for SqlxAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (tenant_id, user_id, action, resource_type, resource_id, details, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.tenant_id)
        .bind(event.user_id)
        .bind(&event.action)
        .bind(&event.resource_type)
        .bind(event.resource_id.as_deref())
        .bind(sqlx::types::Json(&event.details))
        .bind(event.ip_address.as_deref())
        .bind(event.user_agent.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|err| Error::database(err, "Failed to write audit event"))?;

        Ok(())
    }
}

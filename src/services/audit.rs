//! Audit trail for authentication and tenant administration events.
//!
//! Events are redacted before they reach any sink: any detail key whose name
//! mentions a password, token, secret or hash is replaced, at any depth.
//! [`AuditLogger::log`] is fire-and-forget so a slow or failing audit store
//! never blocks or fails the request that produced the event.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{TenantId, UserId};
use crate::errors::Result;

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["password", "token", "secret", "hash"];

/// Well-known action names.
pub mod actions {
    pub const REGISTER: &str = "auth.register";
    pub const LOGIN_SUCCESS: &str = "auth.login.success";
    pub const LOGIN_FAILURE: &str = "auth.login.failure";
    pub const ACCOUNT_LOCKED: &str = "auth.account.locked";
    pub const LOGOUT: &str = "auth.logout";
    pub const REFRESH_REUSE: &str = "auth.refresh.reuse_detected";
    pub const PASSWORD_CHANGED: &str = "auth.password.changed";
    pub const PASSWORD_RESET_REQUESTED: &str = "auth.password_reset.requested";
    pub const PASSWORD_RESET_COMPLETED: &str = "auth.password_reset.completed";
    pub const SESSIONS_REVOKED: &str = "auth.sessions.revoked";
    pub const TENANT_SPOOF_ATTEMPT: &str = "tenant.spoof_attempt";
    pub const USER_ROLE_CHANGED: &str = "user.role_changed";
    pub const USER_DEACTIVATED: &str = "user.deactivated";
    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_UPDATED: &str = "task.updated";
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub tenant_id: Option<TenantId>,
    pub user_id: Option<UserId>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEvent {
    pub fn new(action: &str, resource_type: &str) -> Self {
        Self {
            tenant_id: None,
            user_id: None,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: None,
            details: Value::Object(Map::new()),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn tenant(mut self, tenant_id: Option<TenantId>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn resource(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn client(mut self, client: &ClientInfo) -> Self {
        self.ip_address = client.ip_address.clone();
        self.user_agent = client.user_agent.clone();
        self
    }

    /// Copy of the event with sensitive detail values replaced.
    pub fn redacted(mut self) -> Self {
        redact_value(&mut self.details);
        self
    }
}

/// Caller network details attached to audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|fragment| lowered.contains(fragment))
}

pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *inner = Value::String(REDACTED.to_string());
                } else {
                    redact_value(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
}

/// Sink that only emits a structured log line. Used when no database is wired.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        tracing::info!(
            target: "audit",
            action = %event.action,
            resource_type = %event.resource_type,
            resource_id = ?event.resource_id,
            tenant_id = ?event.tenant_id,
            user_id = ?event.user_id,
            details = %event.details,
            "audit event"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Redact and record in the background. Failures are logged and dropped.
    pub fn log(&self, event: AuditEvent) {
        let sink = self.sink.clone();
        let event = event.redacted();
        tokio::spawn(async move {
            let action = event.action.clone();
            if let Err(err) = sink.record(event).await {
                warn!(error = %err, action = %action, "Failed to record audit event");
            } else {
                debug!(action = %action, "Audit event recorded");
            }
        });
    }

    /// Redact and record, waiting for the sink.
    pub async fn record(&self, event: AuditEvent) -> Result<()> {
        self.sink.record(event.redacted()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditSink for CollectingSink {
        async fn record(&self, event: AuditEvent) -> Result<()> {
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _event: AuditEvent) -> Result<()> {
            Err(crate::errors::Error::internal("audit store down"))
        }
    }

    #[test]
    fn test_sensitive_keys_are_redacted_at_any_depth() {
        let mut details = json!({
            "email": "a@b.co",
            "newPassword": "hunter2",
            "nested": { "refresh_token": "rt_x", "ok": 1 },
            "list": [{ "clientSecret": "s" }, { "passwordHash": "$argon2id$" }]
        });
        redact_value(&mut details);

        assert_eq!(details["email"], "a@b.co");
        assert_eq!(details["newPassword"], REDACTED);
        assert_eq!(details["nested"]["refresh_token"], REDACTED);
        assert_eq!(details["nested"]["ok"], 1);
        assert_eq!(details["list"][0]["clientSecret"], REDACTED);
        assert_eq!(details["list"][1]["passwordHash"], REDACTED);
    }

    #[tokio::test]
    async fn test_record_redacts_before_sink() {
        let sink = Arc::new(CollectingSink::default());
        let logger = AuditLogger::new(sink.clone());

        logger
            .record(AuditEvent::new(actions::LOGIN_FAILURE, "user").details(json!({"password": "x"})))
            .await
            .unwrap();

        let events = sink.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details["password"], REDACTED);
    }

    #[tokio::test]
    async fn test_background_failure_does_not_propagate() {
        let logger = AuditLogger::new(Arc::new(FailingSink));
        logger.log(AuditEvent::new(actions::LOGOUT, "session"));
        tokio::task::yield_now().await;
    }
}

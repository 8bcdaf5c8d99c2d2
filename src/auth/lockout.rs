//! Account lockout after repeated failed logins.
//!
//! Attempts are keyed by `(email, tenant_slug)`; platform logins use an
//! empty slug. A lockout is reported to the caller exactly like a wrong
//! password.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::auth::validation::{normalize_email, normalize_slug};
use crate::config::LockoutConfig;
use crate::errors::Result;
use crate::storage::repository::LoginAttemptRepository;

#[derive(Clone)]
pub struct LockoutGuard {
    repository: Arc<dyn LoginAttemptRepository>,
    config: LockoutConfig,
}

impl std::fmt::Debug for LockoutGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutGuard").field("config", &self.config).finish()
    }
}

fn key(email: &str, tenant_slug: Option<&str>) -> (String, String) {
    (normalize_email(email), tenant_slug.map(normalize_slug).unwrap_or_default())
}

impl LockoutGuard {
    pub fn new(repository: Arc<dyn LoginAttemptRepository>, config: LockoutConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    pub async fn is_locked(&self, email: &str, tenant_slug: Option<&str>) -> Result<bool> {
        let (email, slug) = key(email, tenant_slug);
        Ok(self.repository.active_lockout(&email, &slug, Utc::now()).await?.is_some())
    }

    /// Record a failed attempt. Returns the lockout end when this failure locks the account.
    pub async fn record_failure(
        &self,
        email: &str,
        tenant_slug: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>> {
        let (email, slug) = key(email, tenant_slug);
        let now = Utc::now();
        let locked_until = self
            .repository
            .record_failure(
                &email,
                &slug,
                now,
                now - self.config.window(),
                i64::from(self.config.max_failures),
                now + self.config.lockout_duration(),
            )
            .await?;

        if let Some(until) = locked_until {
            warn!(tenant_slug = %slug, locked_until = %until, "account locked after repeated failed logins");
        }
        Ok(locked_until)
    }

    pub async fn record_success(&self, email: &str, tenant_slug: Option<&str>) -> Result<()> {
        let (email, slug) = key(email, tenant_slug);
        self.repository.record_success(&email, &slug, Utc::now()).await
    }

    /// Lift a lockout, e.g. after a completed password reset.
    pub async fn clear(&self, email: &str, tenant_slug: Option<&str>) -> Result<()> {
        let (email, slug) = key(email, tenant_slug);
        self.repository.clear_lockout(&email, &slug).await
    }
}

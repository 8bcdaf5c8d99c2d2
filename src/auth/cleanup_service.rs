//! Background maintenance for expired credentials and stale login attempts.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::LockoutConfig;
use crate::errors::Result;
use crate::storage::Repositories;

/// Revoked refresh tokens are kept this long past expiry so replays still hit reuse detection.
const REFRESH_TOKEN_GRACE_DAYS: i64 = 1;

/// Rows removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub refresh_tokens: u64,
    pub login_attempts: u64,
    pub password_resets: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.refresh_tokens + self.login_attempts + self.password_resets
    }
}

#[derive(Clone)]
pub struct CleanupService {
    repos: Repositories,
    lockout: LockoutConfig,
}

impl CleanupService {
    pub fn new(repos: Repositories, lockout: LockoutConfig) -> Self {
        Self { repos, lockout }
    }

    /// Delete expired refresh tokens, login attempts outside the lockout
    /// window together with lapsed lockouts, and used or expired reset tokens.
    pub async fn run_once(&self) -> Result<CleanupReport> {
        let now = Utc::now();

        let refresh_tokens = self
            .repos
            .refresh_tokens
            .delete_expired(now - Duration::days(REFRESH_TOKEN_GRACE_DAYS))
            .await?;
        let login_attempts =
            self.repos.login_attempts.purge_before(now - self.lockout.window(), now).await?;
        let password_resets = self.repos.password_resets.delete_stale(now).await?;

        Ok(CleanupReport { refresh_tokens, login_attempts, password_resets })
    }

    /// Run [`Self::run_once`] on a fixed interval until the task is aborted.
    pub fn spawn(self, every: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(report) if report.total() > 0 => {
                        info!(
                            refresh_tokens = report.refresh_tokens,
                            login_attempts = report.login_attempts,
                            password_resets = report.password_resets,
                            "Cleanup removed stale auth records"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Cleanup pass failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::refresh::RefreshTokenService;
    use crate::domain::UserId;
    use crate::storage::{LoginAttemptRepository, MemoryStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_once_removes_only_stale_records() {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::in_memory(store.clone());
        let refresh = RefreshTokenService::new(store.clone(), Duration::days(7), true);
        let user = UserId::new();

        let stale = refresh.issue(&user, None).await.unwrap();
        let live = refresh.issue(&user, None).await.unwrap();
        store.set_refresh_expiry(&stale.id, Utc::now() - Duration::days(2)).await;

        let now = Utc::now();
        store
            .record_failure("a@acme.com", "acme", now - Duration::hours(1), now - Duration::hours(2), 5, now)
            .await
            .unwrap();
        store
            .record_failure("a@acme.com", "acme", now, now - Duration::minutes(15), 5, now)
            .await
            .unwrap();

        let service = CleanupService::new(repos, LockoutConfig::default());
        let report = service.run_once().await.unwrap();
        assert_eq!(report.refresh_tokens, 1);
        assert_eq!(report.login_attempts, 1);

        let remaining = store.refresh_tokens_for(&user).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, live.id);

        assert_eq!(service.run_once().await.unwrap(), CleanupReport::default());
    }
}

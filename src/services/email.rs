//! Outbound email collaborator.
//!
//! Delivery itself lives outside this service. Callers dispatch through
//! [`spawn_email`] so a failed send is logged and never reaches the client.

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::Result;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_password_reset_email(&self, to: &str, reset_url: &str, name: &str) -> Result<()>;

    async fn send_welcome_email(&self, to: &str, name: &str, company_name: &str) -> Result<()>;
}

/// Logs the message instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send_password_reset_email(&self, to: &str, _reset_url: &str, name: &str) -> Result<()> {
        info!(to = %to, name = %name, "Password reset email queued");
        Ok(())
    }

    async fn send_welcome_email(&self, to: &str, name: &str, company_name: &str) -> Result<()> {
        info!(to = %to, name = %name, company = %company_name, "Welcome email queued");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    PasswordReset { to: String, reset_url: String, name: String },
    Welcome { to: String, name: String, company_name: String },
}

/// Keeps sent messages in memory so tests can read reset links back.
#[derive(Debug, Default)]
pub struct MemoryEmailSender {
    sent: Mutex<Vec<SentEmail>>,
}

impl MemoryEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }

    /// Most recent reset link sent to `to`.
    pub async fn last_reset_url(&self, to: &str) -> Option<String> {
        self.sent.lock().await.iter().rev().find_map(|email| match email {
            SentEmail::PasswordReset { to: recipient, reset_url, .. } if recipient == to => {
                Some(reset_url.clone())
            }
            _ => None,
        })
    }
}

#[async_trait]
impl EmailSender for MemoryEmailSender {
    async fn send_password_reset_email(&self, to: &str, reset_url: &str, name: &str) -> Result<()> {
        self.sent.lock().await.push(SentEmail::PasswordReset {
            to: to.to_string(),
            reset_url: reset_url.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn send_welcome_email(&self, to: &str, name: &str, company_name: &str) -> Result<()> {
        self.sent.lock().await.push(SentEmail::Welcome {
            to: to.to_string(),
            name: name.to_string(),
            company_name: company_name.to_string(),
        });
        Ok(())
    }
}

/// Run an email send in the background, logging failures.
pub fn spawn_email<F>(kind: &'static str, send: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = send.await {
            warn!(error = %err, kind, "Failed to send email");
        }
    });
}

//! # tenantgate
//!
//! Tenant-isolated authentication, session management and permission
//! enforcement for a multi-tenant CRM.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum) → CSRF check → session pipeline → tenant guard → handler
//!                               ↓                    ↓            ↓
//!                         access token +       TenantScope    permission and
//!                         token version                      ownership checks
//! ```
//!
//! Credentials live in HTTP-only cookies: a short-lived signed access token
//! and a rotating refresh token whose reuse revokes the whole family. The
//! user's token version invalidates every outstanding access token in one
//! write. Tenant-scoped data is only reachable through a
//! [`storage::TenantScope`], which can only be built from a resolved tenant.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenantgate::{api, config::AppConfig, services::LoggingEmailSender, storage};
//!
//! #[tokio::main]
//! async fn main() -> tenantgate::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let pool = storage::create_pool(&config.database).await?;
//!     let repos = storage::Repositories::from_pool(pool);
//!     let state = api::AppState::build(config, repos, Arc::new(LoggingEmailSender))?;
//!     api::start_api_server(state).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{AppConfig, Environment};
pub use errors::{Error, Result};
pub use observability::init_tracing;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

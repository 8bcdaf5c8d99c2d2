//! Postgres repository implementations
//!
//! One file per table group. Each type implements the matching trait from
//! [`crate::storage::repository`].

pub mod audit_log;
pub mod login_attempt;
pub mod password_reset;
pub mod permission;
pub mod refresh_token;
pub mod task;
pub mod tenant;
pub mod user;

pub use audit_log::SqlxAuditSink;
pub use login_attempt::SqlxLoginAttemptRepository;
pub use password_reset::SqlxPasswordResetRepository;
pub use permission::SqlxPermissionRepository;
pub use refresh_token::SqlxRefreshTokenRepository;
pub use task::SqlxTaskRepository;
pub use tenant::SqlxTenantRepository;
pub use user::SqlxUserRepository;

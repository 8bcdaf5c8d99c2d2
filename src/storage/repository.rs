//! # Repository Traits
//!
//! Storage interfaces consumed by the auth core. Each trait has a Postgres
//! implementation under `repositories/` and an in-process implementation in
//! [`crate::storage::memory`]. Every mutation that guards authentication
//! state is a single atomic statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::models::{
    NewPasswordReset, NewRefreshToken, NewTask, NewTenant, NewUser, PasswordResetRecord,
    RefreshTokenRecord, Role, Task, TaskUpdate, Tenant, User,
};
use crate::domain::{RefreshTokenId, ResetTokenId, TaskId, TenantId, UserId};
use crate::errors::Result;
use crate::storage::scope::TenantScope;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>>;

    /// Look up by email within a tenant; `None` selects platform users.
    async fn find_by_email(&self, email: &str, tenant_id: Option<&TenantId>) -> Result<Option<User>>;

    /// Global, case-insensitive email existence check.
    async fn email_exists(&self, email: &str) -> Result<bool>;

    async fn list_by_tenant(&self, scope: &TenantScope) -> Result<Vec<User>>;

    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<()>;

    /// Replace the hash without touching the token version (transparent rehash).
    async fn update_password_hash(&self, id: &UserId, password_hash: &str) -> Result<()>;

    /// Replace the hash and bump the token version. Returns the new version.
    async fn set_password_and_bump_version(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<Option<i32>>;

    /// Increment `token_version` in place. Returns the new version.
    async fn bump_token_version(&self, id: &UserId) -> Result<Option<i32>>;

    /// Change the role of a tenant member and bump its token version.
    async fn update_role(&self, scope: &TenantScope, id: &UserId, role: Role)
        -> Result<Option<User>>;

    /// Soft-delete a tenant member and bump its token version.
    async fn deactivate(&self, scope: &TenantScope, id: &UserId) -> Result<Option<User>>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Create a tenant and its first user in one transaction.
    async fn create_with_owner(&self, tenant: NewTenant, owner: NewUser) -> Result<(Tenant, User)>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord>;

    async fn find_by_id(&self, id: &RefreshTokenId) -> Result<Option<RefreshTokenRecord>>;

    /// Revoke the token if it is still live and return it. `None` when it was
    /// already revoked, expired or missing; concurrent callers see exactly one winner.
    async fn consume(
        &self,
        id: &RefreshTokenId,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>>;

    async fn revoke(&self, id: &RefreshTokenId, now: DateTime<Utc>) -> Result<bool>;

    /// Revoke every live token of the user within one tenant.
    async fn revoke_family(
        &self,
        user_id: &UserId,
        tenant_id: Option<&TenantId>,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    async fn revoke_all_for_user(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<u64>;

    /// Delete tokens that expired before `before`.
    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn permissions_for_role(&self, role: Role) -> Result<Vec<String>>;
}

#[async_trait]
pub trait LoginAttemptRepository: Send + Sync {
    async fn active_lockout(
        &self,
        email: &str,
        tenant_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Record a success and clear any lockout for the key.
    async fn record_success(&self, email: &str, tenant_slug: &str, at: DateTime<Utc>)
        -> Result<()>;

    /// Record a failure. When the failures since `window_start` (and since the
    /// last success) reach `threshold`, create or extend the lockout to
    /// `locked_until` and return it.
    async fn record_failure(
        &self,
        email: &str,
        tenant_slug: &str,
        at: DateTime<Utc>,
        window_start: DateTime<Utc>,
        threshold: i64,
        locked_until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn clear_lockout(&self, email: &str, tenant_slug: &str) -> Result<()>;

    /// Delete attempts older than `before` and lockouts that already ended.
    async fn purge_before(&self, before: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    async fn insert(&self, token: NewPasswordReset) -> Result<()>;

    async fn find_by_id(&self, id: &ResetTokenId) -> Result<Option<PasswordResetRecord>>;

    /// Mark the token used if it is unused and unexpired. True for the single winner.
    async fn consume(&self, id: &ResetTokenId, now: DateTime<Utc>) -> Result<bool>;

    /// Mark every outstanding token of the user used.
    async fn invalidate_for_user(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<u64>;

    async fn delete_stale(&self, before: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, scope: &TenantScope, task: NewTask) -> Result<Task>;

    async fn find(&self, scope: &TenantScope, id: &TaskId) -> Result<Option<Task>>;

    /// Owner of the task, `None` when the task is missing or unassigned.
    async fn find_owner(&self, scope: &TenantScope, id: &TaskId) -> Result<Option<UserId>>;

    async fn list(&self, scope: &TenantScope, assigned_to: Option<&UserId>) -> Result<Vec<Task>>;

    async fn update(
        &self,
        scope: &TenantScope,
        id: &TaskId,
        update: &TaskUpdate,
    ) -> Result<Option<Task>>;
}

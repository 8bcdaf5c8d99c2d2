//! In-process store implementing every repository trait.
//!
//! All state lives behind a single lock, so each trait method is atomic with
//! respect to the others just like the single-statement Postgres versions.
//! Used by the test suite and by the binary when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::auth::models::{
    NewPasswordReset, NewRefreshToken, NewTask, NewTenant, NewUser, PasswordResetRecord,
    RefreshTokenRecord, Role, Task, TaskUpdate, Tenant, User,
};
use crate::auth::permissions::builtin_role_permissions;
use crate::domain::{RefreshTokenId, ResetTokenId, TaskId, TenantId, UserId};
use crate::errors::{Error, Result};
use crate::services::audit::{AuditEvent, AuditSink};
use crate::storage::repository::{
    LoginAttemptRepository, PasswordResetRepository, PermissionRepository,
    RefreshTokenRepository, TaskRepository, TenantRepository, UserRepository,
};
use crate::storage::scope::TenantScope;

#[derive(Debug, Clone)]
struct LoginAttempt {
    email: String,
    tenant_slug: String,
    success: bool,
    attempted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tenants: HashMap<TenantId, Tenant>,
    users: HashMap<UserId, User>,
    refresh_tokens: HashMap<RefreshTokenId, RefreshTokenRecord>,
    login_attempts: Vec<LoginAttempt>,
    lockouts: HashMap<(String, String), DateTime<Utc>>,
    password_resets: HashMap<ResetTokenId, PasswordResetRecord>,
    tasks: HashMap<TaskId, Task>,
    audit: Vec<AuditEvent>,
}

impl MemoryState {
    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn insert_user(&mut self, user: NewUser) -> Result<User> {
        if self.email_taken(&user.email) {
            return Err(Error::conflict("Email is already registered", "user"));
        }
        let now = Utc::now();
        let user = User {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
            token_version: 0,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn tenant_member_mut(&mut self, scope: &TenantScope, id: &UserId) -> Option<&mut User> {
        self.users.get_mut(id).filter(|u| u.tenant_id == Some(scope.tenant_id()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tenant directly, bypassing registration.
    pub async fn seed_tenant(&self, tenant: Tenant) {
        self.state.lock().await.tenants.insert(tenant.id, tenant);
    }

    /// Insert a task directly, bypassing authorization.
    pub async fn seed_task(&self, task: Task) {
        self.state.lock().await.tasks.insert(task.id, task);
    }

    pub async fn set_tenant_active(&self, id: &TenantId, active: bool) {
        if let Some(tenant) = self.state.lock().await.tenants.get_mut(id) {
            tenant.is_active = active;
        }
    }

    pub async fn refresh_tokens_for(&self, user_id: &UserId) -> Vec<RefreshTokenRecord> {
        self.state
            .lock()
            .await
            .refresh_tokens
            .values()
            .filter(|t| &t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Move a refresh token's expiry, for expiry tests.
    pub async fn set_refresh_expiry(&self, id: &RefreshTokenId, expires_at: DateTime<Utc>) {
        if let Some(token) = self.state.lock().await.refresh_tokens.get_mut(id) {
            token.expires_at = expires_at;
        }
    }

    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.state.lock().await.audit.clone()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.state.lock().await.insert_user(user)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str, tenant_id: Option<&TenantId>) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email) && u.tenant_id.as_ref() == tenant_id)
            .cloned())
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        Ok(self.state.lock().await.email_taken(email))
    }

    async fn list_by_tenant(&self, scope: &TenantScope) -> Result<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.tenant_id == Some(scope.tenant_id()))
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.state.lock().await.users.get_mut(id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn update_password_hash(&self, id: &UserId, password_hash: &str) -> Result<()> {
        if let Some(user) = self.state.lock().await.users.get_mut(id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_password_and_bump_version(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<Option<i32>> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(id).map(|user| {
            user.password_hash = password_hash.to_string();
            user.token_version += 1;
            user.updated_at = Utc::now();
            user.token_version
        }))
    }

    async fn bump_token_version(&self, id: &UserId) -> Result<Option<i32>> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(id).map(|user| {
            user.token_version += 1;
            user.updated_at = Utc::now();
            user.token_version
        }))
    }

    async fn update_role(&self, scope: &TenantScope, id: &UserId, role: Role) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        Ok(state.tenant_member_mut(scope, id).map(|user| {
            user.role = role;
            user.token_version += 1;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn deactivate(&self, scope: &TenantScope, id: &UserId) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        Ok(state.tenant_member_mut(scope, id).map(|user| {
            user.is_active = false;
            user.token_version += 1;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

#[async_trait]
impl TenantRepository for MemoryStore {
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>> {
        Ok(self.state.lock().await.tenants.get(id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        let state = self.state.lock().await;
        Ok(state.tenants.values().find(|t| t.slug.eq_ignore_ascii_case(slug)).cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.tenants.values().any(|t| t.slug.eq_ignore_ascii_case(slug)))
    }

    async fn create_with_owner(&self, tenant: NewTenant, owner: NewUser) -> Result<(Tenant, User)> {
        let mut state = self.state.lock().await;
        if state.tenants.values().any(|t| t.slug.eq_ignore_ascii_case(&tenant.slug)) {
            return Err(Error::conflict("Tenant slug is already taken", "tenant"));
        }
        if state.email_taken(&owner.email) {
            return Err(Error::conflict("Email is already registered", "user"));
        }

        let tenant = Tenant {
            id: tenant.id,
            slug: tenant.slug.to_lowercase(),
            name: tenant.name,
            is_active: true,
            settings: tenant.settings,
            created_at: Utc::now(),
        };
        state.tenants.insert(tenant.id, tenant.clone());
        let user = state.insert_user(NewUser { tenant_id: Some(tenant.id), ..owner })?;
        Ok((tenant, user))
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord> {
        let record = RefreshTokenRecord {
            id: token.id,
            user_id: token.user_id,
            tenant_id: token.tenant_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            is_revoked: false,
            revoked_at: None,
            created_at: Utc::now(),
        };
        self.state.lock().await.refresh_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &RefreshTokenId) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.state.lock().await.refresh_tokens.get(id).cloned())
    }

    async fn consume(
        &self,
        id: &RefreshTokenId,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>> {
        let mut state = self.state.lock().await;
        Ok(state
            .refresh_tokens
            .get_mut(id)
            .filter(|t| !t.is_revoked && t.expires_at > now)
            .map(|t| {
                t.is_revoked = true;
                t.revoked_at = Some(now);
                t.clone()
            }))
    }

    async fn revoke(&self, id: &RefreshTokenId, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.refresh_tokens.get_mut(id).filter(|t| !t.is_revoked) {
            Some(token) => {
                token.is_revoked = true;
                token.revoked_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_family(
        &self,
        user_id: &UserId,
        tenant_id: Option<&TenantId>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for token in state.refresh_tokens.values_mut() {
            if &token.user_id == user_id && token.tenant_id.as_ref() == tenant_id && !token.is_revoked {
                token.is_revoked = true;
                token.revoked_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn revoke_all_for_user(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for token in state.refresh_tokens.values_mut() {
            if &token.user_id == user_id && !token.is_revoked {
                token.is_revoked = true;
                token.revoked_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let initial = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, t| t.expires_at >= before);
        Ok((initial - state.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl PermissionRepository for MemoryStore {
    async fn permissions_for_role(&self, role: Role) -> Result<Vec<String>> {
        Ok(builtin_role_permissions(role).iter().map(|p| p.to_string()).collect())
    }
}

#[async_trait]
impl LoginAttemptRepository for MemoryStore {
    async fn active_lockout(
        &self,
        email: &str,
        tenant_slug: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.lock().await;
        Ok(state
            .lockouts
            .get(&(email.to_string(), tenant_slug.to_string()))
            .copied()
            .filter(|until| *until > now))
    }

    async fn record_success(&self, email: &str, tenant_slug: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.login_attempts.push(LoginAttempt {
            email: email.to_string(),
            tenant_slug: tenant_slug.to_string(),
            success: true,
            attempted_at: at,
        });
        state.lockouts.remove(&(email.to_string(), tenant_slug.to_string()));
        Ok(())
    }

    async fn record_failure(
        &self,
        email: &str,
        tenant_slug: &str,
        at: DateTime<Utc>,
        window_start: DateTime<Utc>,
        threshold: i64,
        locked_until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut state = self.state.lock().await;
        state.login_attempts.push(LoginAttempt {
            email: email.to_string(),
            tenant_slug: tenant_slug.to_string(),
            success: false,
            attempted_at: at,
        });

        let same_key = |a: &&LoginAttempt| a.email == email && a.tenant_slug == tenant_slug;
        let last_success = state
            .login_attempts
            .iter()
            .filter(same_key)
            .filter(|a| a.success)
            .map(|a| a.attempted_at)
            .max();
        let failures = state
            .login_attempts
            .iter()
            .filter(same_key)
            .filter(|a| !a.success && a.attempted_at >= window_start)
            .filter(|a| last_success.map_or(true, |s| a.attempted_at > s))
            .count() as i64;

        if failures < threshold {
            return Ok(None);
        }

        let key = (email.to_string(), tenant_slug.to_string());
        let until = match state.lockouts.get(&key) {
            Some(existing) if *existing > locked_until => *existing,
            _ => locked_until,
        };
        state.lockouts.insert(key, until);
        Ok(Some(until))
    }

    async fn clear_lockout(&self, email: &str, tenant_slug: &str) -> Result<()> {
        self.state.lock().await.lockouts.remove(&(email.to_string(), tenant_slug.to_string()));
        Ok(())
    }

    async fn purge_before(&self, before: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let attempts = state.login_attempts.len();
        state.login_attempts.retain(|a| a.attempted_at >= before);
        let lockouts = state.lockouts.len();
        state.lockouts.retain(|_, until| *until > now);
        Ok(((attempts - state.login_attempts.len()) + (lockouts - state.lockouts.len())) as u64)
    }
}

#[async_trait]
impl PasswordResetRepository for MemoryStore {
    async fn insert(&self, token: NewPasswordReset) -> Result<()> {
        let record = PasswordResetRecord {
            id: token.id,
            user_id: token.user_id,
            tenant_id: token.tenant_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            used_at: None,
            created_at: Utc::now(),
        };
        self.state.lock().await.password_resets.insert(record.id, record);
        Ok(())
    }

    async fn find_by_id(&self, id: &ResetTokenId) -> Result<Option<PasswordResetRecord>> {
        Ok(self.state.lock().await.password_resets.get(id).cloned())
    }

    async fn consume(&self, id: &ResetTokenId, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .password_resets
            .get_mut(id)
            .filter(|t| t.used_at.is_none() && t.expires_at > now)
        {
            Some(token) => {
                token.used_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate_for_user(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for token in state.password_resets.values_mut() {
            if &token.user_id == user_id && token.used_at.is_none() {
                token.used_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_stale(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let initial = state.password_resets.len();
        state
            .password_resets
            .retain(|_, t| t.expires_at >= before && t.used_at.map_or(true, |used| used >= before));
        Ok((initial - state.password_resets.len()) as u64)
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn create(&self, scope: &TenantScope, task: NewTask) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            id: task.id,
            tenant_id: scope.tenant_id(),
            title: task.title,
            status: task.status,
            assigned_to: task.assigned_to,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find(&self, scope: &TenantScope, id: &TaskId) -> Result<Option<Task>> {
        let state = self.state.lock().await;
        Ok(state.tasks.get(id).filter(|t| t.tenant_id == scope.tenant_id()).cloned())
    }

    async fn find_owner(&self, scope: &TenantScope, id: &TaskId) -> Result<Option<UserId>> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .get(id)
            .filter(|t| t.tenant_id == scope.tenant_id())
            .and_then(|t| t.assigned_to))
    }

    async fn list(&self, scope: &TenantScope, assigned_to: Option<&UserId>) -> Result<Vec<Task>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.tenant_id == scope.tenant_id())
            .filter(|t| assigned_to.map_or(true, |owner| t.assigned_to.as_ref() == Some(owner)))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn update(
        &self,
        scope: &TenantScope,
        id: &TaskId,
        update: &TaskUpdate,
    ) -> Result<Option<Task>> {
        let mut state = self.state.lock().await;
        Ok(state.tasks.get_mut(id).filter(|t| t.tenant_id == scope.tenant_id()).map(|task| {
            if let Some(title) = &update.title {
                task.title = title.clone();
            }
            if let Some(status) = &update.status {
                task.status = status.clone();
            }
            task.updated_at = Utc::now();
            task.clone()
        }))
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        self.state.lock().await.audit.push(event);
        Ok(())
    }
}

//! Role-based and ownership-scoped authorization.
//!
//! Permission names follow `resource:action[:scope]`:
//! - `products:read` - unscoped permission
//! - `tasks:update:all` - act on any resource of the tenant
//! - `tasks:update:own` - act only on resources assigned to the caller
//!
//! Checks are pure functions returning a [`Decision`]. The ownership check is
//! the only one that touches storage, through a caller-supplied owner lookup.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::auth::models::{AuthContext, Role};
use crate::domain::UserId;
use crate::errors::{AccessErrorType, Error, Result};

/// Ownership suffix of a permission name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionScope {
    Own,
    All,
}

/// Parsed permission name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub resource: String,
    pub action: String,
    pub scope: Option<PermissionScope>,
}

impl Permission {
    /// True when holding this permission requires an additional ownership check.
    pub fn requires_ownership(&self) -> bool {
        self.scope == Some(PermissionScope::Own)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)?;
        match self.scope {
            Some(PermissionScope::Own) => write!(f, ":own"),
            Some(PermissionScope::All) => write!(f, ":all"),
            None => Ok(()),
        }
    }
}

impl FromStr for Permission {
    type Err = Error;

    /// ```
    /// use tenantgate::auth::permissions::{Permission, PermissionScope};
    ///
    /// let permission: Permission = "tasks:update:own".parse().unwrap();
    /// assert_eq!(permission.resource, "tasks");
    /// assert_eq!(permission.scope, Some(PermissionScope::Own));
    /// assert!("tasks".parse::<Permission>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let valid_segment =
            |segment: &str| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_lowercase() || c == '_');

        let (resource, action, scope) = match parts.as_slice() {
            [resource, action] => (*resource, *action, None),
            [resource, action, "own"] => (*resource, *action, Some(PermissionScope::Own)),
            [resource, action, "all"] => (*resource, *action, Some(PermissionScope::All)),
            _ => return Err(Error::validation(format!("Invalid permission name '{}'", s))),
        };

        if !valid_segment(resource) || !valid_segment(action) {
            return Err(Error::validation(format!("Invalid permission name '{}'", s)));
        }

        Ok(Self { resource: resource.to_string(), action: action.to_string(), scope })
    }
}

/// Flattened set of permission names held by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    names: HashSet<String>,
}

impl PermissionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Sorted names, for responses and logs.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().cloned().collect();
        names.sort();
        names
    }
}

/// Why an authorization check failed. Messages name only the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    MissingPermission(String),
    MissingAnyOf(Vec<String>),
    MissingAllOf(Vec<String>),
    NotOwner(String),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::MissingPermission(name) => write!(f, "Missing required permission: {}", name),
            DenyReason::MissingAnyOf(names) => {
                write!(f, "Requires one of the permissions: {}", names.join(", "))
            }
            DenyReason::MissingAllOf(names) => {
                write!(f, "Requires all of the permissions: {}", names.join(", "))
            }
            DenyReason::NotOwner(name) => {
                write!(f, "Permission {} only applies to resources you own", name)
            }
        }
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert into a 403 error on denial.
    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                let error_type = match reason {
                    DenyReason::NotOwner(_) => AccessErrorType::OwnershipDenied,
                    _ => AccessErrorType::InsufficientPermission,
                };
                Err(Error::forbidden(reason.to_string(), error_type))
            }
        }
    }
}

pub fn require_permission(permissions: &PermissionSet, name: &str) -> Decision {
    if permissions.contains(name) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::MissingPermission(name.to_string()))
    }
}

pub fn require_any_permission(permissions: &PermissionSet, names: &[&str]) -> Decision {
    if names.iter().any(|name| permissions.contains(name)) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::MissingAnyOf(names.iter().map(|n| n.to_string()).collect()))
    }
}

pub fn require_all_permissions(permissions: &PermissionSet, names: &[&str]) -> Decision {
    if names.iter().all(|name| permissions.contains(name)) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::MissingAllOf(names.iter().map(|n| n.to_string()).collect()))
    }
}

/// `:all` grants unconditionally; `:own` grants only when the caller owns the resource.
///
/// `owner_lookup` must yield `None` both for a missing resource and for an
/// unowned one, so that a caller without blanket access learns nothing about
/// whether the resource exists. It is not invoked when `all_name` is held.
pub async fn require_permission_with_ownership<F, Fut>(
    context: &AuthContext,
    all_name: &str,
    own_name: &str,
    owner_lookup: F,
) -> Result<Decision>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<UserId>>>,
{
    if context.has_permission(all_name) {
        return Ok(Decision::Allow);
    }

    if !context.has_permission(own_name) {
        return Ok(Decision::Deny(DenyReason::MissingAnyOf(vec![
            all_name.to_string(),
            own_name.to_string(),
        ])));
    }

    match owner_lookup().await? {
        Some(owner) if owner == context.user_id() => Ok(Decision::Allow),
        _ => Ok(Decision::Deny(DenyReason::NotOwner(own_name.to_string()))),
    }
}

const MEMBER_PERMISSIONS: &[&str] = &[
    "leads:read:own",
    "leads:update:own",
    "tasks:read:own",
    "tasks:update:own",
    "products:read",
];

const MANAGER_PERMISSIONS: &[&str] = &[
    "leads:read:all",
    "leads:update:all",
    "leads:create",
    "tasks:read:all",
    "tasks:update:all",
    "tasks:create",
    "products:read",
];

const ADMIN_PERMISSIONS: &[&str] = &[
    "leads:read:all",
    "leads:update:all",
    "leads:create",
    "leads:delete",
    "tasks:read:all",
    "tasks:update:all",
    "tasks:create",
    "tasks:delete",
    "products:read",
    "products:manage",
    "users:read",
    "users:manage",
];

const OWNER_PERMISSIONS: &[&str] = &[
    "leads:read:all",
    "leads:update:all",
    "leads:create",
    "leads:delete",
    "tasks:read:all",
    "tasks:update:all",
    "tasks:create",
    "tasks:delete",
    "products:read",
    "products:manage",
    "users:read",
    "users:manage",
    "tenant:manage",
];

const SUPER_ADMIN_PERMISSIONS: &[&str] = &[
    "leads:read:all",
    "leads:update:all",
    "leads:create",
    "leads:delete",
    "tasks:read:all",
    "tasks:update:all",
    "tasks:create",
    "tasks:delete",
    "products:read",
    "products:manage",
    "users:read",
    "users:manage",
    "tenant:manage",
    "platform:manage",
];

/// Built-in catalog, mirrored by the seed migration.
pub fn builtin_role_permissions(role: Role) -> &'static [&'static str] {
    match role {
        Role::Owner => OWNER_PERMISSIONS,
        Role::Admin => ADMIN_PERMISSIONS,
        Role::Manager => MANAGER_PERMISSIONS,
        Role::Member => MEMBER_PERMISSIONS,
        Role::SuperAdmin => SUPER_ADMIN_PERMISSIONS,
    }
}

//! Authentication and authorization.
//!
//! Password hashing, access and refresh tokens, the session pipeline with its
//! tenant guard, permission checks, lockout and the login, password-reset and
//! cleanup services built on top of them.

pub mod cleanup_service;
pub mod hashing;
pub mod jwt;
pub mod lockout;
pub mod login_service;
pub mod middleware;
pub mod models;
pub mod password_reset;
pub mod permissions;
pub mod refresh;
pub mod session;
pub mod tenant_guard;
pub mod validation;

pub use hashing::{HashCost, PasswordHasher};
pub use jwt::{AccessClaims, AccessTokenIssuer};
pub use models::{AuthContext, RequestContext, Role, Tenant, User, UserProfile};
pub use permissions::{Decision, PermissionSet};

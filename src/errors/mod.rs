//! # Error Handling
//!
//! Crate-wide error type and the authentication/tenant/access taxonomy.

pub mod types;

pub use types::{AccessErrorType, AuthErrorType, Error, Result, TenantErrorType};

//! # Error Types
//!
//! Error taxonomy for the tenantgate service, built on `thiserror`.
//!
//! Authentication, tenant and access failures each carry a typed subkind so
//! that logs can record the precise reason while the HTTP layer renders only
//! what is safe to disclose.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tenantgate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Field-level detail is safe to return to the caller.
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// 401 family.
    #[error("Authentication error: {message}")]
    Auth { message: String, error_type: AuthErrorType },

    /// Tenant could not be resolved from the request.
    #[error("Tenant error: {message}")]
    Tenant { message: String, error_type: TenantErrorType },

    /// 403 family.
    #[error("Access denied: {message}")]
    Forbidden { message: String, error_type: AccessErrorType },

    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    #[error("Resource conflict: {message}")]
    Conflict { message: String, resource_type: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String, retry_after: Option<u64> },

    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Authentication failure subtypes.
///
/// `InvalidCredentials` and `AccountLocked` must render identically to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorType {
    AuthenticationRequired,
    InvalidCredentials,
    TokenExpired,
    TokenInvalid,
    TokenRevoked,
    AccountLocked,
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorType::AuthenticationRequired => write!(f, "authentication_required"),
            AuthErrorType::InvalidCredentials => write!(f, "invalid_credentials"),
            AuthErrorType::TokenExpired => write!(f, "token_expired"),
            AuthErrorType::TokenInvalid => write!(f, "token_invalid"),
            AuthErrorType::TokenRevoked => write!(f, "token_revoked"),
            AuthErrorType::AccountLocked => write!(f, "account_locked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantErrorType {
    /// No identifier supplied where one is mandatory (400).
    NotResolved,
    /// Identifier supplied but no active tenant matches (404).
    NotFound,
}

impl fmt::Display for TenantErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantErrorType::NotResolved => write!(f, "tenant_not_resolved"),
            TenantErrorType::NotFound => write!(f, "tenant_not_found"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessErrorType {
    /// Request named a tenant other than the caller's own.
    TenantAccessDenied,
    InsufficientPermission,
    OwnershipDenied,
}

impl fmt::Display for AccessErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessErrorType::TenantAccessDenied => write!(f, "tenant_access_denied"),
            AccessErrorType::InsufficientPermission => write!(f, "insufficient_permission"),
            AccessErrorType::OwnershipDenied => write!(f, "ownership_denied"),
        }
    }
}

impl Error {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn auth<S: Into<String>>(message: S, error_type: AuthErrorType) -> Self {
        Self::Auth { message: message.into(), error_type }
    }

    /// Generic login failure. Used for unknown users, bad passwords and locked accounts alike.
    pub fn invalid_credentials() -> Self {
        Self::auth("Invalid email or password", AuthErrorType::InvalidCredentials)
    }

    pub fn authentication_required() -> Self {
        Self::auth("Authentication required", AuthErrorType::AuthenticationRequired)
    }

    pub fn tenant<S: Into<String>>(message: S, error_type: TenantErrorType) -> Self {
        Self::Tenant { message: message.into(), error_type }
    }

    pub fn forbidden<S: Into<String>>(message: S, error_type: AccessErrorType) -> Self {
        Self::Forbidden { message: message.into(), error_type }
    }

    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    pub fn rate_limit<S: Into<String>>(message: S, retry_after: Option<u64>) -> Self {
        Self::RateLimit { message: message.into(), retry_after }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 500,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Serialization { .. } => 400,
            Error::Validation { .. } => 400,
            Error::Auth { .. } => 401,
            Error::Tenant { error_type: TenantErrorType::NotResolved, .. } => 400,
            Error::Tenant { error_type: TenantErrorType::NotFound, .. } => 404,
            Error::Forbidden { .. } => 403,
            Error::NotFound { .. } => 404,
            Error::Conflict { .. } => 409,
            Error::RateLimit { .. } => 429,
            Error::Internal { .. } => 500,
        }
    }

    /// Operational errors are expected failures whose message may reach the client.
    pub fn is_operational(&self) -> bool {
        !matches!(
            self,
            Error::Config { .. } | Error::Database { .. } | Error::Io { .. } | Error::Internal { .. }
        )
    }

    pub fn auth_error_type(&self) -> Option<AuthErrorType> {
        match self {
            Error::Auth { error_type, .. } => Some(*error_type),
            _ => None,
        }
    }

    pub fn access_error_type(&self) -> Option<AccessErrorType> {
        match self {
            Error::Forbidden { error_type, .. } => Some(*error_type),
            _ => None,
        }
    }

    /// True when the underlying database error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database { source, .. } => source
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .map(|code| code.as_ref() == "23505")
                .unwrap_or(false),
            Error::Conflict { .. } => true,
            _ => false,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let first_field = fields.first().map(|(field, _)| field.to_string());
        let message = fields
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::Validation { message: format!("Validation failed: {}", message), field: first_field }
    }
}

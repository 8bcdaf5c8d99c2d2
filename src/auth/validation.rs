//! Request DTOs for the auth and tenant administration endpoints, with
//! their validation rules.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::auth::models::Role;
use crate::domain::UserId;

lazy_static! {
    // Basic RFC 5322 compliant pattern
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .expect("EMAIL_REGEX should be a valid regex pattern");

    // Tenant slugs double as subdomain labels
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9](?:[a-z0-9-]{1,61}[a-z0-9])$")
        .expect("SLUG_REGEX should be a valid regex pattern");
}

const MIN_PASSWORD_LENGTH: usize = 8;

/// Upper bound keeps hashing cost bounded.
const MAX_PASSWORD_LENGTH: usize = 128;

const RESERVED_SLUGS: &[&str] = &["www", "api", "admin", "app", "auth", "public", "static"];

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.len() <= 254 && EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_email"))
    }
}

/// At least 8 and at most 128 characters, with an uppercase letter, a
/// lowercase letter, a digit and a special character.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::new("password_too_short"));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::new("password_too_long"));
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(ValidationError::new("password_missing_uppercase"));
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(ValidationError::new("password_missing_lowercase"));
    }

    if !password.chars().any(|c| c.is_numeric()) {
        return Err(ValidationError::new("password_missing_digit"));
    }

    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(ValidationError::new("password_missing_special"));
    }

    Ok(())
}

pub fn validate_tenant_slug(slug: &str) -> Result<(), ValidationError> {
    if !SLUG_REGEX.is_match(slug) {
        return Err(ValidationError::new("invalid_tenant_slug"));
    }
    if RESERVED_SLUGS.contains(&slug) {
        return Err(ValidationError::new("reserved_tenant_slug"));
    }
    Ok(())
}

pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("name_empty"));
    }
    if trimmed.len() > 255 {
        return Err(ValidationError::new("name_too_long"));
    }
    Ok(())
}

/// Canonical form used for lookups and lockout keys.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn normalize_slug(slug: &str) -> String {
    slug.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_display_name"))]
    pub company_name: String,
    #[validate(custom(function = "validate_tenant_slug"))]
    pub tenant_slug: String,
    #[validate(custom(function = "validate_display_name"))]
    pub name: String,
    #[validate(custom(function = "validate_email"))]
    pub email: String,
    #[validate(custom(function = "validate_password"))]
    #[schema(format = Password)]
    pub password: String,
}

/// Only the shape is checked here; strength rules would leak which
/// passwords can never match.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    #[schema(format = Password)]
    pub password: String,
    /// Absent for platform users
    #[serde(default)]
    pub tenant_slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 128))]
    #[schema(format = Password)]
    pub current_password: String,
    #[validate(custom(function = "validate_password"))]
    #[schema(format = Password)]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[serde(default)]
    pub tenant_slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetConfirmRequest {
    #[validate(length(min = 1, max = 512))]
    pub token: String,
    #[validate(custom(function = "validate_password"))]
    #[schema(format = Password)]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 32))]
    pub status: Option<String>,
    /// Defaults to the caller
    #[serde(default)]
    pub assigned_to: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 500))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub status: Option<String>,
}

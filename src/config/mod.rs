//! # Configuration Management
//!
//! Environment-driven configuration for the tenantgate service.

pub mod settings;

pub use settings::{
    AppConfig, AuthConfig, DatabaseConfig, Environment, LockoutConfig, ObservabilityConfig,
    ServerConfig, DEVELOPMENT_JWT_SECRET,
};

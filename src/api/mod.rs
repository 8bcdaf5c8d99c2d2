//! # REST API
//!
//! Axum router, handlers and HTTP-level concerns: error rendering, request
//! extractors, login rate limiting and the OpenAPI document.

pub mod docs;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, AppState};
pub use server::start_api_server;

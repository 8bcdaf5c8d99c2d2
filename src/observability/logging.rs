//! # Structured Logging
//!
//! Request span macro and startup logging built on the `tracing` ecosystem.
//! The span carries `tenant_id` and `user_id` slots that the session
//! pipeline fills in once identity is established.

/// Create a tracing span for an HTTP request.
///
/// ```rust,ignore
/// let span = request_span!("POST", "/auth/login");
/// span.record("tenant_id", tracing::field::display(&tenant_id));
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            tenant_id = tracing::field::Empty,
            user_id = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            tenant_id = tracing::field::Empty,
            user_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Log configuration at startup. Secrets are never logged.
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        environment = ?config.environment,
        server_address = %config.server.bind_address(),
        database_max_connections = config.database.max_connections,
        auto_migrate = config.database.auto_migrate,
        access_token_ttl_seconds = config.auth.access_token_ttl_seconds,
        refresh_token_ttl_days = config.auth.refresh_token_ttl_days,
        rotate_refresh_tokens = config.auth.rotate_refresh_tokens,
        allow_bearer_tokens = config.auth.allow_bearer_tokens,
        lockout_max_failures = config.lockout.max_failures,
        "tenantgate configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = request_span!("GET", "/auth/me");
        let _span = request_span!("POST", "/auth/login", client_ip = "127.0.0.1");
    }

    #[test]
    fn test_log_config_info() {
        let config = crate::config::AppConfig::default();
        log_config_info(&config);
    }
}

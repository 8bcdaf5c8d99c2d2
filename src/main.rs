use std::sync::Arc;
use std::time::Duration;

use tenantgate::{
    api::{start_api_server, AppState},
    auth::cleanup_service::CleanupService,
    config::AppConfig,
    observability::{init_tracing, log_config_info},
    services::LoggingEmailSender,
    storage::{create_pool, Repositories},
    Result, APP_NAME, VERSION,
};
use tracing::{error, info};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before any configuration is read; a missing file is fine
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env()?;
    config.validate()?;

    init_tracing(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting tenantgate");
    log_config_info(&config);

    let pool = create_pool(&config.database).await?;
    let repos = Repositories::from_pool(pool);

    let cleanup =
        CleanupService::new(repos.clone(), config.lockout.clone()).spawn(CLEANUP_INTERVAL);

    let state = AppState::build(config, repos, Arc::new(LoggingEmailSender))?;
    let result = start_api_server(state).await;

    cleanup.abort();
    if let Err(e) = &result {
        error!(error = %e, "API server terminated with an error");
    }
    info!("tenantgate shutdown completed");
    result
}

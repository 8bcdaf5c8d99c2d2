use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};

use super::routes::{build_router, AppState};

const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Bind the API listener and serve until ctrl-c.
pub async fn start_api_server(state: AppState) -> Result<()> {
    let bind = state.config.server.bind_address();
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| Error::config(format!("Invalid API address '{}': {}", bind, e)))?;

    let limiter = state.rate_limiter.clone();
    let pruner = tokio::spawn(async move {
        let mut ticker = interval(RATE_LIMIT_PRUNE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = limiter.prune().await;
            if removed > 0 {
                debug!(removed, "pruned idle rate limit buckets");
            }
        }
    });

    let router = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Starting HTTP API server");

    let served = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "API server shutdown listener failed");
            }
        })
        .await;

    pruner.abort();
    served.map_err(|e| Error::internal(format!("API server error: {}", e)))?;

    info!("API server shutdown completed");
    Ok(())
}

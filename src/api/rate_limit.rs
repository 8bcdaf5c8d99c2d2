//! Rate limiting for credential endpoints.
//!
//! Token bucket per client IP, applied to login, registration and
//! password-reset requests.
//!
//! # Configuration
//!
//! - `TENANTGATE_LOGIN_RATE_LIMIT_PER_MINUTE`: requests per minute per client (default: 20)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::extractors::client_info;
use crate::errors::Error;

/// Token bucket for rate limiting.
#[derive(Debug, Clone)]
struct TokenBucket {
    /// Current number of tokens available
    tokens: f64,
    max_tokens: f64,
    last_refill: Instant,
    /// Tokens per second
    refill_rate_per_sec: f64,
}

impl TokenBucket {
    fn new(max_tokens: u32, refill_period: Duration) -> Self {
        let refill_rate_per_sec = max_tokens as f64 / refill_period.as_secs_f64();
        Self {
            tokens: max_tokens as f64,
            max_tokens: max_tokens as f64,
            last_refill: Instant::now(),
            refill_rate_per_sec,
        }
    }

    /// Returns `Err(retry_after_secs)` when empty.
    fn try_consume(&mut self) -> Result<(), u64> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate_per_sec).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let seconds_until_refill = (1.0 - self.tokens) / self.refill_rate_per_sec;
            Err(seconds_until_refill.ceil().max(1.0) as u64)
        }
    }

    fn is_full(&self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens + elapsed * self.refill_rate_per_sec >= self.max_tokens
    }
}

/// Keyed token-bucket limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
    max_tokens: u32,
    refill_period: Duration,
}

impl RateLimiter {
    pub fn new(max_tokens: u32, refill_period: Duration) -> Self {
        Self { buckets: Arc::new(Mutex::new(HashMap::new())), max_tokens, refill_period }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests.max(1), Duration::from_secs(60))
    }

    /// `Err(retry_after_secs)` when `key` is over its limit.
    pub async fn check_rate_limit(&self, key: &str) -> Result<(), u64> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.max_tokens, self.refill_period));

        match bucket.try_consume() {
            Ok(()) => {
                debug!(key = %key, remaining_tokens = bucket.tokens as u32, "Rate limit check passed");
                Ok(())
            }
            Err(retry_after) => {
                warn!(key = %key, retry_after_seconds = retry_after, "Rate limit exceeded");
                Err(retry_after)
            }
        }
    }

    /// Drop buckets that have fully refilled.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_full(now));
        before - buckets.len()
    }
}

/// Middleware limiting requests per client IP.
pub async fn limit_by_client(
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_info(request.headers(), request.extensions());
    let key = client.ip_address.unwrap_or_else(|| "unknown".to_string());

    limiter.check_rate_limit(&key).await.map_err(|retry_after| {
        ApiError::from(Error::rate_limit("Too many requests, try again later", Some(retry_after)))
    })?;
    Ok(next.run(request).await)
}

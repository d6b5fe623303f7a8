//! # Per-Client Rate Limiting
//!
//! Fixed-window request counter keyed by client address. Code issuance is
//! limited separately and more tightly, since every allowed request there
//! sends an email. The client key comes from a header the caller controls, so
//! the OTP service also keeps a bucket per recipient address.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::error::{ErrorBody, ErrorDetail};
use crate::middleware::metrics::ApiMetrics;

/// Download code requests.
pub const OTP_REQUEST_PATH: &str = "/v1/downloads/request-otp";
/// Password-reset code requests.
pub const PASSWORD_RESET_REQUEST_PATH: &str = "/v1/users/password-reset/request";
/// Paths whose requests share the per-client code budget.
pub const CODE_ISSUING_PATHS: [&str; 2] = [OTP_REQUEST_PATH, PASSWORD_RESET_REQUEST_PATH];

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Maximum code issuance requests per window.
    pub max_otp_requests: u64,
    /// Window duration in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            max_otp_requests: 5,
            window_secs: 60,
        }
    }
}

/// Per-key rate limit state.
#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check if a request from the given key should be allowed.
    pub fn check(&self, key: &str, limit: u64) -> bool {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);

        // Stale buckets are dropped so the map stays bounded by active clients.
        if buckets.len() > 10_000 {
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= limit {
            false
        } else {
            bucket.count += 1;
            true
        }
    }
}

/// First hop of `X-Forwarded-For`, else `"anonymous"`.
fn client_key(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

/// Middleware that enforces per-client rate limits.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        let client = client_key(&request);
        let (key, limit) = if CODE_ISSUING_PATHS.contains(&request.uri().path()) {
            (format!("otp:{client}"), limiter.config.max_otp_requests)
        } else {
            (client, limiter.config.max_requests)
        };

        if !limiter.check(&key, limit) {
            tracing::warn!(key = %key, "rate limit exceeded");
            if let Some(metrics) = request.extensions().get::<ApiMetrics>() {
                metrics
                    .rate_limited_count
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            let body = ErrorBody {
                error: ErrorDetail {
                    code: "RATE_LIMITED".to_string(),
                    message: "rate limit exceeded".to_string(),
                    details: None,
                },
            };
            return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        }
    }

    next.run(request).await
}

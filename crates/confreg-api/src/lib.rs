//! # confreg-api -- Axum API Service for Conference Registration
//!
//! Registration and login, server-priced gateway orders, idempotent payment
//! recording from the client and from signed webhooks, and OTP-gated
//! downloads behind an admin-managed allow-list. Authors submit abstracts
//! and full papers for review; attendees request invitation letters.
//!
//! ## API Surface
//!
//! | Prefix                       | Module                  | Auth         |
//! |------------------------------|-------------------------|--------------|
//! | `/v1/fees/*`                 | [`routes::fees`]        | public       |
//! | `/v1/users/register`, login, password reset | [`routes::users`] | public |
//! | `/v1/users/*`                | [`routes::users`]       | bearer       |
//! | `/v1/users/:uid/invitation*` | [`routes::invitations`] | bearer       |
//! | `/v1/payments/*`             | [`routes::payments`]    | bearer       |
//! | `/v1/abstracts/*`            | [`routes::abstracts`]   | bearer       |
//! | `/v1/papers/*`               | [`routes::papers`]      | bearer       |
//! | `/v1/queries`                | [`routes::queries`]     | public       |
//! | `/v1/webhooks/*`             | [`routes::webhooks`]    | HMAC         |
//! | `/v1/downloads/*`            | [`routes::downloads`]   | allow-list + OTP |
//! | `/v1/downloads/admin/*`      | [`routes::admin`]       | bearer, admin |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → RateLimitMiddleware → [AuthMiddleware] → Handler
//! ```
//!
//! Auth runs only on the protected routes.
//!
//! ## OpenAPI
//!
//! Generated with utoipa at `/openapi.json`.

pub mod auth;
pub mod config;
pub mod db;
pub mod effects;
pub mod error;
pub mod extractors;
pub mod mailer;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod sheets;
pub mod state;
pub mod storage;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside every layer so they
/// remain accessible without credentials and are never rate limited.
pub fn app(state: AppState) -> Router {
    app_with_limits(state, RateLimitConfig::default())
}

/// [`app`] with an explicit rate limit configuration.
pub fn app_with_limits(state: AppState, limits: RateLimitConfig) -> Router {
    let auth_config = AuthConfig {
        jwt_secret: state.config.jwt_secret.clone(),
    };
    let metrics = ApiMetrics::new();
    let limiter = RateLimiter::new(limits);

    // Bearer token required.
    let protected = Router::new()
        .merge(routes::users::router())
        .merge(routes::payments::router())
        .merge(routes::invitations::router())
        .merge(routes::abstracts::router(state.config.max_upload_bytes))
        .merge(routes::papers::router(state.config.max_upload_bytes))
        .merge(routes::admin::router(state.config.max_upload_bytes))
        .route_layer(from_fn(auth::auth_middleware));

    let api = Router::new()
        .merge(routes::fees::public_router())
        .merge(routes::users::public_router())
        .merge(routes::webhooks::public_router())
        .merge(routes::downloads::public_router())
        .merge(routes::queries::public_router())
        .merge(openapi::router())
        .merge(middleware::metrics::router())
        .merge(protected)
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(metrics))
        .layer(axum::Extension(limiter))
        .with_state(state.clone());

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .with_state(state);

    Router::new().merge(health).merge(api)
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 503 while a configured database is unreachable.
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!(error = %e, "readiness check: database unreachable");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable");
        }
    }
    (StatusCode::OK, "ready")
}

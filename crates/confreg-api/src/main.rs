//! # confreg-api -- Binary Entry Point
//!
//! Loads configuration from the environment, connects the optional
//! database, hydrates the in-memory stores, starts the expiry sweeper and
//! serves the API.

use confreg_api::config::AppConfig;
use confreg_api::services::otp;
use confreg_api::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured tracing. LOG_FORMAT=json switches to JSON lines.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Configuration invalid: {e}");
        e
    })?;
    let port = config.port;
    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET not set: authentication disabled (development mode)");
    }

    // Initialize database pool (optional; absent means in-memory only).
    let db_pool = confreg_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let state = AppState::with_config(config)
        .map_err(|e| {
            tracing::error!("Failed to build application state: {e}");
            e
        })?
        .with_db_pool(db_pool);

    // Hydrate in-memory stores from database (if connected).
    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        e
    })?;

    let _sweeper = otp::spawn_sweeper(state.clone(), otp::SWEEP_INTERVAL);

    let app = confreg_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Registration API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

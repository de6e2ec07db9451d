//! API Server Module
//!
//! Provides the application state and server startup logic.

use std::sync::Arc;
use tracing::info;

use super::middleware::{RateLimitConfig, RateLimitState, RateLimiter};
use super::routes::create_router;
use crate::common::config::RedeemConfig;
use crate::redemption::RedemptionService;

/// Combined application state for all API endpoints
pub struct AppState {
    /// Redemption service
    pub service: Arc<RedemptionService>,
    /// Per-client rate limiter
    pub limiter: RateLimitState,
}

/// Shared application state type
pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub fn new(service: Arc<RedemptionService>, rate_limit: RateLimitConfig) -> SharedAppState {
        Arc::new(Self {
            service,
            limiter: Arc::new(RateLimiter::new(rate_limit)),
        })
    }

    pub fn from_config(service: Arc<RedemptionService>, config: &RedeemConfig) -> SharedAppState {
        Self::new(
            service,
            RateLimitConfig::per_minute(config.rate_limit_per_minute),
        )
    }
}

/// Start the API server
pub async fn start_server(state: SharedAppState, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "redemption API listening");
    info!("  POST /api/decode            - Decode a token");
    info!("  POST /api/redeem            - Redeem a token to a Lightning address");
    info!("  POST /api/validate-address  - Check a Lightning address");
    info!("  POST /api/check-spendable   - Ask the mint about a token");
    info!("  GET  /api/redemption/:id    - Redemption status");
    info!("  GET  /api/health            - Health check");
    info!("  GET  /api/stats             - Ledger statistics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

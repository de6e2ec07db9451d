//! API Routes Module
//!
//! Contains route handlers organized by domain:
//! - health: Health check and monitoring endpoints
//! - redemption: Token decode, redeem, address and status endpoints

pub mod health;
pub mod redemption;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::middleware::{
    rate_limit_middleware, request_logging_middleware, security_headers_middleware,
};
use super::server::SharedAppState;

/// Create the API router with all endpoints
pub fn create_router(state: SharedAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Everything that reaches a mint or provider is rate limited
    let limited = Router::new()
        .route("/api/decode", post(redemption::handle_decode))
        .route("/api/redeem", post(redemption::handle_redeem))
        .route("/api/validate-address", post(redemption::handle_validate_address))
        .route("/api/check-spendable", post(redemption::handle_check_spendable))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/api/health", get(health::handle_health))
        .route("/api/stats", get(health::handle_stats))
        .route("/api/redemption/:id", get(redemption::handle_status))
        .merge(limited)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(cors)
        .with_state(state)
}

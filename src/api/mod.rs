//! API Layer Module
//!
//! HTTP server, routes and middleware for the redemption service.

pub mod middleware;
pub mod routes;
pub mod server;

// Re-exports for convenience
pub use middleware::{ApiError, RateLimitConfig, RateLimitState, RateLimiter};
pub use routes::create_router;
pub use server::{start_server, AppState, SharedAppState};

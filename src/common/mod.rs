//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the redemption service.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - The redemption error taxonomy

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, RedeemConfig};
pub use error::{ErrorKind, RedeemError, Result};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_api_request, log_api_response,
    log_redemption_event, log_security_event, EventCategory, LogEvent, LogLevel, LoggingError,
};

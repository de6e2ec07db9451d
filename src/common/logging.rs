//! Structured Logging for lnredeem
//!
//! Provides structured logging with:
//! - JSON output for log aggregation
//! - Correlation IDs for request tracing
//! - Redemption lifecycle and security event records
//!
//! # Usage
//!
//! ```rust,ignore
//! use lnredeem::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?;
//! tracing::info!(target: "lnredeem::api", attempt_id = %id, "redeeming token");
//! ```

use serde::Serialize;
use tracing::Level;

use crate::types::{RedemptionAttempt, RedemptionState};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// ============================================================================
// Structured Events
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Api,
    Redemption,
    /// Rate limiting and allow-list rejections
    Security,
}

/// One JSON line in the event stream
#[derive(Debug, Serialize)]
pub struct LogEvent<'a> {
    pub timestamp: String,
    pub category: EventCategory,
    pub event: &'a str,
    /// Request correlation ID, or the attempt ID for redemption events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<&'a str>,
    pub data: serde_json::Value,
}

impl<'a> LogEvent<'a> {
    pub fn new(
        category: EventCategory,
        event: &'a str,
        correlation_id: Option<&'a str>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            category,
            event,
            correlation_id,
            data,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"event\":{:?},\"unserializable\":{:?}}}", self.event, e.to_string()))
    }
}

fn emit(level: Level, event: &LogEvent<'_>) {
    let line = event.to_json();
    match level {
        Level::ERROR => tracing::error!(target: "lnredeem::events", category = ?event.category, "{}", line),
        Level::WARN => tracing::warn!(target: "lnredeem::events", category = ?event.category, "{}", line),
        _ => tracing::info!(target: "lnredeem::events", category = ?event.category, "{}", line),
    }
}

/// Rate limiting, duplicate and allow-list rejections
pub fn log_security_event(
    event_type: &str,
    allowed: bool,
    details: serde_json::Value,
    correlation_id: Option<&str>,
) {
    let event = LogEvent::new(
        EventCategory::Security,
        event_type,
        correlation_id,
        serde_json::json!({ "allowed": allowed, "details": details }),
    );
    emit(if allowed { Level::INFO } else { Level::WARN }, &event);
}

pub fn log_api_request(method: &str, path: &str, client_ip: Option<&str>, correlation_id: &str) {
    let event = LogEvent::new(
        EventCategory::Api,
        "request",
        Some(correlation_id),
        serde_json::json!({ "method": method, "path": path, "client_ip": client_ip }),
    );
    emit(Level::INFO, &event);
}

pub fn log_api_response(
    method: &str,
    path: &str,
    status: u16,
    duration_ms: u64,
    correlation_id: &str,
) {
    let level = match status {
        500.. => Level::ERROR,
        400..=499 => Level::WARN,
        _ => Level::INFO,
    };
    let event = LogEvent::new(
        EventCategory::Api,
        "response",
        Some(correlation_id),
        serde_json::json!({
            "method": method,
            "path": path,
            "status": status,
            "duration_ms": duration_ms
        }),
    );
    emit(level, &event);
}

/// Event name for where an attempt ended up
pub fn redemption_event_name(attempt: &RedemptionAttempt) -> &'static str {
    match attempt.state {
        RedemptionState::Paid => "redemption_paid",
        RedemptionState::Failed => "redemption_failed",
        _ => "redemption_unsettled",
    }
}

/// Record how a redemption call left its attempt
pub fn log_redemption_event(attempt: &RedemptionAttempt) {
    let level = match attempt.state {
        RedemptionState::Paid => Level::INFO,
        RedemptionState::Failed => Level::ERROR,
        _ => Level::WARN,
    };
    let event = LogEvent::new(
        EventCategory::Redemption,
        redemption_event_name(attempt),
        Some(&attempt.id),
        serde_json::json!({
            "mint": attempt.mint_url,
            "amount": attempt.declared_amount,
            "destination": attempt.target_address,
            "actual_fee": attempt.actual_fee,
            "settled": attempt.settled_amount,
            "error": attempt.error,
        }),
    );
    emit(level, &event);
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Minimum log level to output
/// * `json_format` - Use JSON format (recommended for production)
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_filter();
        EnvFilter::new(format!(
            "lnredeem={},tower_http={},axum={}",
            level, level, level
        ))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from RedeemConfig
pub fn init_from_config(config: &super::config::RedeemConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::from(config.log_level.as_str()), config.log_json)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}

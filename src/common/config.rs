//! Environment-based Configuration for lnredeem
//!
//! Configuration is injected at startup; the redemption core never reads the
//! environment itself.
//!
//! # Environment Variables
//!
//! - `LNREDEEM_ALLOWED_DOMAINS` - Comma-separated domains, or "*" (default: "*")
//! - `LNREDEEM_DEFAULT_ADDRESS` - Destination used when a request names none
//! - `LNREDEEM_RATE_LIMIT` - Requests per minute per client (default: 30)
//! - `LNREDEEM_PORT` - REST API port (default: 3001)
//! - `LNREDEEM_HTTP_TIMEOUT_SECS` - Outbound call timeout (default: 10)
//! - `LNREDEEM_MELT_TIMEOUT_SECS` - Melt submission timeout (default: 300)
//! - `LNREDEEM_RETENTION_HOURS` - Ledger sweep horizon (default: 24)
//! - `LNREDEEM_SWEEP_INTERVAL_SECS` - Ledger sweep period (default: 3600)
//! - `LNREDEEM_INVOICE_COMMENT` - Comment attached to invoice requests
//! - `LNREDEEM_LOG_LEVEL` - Logging level (debug, info, warn, error)
//! - `LNREDEEM_LOG_JSON` - Set to "1" for JSON log output

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::address::{parse_address, DomainAllowList};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("invalid default address {0}: {1}")]
    InvalidDefaultAddress(String, String),
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct RedeemConfig {
    /// Lightning address domains that may receive payments
    pub allowed_domains: DomainAllowList,

    /// Destination used when the caller supplies none
    pub default_address: Option<String>,

    /// Requests per minute per client
    pub rate_limit_per_minute: u32,

    /// REST API port
    pub port: u16,

    /// Timeout applied to every outbound HTTP call except melt
    pub http_timeout: Duration,

    /// Melt waits on a Lightning payment, so it gets a longer bound
    pub melt_timeout: Duration,

    /// Terminal attempts older than this are swept
    pub retention: Duration,

    /// How often the sweeper runs
    pub sweep_interval: Duration,

    /// Comment attached to invoice requests when the provider accepts one
    pub invoice_comment: Option<String>,

    /// Log level
    pub log_level: String,

    /// Emit JSON logs
    pub log_json: bool,
}

impl Default for RedeemConfig {
    fn default() -> Self {
        Self {
            allowed_domains: DomainAllowList::All,
            default_address: None,
            rate_limit_per_minute: 30,
            port: 3001,
            http_timeout: Duration::from_secs(10),
            melt_timeout: Duration::from_secs(300),
            retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
            invoice_comment: Some("ecash redemption".to_string()),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl RedeemConfig {
    /// Load configuration from `.env` and environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let allowed_domains = lookup("LNREDEEM_ALLOWED_DOMAINS")
            .map(|v| DomainAllowList::parse(&v))
            .unwrap_or(defaults.allowed_domains);

        let default_address = match lookup("LNREDEEM_DEFAULT_ADDRESS") {
            Some(addr) if !addr.trim().is_empty() => {
                let addr = addr.trim().to_string();
                let parsed = parse_address(&addr)
                    .map_err(|e| ConfigError::InvalidDefaultAddress(addr.clone(), e.to_string()))?;
                allowed_domains.check(&parsed.domain).map_err(|e| {
                    ConfigError::InvalidDefaultAddress(addr.clone(), e.to_string())
                })?;
                Some(addr)
            }
            _ => None,
        };

        let rate_limit_per_minute =
            parse_or("LNREDEEM_RATE_LIMIT", &lookup, defaults.rate_limit_per_minute)?;
        let port = parse_or("LNREDEEM_PORT", &lookup, defaults.port)?;

        let timeout_secs: u64 = parse_or("LNREDEEM_HTTP_TIMEOUT_SECS", &lookup, 10)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "LNREDEEM_HTTP_TIMEOUT_SECS".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let melt_secs: u64 = parse_or("LNREDEEM_MELT_TIMEOUT_SECS", &lookup, timeout_secs.max(300))?;
        if melt_secs < timeout_secs {
            return Err(ConfigError::InvalidValue(
                "LNREDEEM_MELT_TIMEOUT_SECS".to_string(),
                format!("must be at least LNREDEEM_HTTP_TIMEOUT_SECS ({})", timeout_secs),
            ));
        }

        let retention_hours: u64 = parse_or("LNREDEEM_RETENTION_HOURS", &lookup, 24)?;
        let sweep_secs: u64 = parse_or("LNREDEEM_SWEEP_INTERVAL_SECS", &lookup, 3600)?;
        if sweep_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "LNREDEEM_SWEEP_INTERVAL_SECS".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let invoice_comment = match lookup("LNREDEEM_INVOICE_COMMENT") {
            Some(c) if c.trim().is_empty() => None,
            Some(c) => Some(c),
            None => defaults.invoice_comment,
        };

        let log_level = lookup("LNREDEEM_LOG_LEVEL").unwrap_or(defaults.log_level);
        let log_json = lookup("LNREDEEM_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            allowed_domains,
            default_address,
            rate_limit_per_minute,
            port,
            http_timeout: Duration::from_secs(timeout_secs),
            melt_timeout: Duration::from_secs(melt_secs),
            retention: Duration::from_secs(retention_hours * 60 * 60),
            sweep_interval: Duration::from_secs(sweep_secs),
            invoice_comment,
            log_level,
            log_json,
        })
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!(
            target: "lnredeem::config",
            allowed_domains = %self.allowed_domains,
            default_address = self.default_address.as_deref().unwrap_or("<none>"),
            rate_limit_per_minute = self.rate_limit_per_minute,
            port = self.port,
            http_timeout_secs = self.http_timeout.as_secs(),
            melt_timeout_secs = self.melt_timeout.as_secs(),
            retention_hours = self.retention.as_secs() / 3600,
            "configuration loaded"
        );
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw.clone())),
        None => Ok(default),
    }
}

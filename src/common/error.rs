//! Redemption Error Taxonomy
//!
//! Every failure a redemption can end in maps onto exactly one [`ErrorKind`].
//! Validation-class kinds are detected before any external call; the rest
//! originate from the mint or the Lightning address provider.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure category surfaced to callers and stored on attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidFormat,
    DecodeFailure,
    EmptyValue,
    InsufficientValue,
    AlreadyRedeemed,
    AlreadySpent,
    DomainNotAllowed,
    InvalidAddressFormat,
    EndpointUnreachable,
    MalformedResponse,
    AmountOutOfRange,
    InvoiceEndpointError,
    SettlementAmbiguous,
    TransientNetworkError,
}

impl ErrorKind {
    /// Stable code used in API responses and logs
    pub fn as_code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "INVALID_FORMAT",
            ErrorKind::DecodeFailure => "DECODE_FAILURE",
            ErrorKind::EmptyValue => "EMPTY_VALUE",
            ErrorKind::InsufficientValue => "INSUFFICIENT_VALUE",
            ErrorKind::AlreadyRedeemed => "ALREADY_REDEEMED",
            ErrorKind::AlreadySpent => "ALREADY_SPENT",
            ErrorKind::DomainNotAllowed => "DOMAIN_NOT_ALLOWED",
            ErrorKind::InvalidAddressFormat => "INVALID_ADDRESS_FORMAT",
            ErrorKind::EndpointUnreachable => "ENDPOINT_UNREACHABLE",
            ErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorKind::AmountOutOfRange => "AMOUNT_OUT_OF_RANGE",
            ErrorKind::InvoiceEndpointError => "INVOICE_ENDPOINT_ERROR",
            ErrorKind::SettlementAmbiguous => "SETTLEMENT_AMBIGUOUS",
            ErrorKind::TransientNetworkError => "TRANSIENT_NETWORK_ERROR",
        }
    }

    /// Validation-class kinds never involve a network call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidFormat
                | ErrorKind::DecodeFailure
                | ErrorKind::EmptyValue
                | ErrorKind::InsufficientValue
                | ErrorKind::AlreadyRedeemed
                | ErrorKind::AlreadySpent
                | ErrorKind::DomainNotAllowed
                | ErrorKind::InvalidAddressFormat
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Root error type for redemption operations
#[derive(Debug, Clone, Error)]
pub enum RedeemError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("token decode failed: {0}")]
    DecodeFailure(String),

    #[error("token carries no value: {0}")]
    EmptyValue(String),

    #[error("insufficient value: {0}")]
    InsufficientValue(String),

    #[error("token already redeemed: {0}")]
    AlreadyRedeemed(String),

    #[error("token already spent: {0}")]
    AlreadySpent(String),

    #[error("domain not allowed: {0}")]
    DomainNotAllowed(String),

    #[error("invalid lightning address: {0}")]
    InvalidAddressFormat(String),

    #[error("endpoint unreachable: {0}")]
    EndpointUnreachable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("amount out of range: {0}")]
    AmountOutOfRange(String),

    #[error("invoice endpoint error: {0}")]
    InvoiceEndpointError(String),

    #[error("settlement ambiguous: {0}")]
    SettlementAmbiguous(String),

    #[error("transient network error: {0}")]
    TransientNetworkError(String),
}

impl RedeemError {
    /// Build an error of the given kind
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match kind {
            ErrorKind::InvalidFormat => Self::InvalidFormat(msg),
            ErrorKind::DecodeFailure => Self::DecodeFailure(msg),
            ErrorKind::EmptyValue => Self::EmptyValue(msg),
            ErrorKind::InsufficientValue => Self::InsufficientValue(msg),
            ErrorKind::AlreadyRedeemed => Self::AlreadyRedeemed(msg),
            ErrorKind::AlreadySpent => Self::AlreadySpent(msg),
            ErrorKind::DomainNotAllowed => Self::DomainNotAllowed(msg),
            ErrorKind::InvalidAddressFormat => Self::InvalidAddressFormat(msg),
            ErrorKind::EndpointUnreachable => Self::EndpointUnreachable(msg),
            ErrorKind::MalformedResponse => Self::MalformedResponse(msg),
            ErrorKind::AmountOutOfRange => Self::AmountOutOfRange(msg),
            ErrorKind::InvoiceEndpointError => Self::InvoiceEndpointError(msg),
            ErrorKind::SettlementAmbiguous => Self::SettlementAmbiguous(msg),
            ErrorKind::TransientNetworkError => Self::TransientNetworkError(msg),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Self::DecodeFailure(_) => ErrorKind::DecodeFailure,
            Self::EmptyValue(_) => ErrorKind::EmptyValue,
            Self::InsufficientValue(_) => ErrorKind::InsufficientValue,
            Self::AlreadyRedeemed(_) => ErrorKind::AlreadyRedeemed,
            Self::AlreadySpent(_) => ErrorKind::AlreadySpent,
            Self::DomainNotAllowed(_) => ErrorKind::DomainNotAllowed,
            Self::InvalidAddressFormat(_) => ErrorKind::InvalidAddressFormat,
            Self::EndpointUnreachable(_) => ErrorKind::EndpointUnreachable,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::AmountOutOfRange(_) => ErrorKind::AmountOutOfRange,
            Self::InvoiceEndpointError(_) => ErrorKind::InvoiceEndpointError,
            Self::SettlementAmbiguous(_) => ErrorKind::SettlementAmbiguous,
            Self::TransientNetworkError(_) => ErrorKind::TransientNetworkError,
        }
    }

    /// The message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidFormat(m)
            | Self::DecodeFailure(m)
            | Self::EmptyValue(m)
            | Self::InsufficientValue(m)
            | Self::AlreadyRedeemed(m)
            | Self::AlreadySpent(m)
            | Self::DomainNotAllowed(m)
            | Self::InvalidAddressFormat(m)
            | Self::EndpointUnreachable(m)
            | Self::MalformedResponse(m)
            | Self::AmountOutOfRange(m)
            | Self::InvoiceEndpointError(m)
            | Self::SettlementAmbiguous(m)
            | Self::TransientNetworkError(m) => m,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        self.kind().as_code()
    }

    pub fn is_validation(&self) -> bool {
        self.kind().is_validation()
    }

    /// Whether a caller may reasonably retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EndpointUnreachable | ErrorKind::TransientNetworkError
        )
    }
}

/// Result type alias using RedeemError
pub type Result<T> = std::result::Result<T, RedeemError>;

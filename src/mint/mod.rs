//! Mint Client
//!
//! The capability boundary to the token's issuing mint. The redemption core
//! only sees the [`MintClient`] trait; [`HttpMintClient`] speaks the mint's
//! REST API and [`MintCache`] memoizes per-endpoint connectivity checks.
//!
//! Every mint failure is mapped to an [`ErrorKind`] by [`classify_mint_error`],
//! the single place where mint-specific wording is interpreted.

pub mod cache;
pub mod curve;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::error::{ErrorKind, RedeemError};
use crate::token::Proof;

pub use cache::MintCache;
pub use http::HttpMintClient;

/// Mint error codes with a fixed meaning
pub const CODE_TOKEN_ALREADY_SPENT: u64 = 11001;
pub const CODE_TRANSACTION_UNBALANCED: u64 = 11002;
pub const CODE_AMOUNT_OUTSIDE_LIMIT: u64 = 11006;
pub const CODE_QUOTE_PENDING: u64 = 20005;
pub const CODE_INVOICE_ALREADY_PAID: u64 = 20006;

/// Mint client errors
#[derive(Debug, Clone, Error)]
pub enum MintError {
    #[error("mint request timed out: {0}")]
    Timeout(String),

    #[error("mint unreachable: {0}")]
    Unreachable(String),

    /// The request left this process but no usable response came back
    #[error("mint connection lost mid-request: {0}")]
    Interrupted(String),

    #[error("operation not supported by mint: {0}")]
    Unsupported(String),

    #[error("mint rejected request (HTTP {status}): {detail}")]
    Rejected {
        status: u16,
        code: Option<u64>,
        detail: String,
    },

    #[error("malformed mint response: {0}")]
    Malformed(String),
}

impl MintError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, MintError::Unsupported(_))
    }

    /// Whether the mint may have acted on the request anyway
    ///
    /// For a melt this means the payment can still be in flight.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, MintError::Timeout(_) | MintError::Interrupted(_))
    }

    /// Convert into the redemption taxonomy, keeping the mint's message
    pub fn into_redeem_error(self) -> RedeemError {
        let kind = classify_mint_error(&self);
        RedeemError::new(kind, self.to_string())
    }
}

/// Map a mint failure to an error kind
///
/// Structured signals (transport class, error code, HTTP status) are
/// consulted first; substring matching on the mint's detail text is the
/// last resort.
pub fn classify_mint_error(err: &MintError) -> ErrorKind {
    match err {
        MintError::Timeout(_) | MintError::Interrupted(_) => ErrorKind::TransientNetworkError,
        MintError::Unreachable(_) => ErrorKind::EndpointUnreachable,
        MintError::Unsupported(_) | MintError::Malformed(_) => ErrorKind::MalformedResponse,
        MintError::Rejected {
            status,
            code,
            detail,
        } => {
            match code {
                Some(CODE_TOKEN_ALREADY_SPENT) => return ErrorKind::AlreadySpent,
                Some(CODE_TRANSACTION_UNBALANCED) | Some(CODE_AMOUNT_OUTSIDE_LIMIT) => {
                    return ErrorKind::InsufficientValue
                }
                Some(CODE_INVOICE_ALREADY_PAID) => return ErrorKind::InvoiceEndpointError,
                Some(CODE_QUOTE_PENDING) => return ErrorKind::SettlementAmbiguous,
                _ => {}
            }

            if let Some(kind) = classify_detail(detail) {
                return kind;
            }

            // Unrecognized rejections never settled anything
            tracing::debug!(status = *status, detail = %detail, "unrecognized mint rejection");
            ErrorKind::TransientNetworkError
        }
    }
}

fn classify_detail(detail: &str) -> Option<ErrorKind> {
    let detail = detail.to_lowercase();
    const SPENT: [&str; 4] = ["already spent", "token spent", "proofs spent", "already used"];
    const SHORT: [&str; 4] = ["insufficient", "not enough", "unbalanced", "inputs do not cover"];

    if SPENT.iter().any(|s| detail.contains(s)) {
        Some(ErrorKind::AlreadySpent)
    } else if SHORT.iter().any(|s| detail.contains(s)) {
        Some(ErrorKind::InsufficientValue)
    } else {
        None
    }
}

/// Mint identity as reported by its info endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub pubkey: Option<String>,
}

/// Quote for paying an invoice out of token value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuote {
    pub quote_id: String,
    /// Amount the mint will pay out, in token units
    pub amount: u64,
    /// Maximum routing fee the mint reserves
    pub fee_reserve: u64,
    pub state: Option<String>,
    pub expiry: Option<u64>,
}

/// Normalized melt response
///
/// Mints populate different subsets of these fields; settlement is decided
/// by `redemption::settlement`, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltResult {
    pub paid: Option<bool>,
    pub payment_proof: Option<String>,
    pub state: Option<String>,
    /// Fee the mint reports having charged
    pub fee_paid: Option<u64>,
    /// Total value of change returned by the mint
    pub change_amount: u64,
}

/// Per-proof spendability flags, index-aligned with the queried secrets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStates {
    pub spendable: Vec<bool>,
    pub pending: Vec<bool>,
}

impl ProofStates {
    /// Indices of proofs that are neither spendable nor pending
    pub fn spent_indices(&self) -> Vec<usize> {
        self.spendable
            .iter()
            .enumerate()
            .filter(|(i, spendable)| !**spendable && !self.pending.get(*i).copied().unwrap_or(false))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn any_pending(&self) -> bool {
        self.pending.iter().any(|p| *p)
    }
}

/// Operations the redemption core needs from a mint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MintClient: Send + Sync {
    /// Connectivity and identity check
    async fn get_info(&self, mint_url: &str) -> Result<MintInfo, MintError>;

    /// Quote paying `invoice` from proofs denominated in `unit`
    async fn create_melt_quote(
        &self,
        mint_url: &str,
        invoice: &str,
        unit: &str,
    ) -> Result<MeltQuote, MintError>;

    /// Submit proofs against a quote
    async fn melt(
        &self,
        mint_url: &str,
        quote: &MeltQuote,
        proofs: &[Proof],
    ) -> Result<MeltResult, MintError>;

    /// Advisory spendability check; `Unsupported` when the mint lacks it
    async fn check_spendable(
        &self,
        mint_url: &str,
        secrets: &[String],
    ) -> Result<ProofStates, MintError>;
}

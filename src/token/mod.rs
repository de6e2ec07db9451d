//! Token Validator
//!
//! Cheap grammar gate, delegated structural decode, and value checks.
//! Parsing is pure: the mint named inside the token is not contacted here.

pub mod codec;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::common::error::RedeemError;
pub use codec::{CashuTokenCodec, TokenDecoder};

pub(crate) const V1_PREFIX: &str = "cashuA";
pub(crate) const V2_PREFIX: &str = "cashuB";

/// Fixed prefix, version tag, base64 payload
static TOKEN_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^cashu[AB][A-Za-z0-9_\-+/=]+$").expect("valid token regex"));

/// Token serialization version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenFormat {
    /// `cashuA` JSON encoding
    V1,
    /// `cashuB` CBOR encoding
    V2,
}

impl std::fmt::Display for TokenFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "V1"),
            Self::V2 => write!(f, "V2"),
        }
    }
}

/// A single ecash proof, carried opaquely to the mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub amount: u64,
    #[serde(rename = "id")]
    pub keyset_id: String,
    pub secret: String,
    #[serde(rename = "C")]
    pub c: String,
}

/// Canonical decoded token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub mint_url: String,
    pub unit: String,
    pub memo: Option<String>,
    pub proofs: Vec<Proof>,
    pub format: TokenFormat,
}

impl TokenRecord {
    /// Sum of proof values; `None` on overflow
    pub fn total_value(&self) -> Option<u64> {
        self.proofs
            .iter()
            .try_fold(0u64, |acc, p| acc.checked_add(p.amount))
    }

    /// Proof values sorted ascending
    pub fn denominations(&self) -> Vec<u64> {
        let mut values: Vec<u64> = self.proofs.iter().map(|p| p.amount).collect();
        values.sort_unstable();
        values
    }

    pub fn secrets(&self) -> Vec<String> {
        self.proofs.iter().map(|p| p.secret.clone()).collect()
    }
}

/// Validated token with its total value
#[derive(Debug, Clone)]
pub struct ParsedToken {
    pub record: TokenRecord,
    pub total_value: u64,
}

/// Stable, non-reversible fingerprint of an encoded token
pub fn fingerprint(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.trim().as_bytes()))
}

/// Token validator
#[derive(Clone)]
pub struct TokenValidator {
    decoder: Arc<dyn TokenDecoder>,
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self::new(Arc::new(CashuTokenCodec))
    }
}

impl TokenValidator {
    pub fn new(decoder: Arc<dyn TokenDecoder>) -> Self {
        Self { decoder }
    }

    /// Parse and sanity-check an encoded token
    pub fn parse(&self, raw: &str) -> Result<ParsedToken, RedeemError> {
        let raw = raw.trim();

        if raw.is_empty() {
            return Err(RedeemError::InvalidFormat("token is empty".to_string()));
        }
        if !TOKEN_GRAMMAR.is_match(raw) {
            return Err(RedeemError::InvalidFormat(
                "token does not match the cashuA/cashuB grammar".to_string(),
            ));
        }

        let record = self.decoder.decode(raw)?;

        if record.proofs.is_empty() {
            return Err(RedeemError::EmptyValue("token contains no proofs".to_string()));
        }
        if let Some(index) = record.proofs.iter().position(|p| p.amount == 0) {
            return Err(RedeemError::DecodeFailure(format!(
                "proof {} has zero value",
                index
            )));
        }

        let total_value = record
            .total_value()
            .ok_or_else(|| RedeemError::DecodeFailure("token value overflows".to_string()))?;
        if total_value == 0 {
            return Err(RedeemError::EmptyValue("token value is zero".to_string()));
        }

        Ok(ParsedToken {
            record,
            total_value,
        })
    }
}

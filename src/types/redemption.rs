//! Redemption Types
//!
//! Attempt records, their state machine, and the response shapes returned
//! by the redemption service.

use serde::{Deserialize, Serialize};

use crate::common::error::{ErrorKind, RedeemError};

/// State of a redemption attempt
///
/// `Processing → ParsingToken → CheckingSpendability → ResolvingInvoice →
/// MeltingToken → {Paid | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionState {
    /// Attempt recorded, nothing checked yet
    Processing,
    ParsingToken,
    /// Connectivity and advisory spent-proof check against the mint
    CheckingSpendability,
    /// Lightning address discovery and invoice request
    ResolvingInvoice,
    /// Melt submitted to the mint
    MeltingToken,
    Paid,
    Failed,
}

impl Default for RedemptionState {
    fn default() -> Self {
        Self::Processing
    }
}

impl RedemptionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }
}

impl std::fmt::Display for RedemptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::ParsingToken => write!(f, "parsing_token"),
            Self::CheckingSpendability => write!(f, "checking_spendability"),
            Self::ResolvingInvoice => write!(f, "resolving_invoice"),
            Self::MeltingToken => write!(f, "melting_token"),
            Self::Paid => write!(f, "paid"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Structured failure stored on an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    pub kind: ErrorKind,
    pub message: String,
    /// State the attempt was in when it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<RedemptionState>,
}

impl AttemptError {
    pub fn from_error(err: &RedeemError, step: RedemptionState) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().to_string(),
            step: Some(step),
        }
    }
}

/// A single redemption attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionAttempt {
    pub id: String,
    /// SHA-256 of the encoded token
    pub token_fingerprint: String,
    pub state: RedemptionState,
    pub target_address: Option<String>,
    pub using_default_address: bool,
    pub mint_url: Option<String>,
    /// Total token value
    pub declared_amount: Option<u64>,
    /// Protocol minimum fee estimated before quoting
    pub computed_fee: Option<u64>,
    /// Fee reserve quoted by the mint
    pub quoted_fee: Option<u64>,
    pub net_invoice_amount: Option<u64>,
    /// Fee actually charged by the mint
    pub actual_fee: Option<u64>,
    pub settled_amount: Option<u64>,
    pub paid: bool,
    pub payment_proof: Option<String>,
    pub error: Option<AttemptError>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl RedemptionAttempt {
    /// Create a new attempt in the `Processing` state
    pub fn new(
        token_fingerprint: String,
        target_address: Option<String>,
        using_default_address: bool,
    ) -> Self {
        let now = now_secs();

        Self {
            id: format!("rd_{}", uuid::Uuid::new_v4().simple()),
            token_fingerprint,
            state: RedemptionState::Processing,
            target_address,
            using_default_address,
            mint_url: None,
            declared_amount: None,
            computed_fee: None,
            quoted_fee: None,
            net_invoice_amount: None,
            actual_fee: None,
            settled_amount: None,
            paid: false,
            payment_proof: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update and refresh `updated_at`
    pub fn apply(&mut self, update: AttemptUpdate) {
        if let Some(state) = update.state {
            self.state = state;
        }
        if let Some(mint_url) = update.mint_url {
            self.mint_url = Some(mint_url);
        }
        if let Some(v) = update.declared_amount {
            self.declared_amount = Some(v);
        }
        if let Some(v) = update.computed_fee {
            self.computed_fee = Some(v);
        }
        if let Some(v) = update.quoted_fee {
            self.quoted_fee = Some(v);
        }
        if let Some(v) = update.net_invoice_amount {
            self.net_invoice_amount = Some(v);
        }
        if let Some(v) = update.actual_fee {
            self.actual_fee = Some(v);
        }
        if let Some(v) = update.settled_amount {
            self.settled_amount = Some(v);
        }
        if let Some(paid) = update.paid {
            self.paid = paid;
        }
        if let Some(proof) = update.payment_proof {
            self.payment_proof = Some(proof);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        self.touch();
    }

    fn touch(&mut self) {
        // Never move backwards, even if the wall clock does
        self.updated_at = now_secs().max(self.updated_at);
    }
}

/// Partial update to an attempt
///
/// Identity fields (`id`, fingerprint, `created_at`) are not representable.
#[derive(Debug, Clone, Default)]
pub struct AttemptUpdate {
    pub state: Option<RedemptionState>,
    pub mint_url: Option<String>,
    pub declared_amount: Option<u64>,
    pub computed_fee: Option<u64>,
    pub quoted_fee: Option<u64>,
    pub net_invoice_amount: Option<u64>,
    pub actual_fee: Option<u64>,
    pub settled_amount: Option<u64>,
    pub paid: Option<bool>,
    pub payment_proof: Option<String>,
    pub error: Option<AttemptError>,
}

impl AttemptUpdate {
    pub fn state(state: RedemptionState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    /// Melt outcome unknown: note why, but leave the state where it is
    pub fn unsettled(error: AttemptError) -> Self {
        Self {
            paid: Some(false),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Terminal failure; always clears the paid flag
    pub fn failed(error: AttemptError) -> Self {
        Self {
            state: Some(RedemptionState::Failed),
            paid: Some(false),
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Error body returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RedeemError> for ErrorBody {
    fn from(err: &RedeemError) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}

impl From<&AttemptError> for ErrorBody {
    fn from(err: &AttemptError) -> Self {
        let message = match err.step {
            Some(step) if !err.kind.is_validation() => format!("{} (during {})", err.message, step),
            _ => err.message.clone(),
        };
        Self {
            kind: err.kind,
            message,
        }
    }
}

/// Outcome of `redeem`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResult {
    pub success: bool,
    pub paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    /// Declared token value
    #[serde(rename = "amount")]
    pub declared_amount: Option<u64>,
    pub invoice_amount: Option<u64>,
    /// Protocol minimum fee used to size the invoice
    #[serde(rename = "fee")]
    pub expected_fee: Option<u64>,
    pub quoted_fee: Option<u64>,
    pub actual_fee: Option<u64>,
    pub net_amount: Option<u64>,
    pub destination: Option<String>,
    pub using_default: bool,
    pub mint_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_proof: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl RedeemResult {
    /// Build the public result from an attempt snapshot
    pub fn from_attempt(attempt: &RedemptionAttempt) -> Self {
        let success = attempt.state == RedemptionState::Paid && attempt.paid;
        Self {
            success,
            paid: attempt.paid,
            attempt_id: Some(attempt.id.clone()),
            declared_amount: attempt.declared_amount,
            invoice_amount: attempt.net_invoice_amount,
            expected_fee: attempt.computed_fee,
            quoted_fee: attempt.quoted_fee,
            actual_fee: attempt.actual_fee,
            net_amount: attempt.settled_amount,
            destination: attempt.target_address.clone(),
            using_default: attempt.using_default_address,
            mint_url: attempt.mint_url.clone(),
            settlement_proof: if success {
                attempt.payment_proof.clone()
            } else {
                None
            },
            error: attempt.error.as_ref().map(ErrorBody::from),
        }
    }

    /// Failure that happened before any attempt was recorded
    pub fn rejected(
        err: &RedeemError,
        destination: Option<String>,
        using_default: bool,
    ) -> Self {
        Self {
            success: false,
            paid: false,
            attempt_id: None,
            declared_amount: None,
            invoice_amount: None,
            expected_fee: None,
            quoted_fee: None,
            actual_fee: None,
            net_amount: None,
            destination,
            using_default,
            mint_url: None,
            settlement_proof: None,
            error: Some(ErrorBody::from(err)),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Outcome of `decode_token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedTokenInfo {
    pub mint_url: String,
    pub unit: String,
    pub total_value: u64,
    pub proof_count: usize,
    pub denominations: Vec<u64>,
    pub format_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// Outcome of `validate_address`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Minimum payable amount in whole units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<u64>,
    /// Maximum payable amount in whole units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Outcome of `check_spendable`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpendableReport {
    #[serde(rename_all = "camelCase")]
    Checked {
        spendable: Vec<bool>,
        pending: Vec<bool>,
        mint_url: String,
        total_value: u64,
    },
    Unsupported { supported: bool, reason: String },
}

/// Current unix time in seconds
pub fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

//! Storage Trait Definitions
//!
//! Defines the redemption ledger interface. Attempts are created once per
//! token fingerprint and mutated only by the redemption service.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::common::error::RedeemError;
use crate::types::{AttemptUpdate, RedemptionAttempt};

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Attempt not found: {0}")]
    NotFound(String),

    #[error("Token already redeemed by attempt {attempt_id} ({state})")]
    AlreadyRedeemed { attempt_id: String, state: String },

    #[error("Duplicate record: {0}")]
    Duplicate(String),
}

impl From<LedgerError> for RedeemError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AlreadyRedeemed { .. } => RedeemError::AlreadyRedeemed(err.to_string()),
            other => RedeemError::TransientNetworkError(other.to_string()),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Redemption ledger interface
///
/// Implementations:
/// - `MemoryLedger` - process-local, lost on restart
#[async_trait]
pub trait RedemptionLedger: Send + Sync {
    /// Atomically check the fingerprint index and record a new attempt
    ///
    /// Fails with `AlreadyRedeemed` when an existing attempt for the same
    /// fingerprint blocks a retry.
    async fn begin(&self, attempt: RedemptionAttempt) -> LedgerResult<RedemptionAttempt>;

    /// Record the first attempt for a fingerprint
    ///
    /// Fails with `Duplicate` if the fingerprint already has an attempt,
    /// whatever its state; `begin` is the path that allows retries.
    async fn create(&self, attempt: RedemptionAttempt) -> LedgerResult<RedemptionAttempt>;

    /// Merge a partial update; returns the updated snapshot
    async fn update(&self, id: &str, update: AttemptUpdate) -> LedgerResult<RedemptionAttempt>;

    /// Get an attempt by ID
    async fn get(&self, id: &str) -> LedgerResult<Option<RedemptionAttempt>>;

    /// Latest attempt for a token fingerprint
    async fn find_by_fingerprint(&self, fingerprint: &str)
        -> LedgerResult<Option<RedemptionAttempt>>;

    /// Remove terminal attempts older than `max_age`; returns the count removed
    async fn sweep(&self, max_age: Duration) -> LedgerResult<usize>;

    /// Aggregate counters
    async fn stats(&self) -> LedgerResult<LedgerStats>;
}

/// Whether an existing attempt prevents another try of the same token
///
/// In-flight and paid attempts always block. A failed attempt blocks when
/// its proofs may already be gone: the mint reported them spent, settlement
/// was ambiguous, or the melt broke off with a transient error.
pub fn blocks_retry(existing: &RedemptionAttempt) -> bool {
    use crate::common::error::ErrorKind;
    use crate::types::RedemptionState;

    if existing.state != RedemptionState::Failed {
        return true;
    }

    match existing.error.as_ref() {
        Some(e) => match e.kind {
            ErrorKind::AlreadySpent | ErrorKind::SettlementAmbiguous => true,
            ErrorKind::TransientNetworkError => e.step == Some(RedemptionState::MeltingToken),
            _ => false,
        },
        None => false,
    }
}

/// Ledger statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total: u64,
    pub in_flight: u64,
    pub paid: u64,
    pub failed: u64,
    /// Sum of settled amounts over paid attempts
    pub total_settled: u64,
    /// Sum of actual fees over paid attempts
    pub total_fees: u64,
}

impl std::fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ledger: {} total, {} in flight, {} paid, {} failed, {} settled, {} fees",
            self.total,
            self.in_flight,
            self.paid,
            self.failed,
            crate::types::sats_to_display(self.total_settled),
            crate::types::sats_to_display(self.total_fees)
        )
    }
}

//! In-Memory Ledger
//!
//! Process-local redemption ledger. Data is lost when the service restarts,
//! which bounds how long duplicate protection lasts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::traits::{blocks_retry, LedgerError, LedgerResult, LedgerStats, RedemptionLedger};
use crate::types::{now_secs, AttemptUpdate, RedemptionAttempt, RedemptionState};

/// In-memory redemption ledger
///
/// Lock order is always `records` then `by_fingerprint`.
#[derive(Clone)]
pub struct MemoryLedger {
    /// Attempts indexed by ID
    records: Arc<RwLock<HashMap<String, RedemptionAttempt>>>,
    /// Index: token fingerprint -> latest attempt ID
    by_fingerprint: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryLedger {
    /// Create a new empty ledger
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            by_fingerprint: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Sweep relative to an explicit clock
    pub async fn sweep_at(&self, now: u64, max_age: Duration) -> usize {
        let mut records = self.records.write().await;
        let mut by_fingerprint = self.by_fingerprint.write().await;

        let cutoff = now.saturating_sub(max_age.as_secs());
        let expired: Vec<String> = records
            .values()
            .filter(|a| a.state.is_terminal() && a.updated_at < cutoff)
            .map(|a| a.id.clone())
            .collect();

        for id in &expired {
            if let Some(attempt) = records.remove(id) {
                // A newer retry may own the index entry
                if by_fingerprint.get(&attempt.token_fingerprint) == Some(id) {
                    by_fingerprint.remove(&attempt.token_fingerprint);
                }
            }
        }

        expired.len()
    }

    /// Number of stored attempts
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RedemptionLedger for MemoryLedger {
    async fn begin(&self, attempt: RedemptionAttempt) -> LedgerResult<RedemptionAttempt> {
        let mut records = self.records.write().await;
        let mut by_fingerprint = self.by_fingerprint.write().await;

        if let Some(existing) = by_fingerprint
            .get(&attempt.token_fingerprint)
            .and_then(|id| records.get(id))
        {
            if blocks_retry(existing) {
                return Err(LedgerError::AlreadyRedeemed {
                    attempt_id: existing.id.clone(),
                    state: existing.state.to_string(),
                });
            }
        }

        if records.contains_key(&attempt.id) {
            return Err(LedgerError::Duplicate(attempt.id));
        }

        by_fingerprint.insert(attempt.token_fingerprint.clone(), attempt.id.clone());
        records.insert(attempt.id.clone(), attempt.clone());

        Ok(attempt)
    }

    async fn create(&self, attempt: RedemptionAttempt) -> LedgerResult<RedemptionAttempt> {
        let mut records = self.records.write().await;
        let mut by_fingerprint = self.by_fingerprint.write().await;

        if records.contains_key(&attempt.id) {
            return Err(LedgerError::Duplicate(attempt.id));
        }
        if let Some(existing) = by_fingerprint.get(&attempt.token_fingerprint) {
            return Err(LedgerError::Duplicate(format!(
                "fingerprint already recorded by {}",
                existing
            )));
        }

        by_fingerprint.insert(attempt.token_fingerprint.clone(), attempt.id.clone());
        records.insert(attempt.id.clone(), attempt.clone());

        Ok(attempt)
    }

    async fn update(&self, id: &str, update: AttemptUpdate) -> LedgerResult<RedemptionAttempt> {
        let mut records = self.records.write().await;

        let attempt = records
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        attempt.apply(update);

        Ok(attempt.clone())
    }

    async fn get(&self, id: &str) -> LedgerResult<Option<RedemptionAttempt>> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> LedgerResult<Option<RedemptionAttempt>> {
        let records = self.records.read().await;
        let by_fingerprint = self.by_fingerprint.read().await;

        Ok(by_fingerprint
            .get(fingerprint)
            .and_then(|id| records.get(id))
            .cloned())
    }

    async fn sweep(&self, max_age: Duration) -> LedgerResult<usize> {
        Ok(self.sweep_at(now_secs(), max_age).await)
    }

    async fn stats(&self) -> LedgerResult<LedgerStats> {
        let records = self.records.read().await;

        let mut stats = LedgerStats {
            total: records.len() as u64,
            ..Default::default()
        };

        for attempt in records.values() {
            match attempt.state {
                RedemptionState::Paid => {
                    stats.paid += 1;
                    stats.total_settled = stats
                        .total_settled
                        .saturating_add(attempt.settled_amount.unwrap_or(0));
                    stats.total_fees = stats
                        .total_fees
                        .saturating_add(attempt.actual_fee.unwrap_or(0));
                }
                RedemptionState::Failed => stats.failed += 1,
                _ => stats.in_flight += 1,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::{ErrorKind, RedeemError};
    use crate::types::AttemptError;

    fn attempt(fingerprint: &str) -> RedemptionAttempt {
        RedemptionAttempt::new(
            fingerprint.to_string(),
            Some("user@ln.tips".to_string()),
            false,
        )
    }

    fn failure(kind: ErrorKind) -> AttemptUpdate {
        AttemptUpdate::failed(AttemptError::from_error(
            &RedeemError::new(kind, "boom"),
            RedemptionState::MeltingToken,
        ))
    }

    #[tokio::test]
    async fn test_begin_and_lookup() {
        let ledger = MemoryLedger::new();
        let a = ledger.begin(attempt("fp1")).await.unwrap();

        assert!(a.id.starts_with("rd_"));
        assert_eq!(ledger.get(&a.id).await.unwrap().unwrap().state, RedemptionState::Processing);
        assert_eq!(ledger.find_by_fingerprint("fp1").await.unwrap().unwrap().id, a.id);
        assert!(ledger.get("rd_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_flight_and_paid_block_retry() {
        let ledger = MemoryLedger::new();
        let a = ledger.begin(attempt("fp1")).await.unwrap();

        let err = ledger.begin(attempt("fp1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyRedeemed { .. }));

        ledger
            .update(
                &a.id,
                AttemptUpdate {
                    state: Some(RedemptionState::Paid),
                    paid: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(ledger.begin(attempt("fp1")).await.is_err());
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_allows_retry_unless_spent() {
        let ledger = MemoryLedger::new();

        let a = ledger.begin(attempt("fp1")).await.unwrap();
        ledger.update(&a.id, failure(ErrorKind::EndpointUnreachable)).await.unwrap();
        let b = ledger.begin(attempt("fp1")).await.unwrap();
        assert_eq!(ledger.find_by_fingerprint("fp1").await.unwrap().unwrap().id, b.id);

        ledger.update(&b.id, failure(ErrorKind::AlreadySpent)).await.unwrap();
        let err = ledger.begin(attempt("fp1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyRedeemed { attempt_id, .. } if attempt_id == b.id));
    }

    #[tokio::test]
    async fn test_unsettled_melt_blocks_retry() {
        let ledger = MemoryLedger::new();

        let a = ledger.begin(attempt("fp-timeout")).await.unwrap();
        ledger
            .update(
                &a.id,
                AttemptUpdate {
                    state: Some(RedemptionState::MeltingToken),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        ledger
            .update(
                &a.id,
                AttemptUpdate::unsettled(AttemptError::from_error(
                    &RedeemError::TransientNetworkError("no answer".into()),
                    RedemptionState::MeltingToken,
                )),
            )
            .await
            .unwrap();
        assert!(ledger.begin(attempt("fp-timeout")).await.is_err());

        let b = ledger.begin(attempt("fp-ambiguous")).await.unwrap();
        ledger.update(&b.id, failure(ErrorKind::SettlementAmbiguous)).await.unwrap();
        assert!(ledger.begin(attempt("fp-ambiguous")).await.is_err());

        let c = ledger.begin(attempt("fp-broken")).await.unwrap();
        ledger.update(&c.id, failure(ErrorKind::TransientNetworkError)).await.unwrap();
        assert!(ledger.begin(attempt("fp-broken")).await.is_err());

        // Transient trouble before the melt is safe to retry
        let d = ledger.begin(attempt("fp-early")).await.unwrap();
        ledger
            .update(
                &d.id,
                AttemptUpdate::failed(AttemptError::from_error(
                    &RedeemError::TransientNetworkError("provider flaked".into()),
                    RedemptionState::ResolvingInvoice,
                )),
            )
            .await
            .unwrap();
        assert!(ledger.begin(attempt("fp-early")).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_never_replaces_fingerprint() {
        let ledger = MemoryLedger::new();

        let a = ledger.create(attempt("fp1")).await.unwrap();
        ledger.update(&a.id, failure(ErrorKind::EndpointUnreachable)).await.unwrap();

        let err = ledger.create(attempt("fp1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(_)));
        assert_eq!(ledger.find_by_fingerprint("fp1").await.unwrap().unwrap().id, a.id);
        assert_eq!(ledger.len().await, 1);

        // begin applies the retry policy instead
        let b = ledger.begin(attempt("fp1")).await.unwrap();
        assert_eq!(ledger.find_by_fingerprint("fp1").await.unwrap().unwrap().id, b.id);
    }

    #[tokio::test]
    async fn test_concurrent_begin_single_winner() {
        let ledger = MemoryLedger::new();
        let (a, b) = tokio::join!(ledger.begin(attempt("fp1")), ledger.begin(attempt("fp1")));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn test_update_missing() {
        let ledger = MemoryLedger::new();
        let err = ledger
            .update("rd_nope", AttemptUpdate::state(RedemptionState::Paid))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_reads_idempotent_until_sweep() {
        let ledger = MemoryLedger::new();
        let a = ledger.begin(attempt("fp1")).await.unwrap();
        let done = ledger
            .update(&a.id, failure(ErrorKind::InvoiceEndpointError))
            .await
            .unwrap();

        let first = ledger.get(&a.id).await.unwrap();
        let second = ledger.get(&a.id).await.unwrap();
        assert_eq!(first, second);

        // Not yet past the horizon
        assert_eq!(ledger.sweep_at(done.updated_at + 10, Duration::from_secs(60)).await, 0);
        assert!(ledger.get(&a.id).await.unwrap().is_some());

        assert_eq!(ledger.sweep_at(done.updated_at + 61, Duration::from_secs(60)).await, 1);
        assert!(ledger.get(&a.id).await.unwrap().is_none());
        assert!(ledger.find_by_fingerprint("fp1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_keeps_in_flight_and_newer_index() {
        let ledger = MemoryLedger::new();
        let stuck = ledger.begin(attempt("fp-stuck")).await.unwrap();

        let old = ledger.begin(attempt("fp1")).await.unwrap();
        ledger.update(&old.id, failure(ErrorKind::EndpointUnreachable)).await.unwrap();
        let retry = ledger.begin(attempt("fp1")).await.unwrap();

        let later = now_secs() + 3600;
        assert_eq!(ledger.sweep_at(later, Duration::from_secs(60)).await, 1);

        assert!(ledger.get(&stuck.id).await.unwrap().is_some());
        assert_eq!(ledger.find_by_fingerprint("fp1").await.unwrap().unwrap().id, retry.id);
    }

    #[tokio::test]
    async fn test_stats() {
        let ledger = MemoryLedger::new();
        let a = ledger.begin(attempt("a")).await.unwrap();
        let b = ledger.begin(attempt("b")).await.unwrap();
        ledger.begin(attempt("c")).await.unwrap();

        ledger
            .update(
                &a.id,
                AttemptUpdate {
                    state: Some(RedemptionState::Paid),
                    paid: Some(true),
                    settled_amount: Some(20_580),
                    actual_fee: Some(420),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        ledger.update(&b.id, failure(ErrorKind::AlreadySpent)).await.unwrap();

        let stats = ledger.stats().await.unwrap();
        assert_eq!(
            stats,
            LedgerStats {
                total: 3,
                in_flight: 1,
                paid: 1,
                failed: 1,
                total_settled: 20_580,
                total_fees: 420,
            }
        );
        assert!(stats.to_string().contains("20,580 sats"));
    }
}

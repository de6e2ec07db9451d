//! Settlement classification
//!
//! Mints disagree on how they report a completed payment. Any single
//! positive signal is enough; the signals are checked in order and the first
//! match is recorded.

use crate::mint::MeltResult;

/// Signal that confirmed a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementSignal {
    PaidFlag,
    PaymentProof,
    PaidState,
}

impl std::fmt::Display for SettlementSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PaidFlag => write!(f, "paid flag"),
            Self::PaymentProof => write!(f, "payment proof"),
            Self::PaidState => write!(f, "paid state"),
        }
    }
}

/// Result of classifying a melt response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Settled {
        signal: SettlementSignal,
        proof: Option<String>,
    },
    Unconfirmed,
}

impl Settlement {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

type Predicate = fn(&MeltResult) -> bool;

fn paid_flag(result: &MeltResult) -> bool {
    result.paid == Some(true)
}

fn has_proof(result: &MeltResult) -> bool {
    result
        .payment_proof
        .as_deref()
        .map_or(false, |p| !p.trim().is_empty())
}

fn paid_state(result: &MeltResult) -> bool {
    result
        .state
        .as_deref()
        .map_or(false, |s| s.eq_ignore_ascii_case("PAID"))
}

/// Checked in order; first match wins
const SIGNALS: [(SettlementSignal, Predicate); 3] = [
    (SettlementSignal::PaidFlag, paid_flag),
    (SettlementSignal::PaymentProof, has_proof),
    (SettlementSignal::PaidState, paid_state),
];

/// Classify a melt response
pub fn classify(result: &MeltResult) -> Settlement {
    SIGNALS
        .iter()
        .find(|(_, matches)| matches(result))
        .map(|(signal, _)| Settlement::Settled {
            signal: *signal,
            proof: result.payment_proof.clone().filter(|p| !p.trim().is_empty()),
        })
        .unwrap_or(Settlement::Unconfirmed)
}

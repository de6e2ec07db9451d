//! Fee Reconciler
//!
//! Sizes the invoice from the token value and checks the mint's melt quote
//! fits inside it. All arithmetic is integer and saturating.

use serde::{Deserialize, Serialize};

use crate::common::error::RedeemError;
use crate::mint::{MeltQuote, MeltResult};

/// Protocol fee rate, as a percentage of the declared amount
pub const FEE_PERCENT: u64 = 2;

/// Protocol minimum fee floor
pub const MIN_FEE: u64 = 1;

/// Expected routing fee: `max(1, ceil(amount * 2 / 100))`
pub fn protocol_min_fee(amount: u64) -> u64 {
    let scaled = amount.saturating_mul(FEE_PERCENT);
    let fee = scaled / 100 + u64::from(scaled % 100 != 0);
    fee.max(MIN_FEE)
}

/// Invoice amount after reserving the protocol fee
pub fn net_invoice_amount(declared: u64) -> Result<u64, RedeemError> {
    let fee = protocol_min_fee(declared);
    match declared.checked_sub(fee) {
        Some(net) if net > 0 => Ok(net),
        _ => Err(RedeemError::InsufficientValue(format!(
            "token value {} does not cover the minimum fee {}",
            declared, fee
        ))),
    }
}

/// Amounts agreed before melting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePlan {
    pub net_invoice_amount: u64,
    pub expected_fee: u64,
    pub quoted_fee: u64,
}

/// Amounts known after settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledAmounts {
    pub actual_fee: u64,
    pub net_amount: u64,
}

/// Check the mint quote fits within the token value
pub fn reconcile(declared: u64, quoted_amount: u64, fee_reserve: u64) -> Result<FeePlan, RedeemError> {
    let required = quoted_amount.saturating_add(fee_reserve);
    if required > declared {
        return Err(RedeemError::InsufficientValue(format!(
            "mint requires {} ({} + {} fee reserve) but token holds {}",
            required, quoted_amount, fee_reserve, declared
        )));
    }

    Ok(FeePlan {
        net_invoice_amount: net_invoice_amount(declared)?,
        expected_fee: protocol_min_fee(declared),
        quoted_fee: fee_reserve,
    })
}

/// Derive the fee actually charged from the melt outcome
///
/// The mint-reported fee wins; otherwise the reserve minus returned change.
pub fn settle(declared: u64, quote: &MeltQuote, outcome: &MeltResult) -> SettledAmounts {
    let actual_fee = outcome
        .fee_paid
        .unwrap_or_else(|| quote.fee_reserve.saturating_sub(outcome.change_amount));

    SettledAmounts {
        actual_fee,
        net_amount: declared.saturating_sub(actual_fee),
    }
}

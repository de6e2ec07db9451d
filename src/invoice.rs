//! BOLT-11 invoice inspection
//!
//! Invoices from address providers are checked before any value is melted:
//! the encoded amount must match what was requested and the invoice must
//! still be payable.

use lightning_invoice::{Bolt11Invoice, Currency};
use std::str::FromStr;

use crate::common::error::RedeemError;

/// Fields of an invoice relevant to redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInvoice {
    pub amount_msat: Option<u64>,
    pub expiry_secs: u64,
    pub network: String,
    pub expired: bool,
}

/// Invoice decoding capability
pub trait InvoiceDecoder: Send + Sync {
    fn decode(&self, invoice: &str) -> Result<DecodedInvoice, RedeemError>;
}

/// Decoder backed by `lightning-invoice`
#[derive(Debug, Clone, Default)]
pub struct Bolt11Decoder;

impl InvoiceDecoder for Bolt11Decoder {
    fn decode(&self, invoice: &str) -> Result<DecodedInvoice, RedeemError> {
        let parsed = Bolt11Invoice::from_str(invoice.trim()).map_err(|e| {
            RedeemError::InvoiceEndpointError(format!("provider returned an undecodable invoice: {}", e))
        })?;

        Ok(DecodedInvoice {
            amount_msat: parsed.amount_milli_satoshis(),
            expiry_secs: parsed.expiry_time().as_secs(),
            network: network_name(parsed.currency()).to_string(),
            expired: parsed.is_expired(),
        })
    }
}

#[allow(unreachable_patterns)]
fn network_name(currency: Currency) -> &'static str {
    match currency {
        Currency::Bitcoin => "bitcoin",
        Currency::BitcoinTestnet => "testnet",
        Currency::Regtest => "regtest",
        Currency::Simnet => "simnet",
        Currency::Signet => "signet",
        _ => "unknown",
    }
}

/// Check a provider invoice against the amount that was requested
pub fn verify_invoice(decoded: &DecodedInvoice, expected_sats: u64) -> Result<(), RedeemError> {
    let expected_msat = crate::types::sats_to_msat(expected_sats);

    match decoded.amount_msat {
        Some(amount) if amount == expected_msat => {}
        Some(amount) => {
            return Err(RedeemError::InvoiceEndpointError(format!(
                "invoice is for {} msat, requested {} msat",
                amount, expected_msat
            )))
        }
        None => {
            return Err(RedeemError::InvoiceEndpointError(
                "invoice carries no amount".to_string(),
            ))
        }
    }

    if decoded.expired {
        return Err(RedeemError::InvoiceEndpointError(
            "invoice is already expired".to_string(),
        ));
    }

    Ok(())
}

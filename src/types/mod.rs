//! Shared Types Module
//!
//! Data types shared across the redemption service.

pub mod redemption;
pub mod units;

// Re-exports for convenience
pub use redemption::{
    now_secs, AddressValidation, AttemptError, AttemptUpdate, DecodedTokenInfo, ErrorBody,
    RedeemResult, RedemptionAttempt, RedemptionState, SpendableReport,
};
pub use units::{msat_to_sats_ceil, msat_to_sats_floor, sats_to_display, sats_to_msat, MSAT_PER_SAT};

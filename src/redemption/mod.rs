//! Redemption Service
//!
//! Turns an ecash token into a Lightning payment.
//!
//! # Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    REDEMPTION FLOW                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  1. Processing                                                  │
//! │     └── Fingerprint token, reject duplicates                    │
//! │                                                                 │
//! │  2. ParsingToken                                                │
//! │     └── Decode, size invoice (value - 2% fee), gate destination │
//! │                                                                 │
//! │  3. CheckingSpendability                                        │
//! │     └── Mint connectivity (required), spent proofs (advisory)   │
//! │                                                                 │
//! │  4. ResolvingInvoice                                            │
//! │     └── LNURL discovery, bounds, invoice request, sanity check  │
//! │                                                                 │
//! │  5. MeltingToken                                                │
//! │     └── Quote, reconcile fees, melt, classify settlement        │
//! │                                                                 │
//! │  6. Paid | Failed                                               │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use lnredeem::{RedeemConfig, RedemptionService};
//!
//! let service = RedemptionService::from_config(&RedeemConfig::from_env()?);
//! let result = service.redeem(&token, Some("user@ln.tips")).await;
//! ```

pub mod fees;
pub mod service;
pub mod settlement;
pub mod sweeper;

pub use fees::{net_invoice_amount, protocol_min_fee, reconcile, settle, FeePlan, SettledAmounts};
pub use service::{RedemptionOptions, RedemptionService};
pub use settlement::{classify, Settlement, SettlementSignal};
pub use sweeper::LedgerSweeper;

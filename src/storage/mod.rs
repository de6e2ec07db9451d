//! Storage Layer Module
//!
//! Provides the redemption ledger.
//!
//! This module contains:
//! - The ledger trait definition
//! - An in-memory implementation

pub mod memory;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryLedger;
pub use traits::{blocks_retry, LedgerError, LedgerResult, LedgerStats, RedemptionLedger};

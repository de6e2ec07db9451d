//! lnredeem - Ecash to Lightning Redemption Service
//!
//! Accepts a Cashu-style ecash token and a Lightning address, and pays the
//! token's value (minus routing fees) to that address by asking the token's
//! mint to melt it against an invoice fetched from the address provider.
//!
//! ## Components
//!
//! 1. **Token Validator** - grammar gate and V1/V2 decode
//! 2. **Fee Reconciler** - protocol fee, invoice sizing, quote checks
//! 3. **Address Resolver** - LNURL-pay discovery and invoice requests
//! 4. **Redemption Ledger** - attempt records with a duplicate guard
//! 5. **Redemption Service** - the per-attempt state machine
//! 6. **REST API** - axum routes over the service

pub mod address;
pub mod api;
pub mod common;
pub mod invoice;
pub mod mint;
pub mod redemption;
pub mod storage;
pub mod token;
pub mod types;

// Re-exports: configuration and errors
pub use common::{ConfigError, ErrorKind, RedeemConfig, RedeemError};

// Re-exports: address resolution
pub use address::{AddressResolution, AddressResolver, DomainAllowList, LightningAddress};

// Re-exports: token handling
pub use token::{fingerprint, CashuTokenCodec, Proof, TokenDecoder, TokenRecord, TokenValidator};

// Re-exports: mint access
pub use mint::{classify_mint_error, HttpMintClient, MintCache, MintClient, MintError};

// Re-exports: invoices
pub use invoice::{Bolt11Decoder, DecodedInvoice, InvoiceDecoder};

// Re-exports: redemption service
pub use redemption::{LedgerSweeper, RedemptionOptions, RedemptionService};

// Re-exports: ledger
pub use storage::{LedgerStats, MemoryLedger, RedemptionLedger};

// Re-exports: shared types
pub use types::{
    AddressValidation, DecodedTokenInfo, RedeemResult, RedemptionAttempt, RedemptionState,
    SpendableReport,
};

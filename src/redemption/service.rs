//! Redemption Service
//!
//! Drives one redemption attempt through its states and records every
//! transition in the ledger. Only this module mutates attempts.

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::address::{AddressResolver, LightningAddress};
use crate::common::config::RedeemConfig;
use crate::common::error::RedeemError;
use crate::common::logging::{log_redemption_event, log_security_event};
use crate::invoice::{verify_invoice, Bolt11Decoder, InvoiceDecoder};
use crate::mint::{HttpMintClient, MintCache, MintClient};
use crate::redemption::fees;
use crate::redemption::settlement::{self, Settlement};
use crate::storage::{LedgerStats, MemoryLedger, RedemptionLedger};
use crate::token::{fingerprint, ParsedToken, TokenValidator};
use crate::types::{
    AddressValidation, AttemptError, AttemptUpdate, DecodedTokenInfo, RedeemResult,
    RedemptionAttempt, RedemptionState, SpendableReport,
};

/// Service-level options
#[derive(Debug, Clone, Default)]
pub struct RedemptionOptions {
    /// Destination used when the caller supplies none
    pub default_address: Option<String>,
    /// Comment attached to invoice requests
    pub invoice_comment: Option<String>,
    /// Terminal attempts older than this are swept
    pub retention: Duration,
}

impl From<&RedeemConfig> for RedemptionOptions {
    fn from(config: &RedeemConfig) -> Self {
        Self {
            default_address: config.default_address.clone(),
            invoice_comment: config.invoice_comment.clone(),
            retention: config.retention,
        }
    }
}

/// Redemption service
pub struct RedemptionService {
    /// Token grammar and decode
    validator: TokenValidator,

    /// Lightning address resolution
    resolver: AddressResolver,

    /// Mint access with cached connectivity
    mints: MintCache,

    /// Provider invoice inspection
    invoices: Arc<dyn InvoiceDecoder>,

    /// Attempt ledger
    ledger: Arc<dyn RedemptionLedger>,

    options: RedemptionOptions,
}

impl RedemptionService {
    pub fn new(
        validator: TokenValidator,
        resolver: AddressResolver,
        mint_client: Arc<dyn MintClient>,
        invoices: Arc<dyn InvoiceDecoder>,
        ledger: Arc<dyn RedemptionLedger>,
        options: RedemptionOptions,
    ) -> Self {
        Self {
            validator,
            resolver,
            mints: MintCache::new(mint_client),
            invoices,
            ledger,
            options,
        }
    }

    /// Production wiring: HTTP mint client, BOLT-11 decoder, in-memory ledger
    pub fn from_config(config: &RedeemConfig) -> Self {
        Self::new(
            TokenValidator::default(),
            AddressResolver::new(config.allowed_domains.clone(), config.http_timeout),
            Arc::new(HttpMintClient::new(config.http_timeout).with_melt_timeout(config.melt_timeout)),
            Arc::new(Bolt11Decoder),
            Arc::new(MemoryLedger::new()),
            RedemptionOptions::from(config),
        )
    }

    pub fn options(&self) -> &RedemptionOptions {
        &self.options
    }

    /// Redeem a token to a Lightning address, or to the default destination
    ///
    /// Never returns an error: every failure is reported in the result and,
    /// once an attempt exists, recorded on it.
    pub async fn redeem(&self, token: &str, address: Option<&str>) -> RedeemResult {
        let supplied = address.map(str::trim).filter(|a| !a.is_empty());
        let using_default = supplied.is_none();
        let destination = supplied
            .map(str::to_string)
            .or_else(|| self.options.default_address.clone());

        let attempt = RedemptionAttempt::new(fingerprint(token), destination.clone(), using_default);
        let attempt = match self.ledger.begin(attempt).await {
            Ok(attempt) => attempt,
            Err(e) => {
                let err = RedeemError::from(e);
                warn!(error = %err, "redemption rejected before start");
                log_security_event(
                    "duplicate_redemption",
                    false,
                    serde_json::json!({ "reason": err.message() }),
                    None,
                );
                return RedeemResult::rejected(&err, destination, using_default);
            }
        };
        let id = attempt.id.clone();
        info!(attempt = %id, using_default, "redemption started");

        let run = AssertUnwindSafe(self.execute(&id, token, destination.as_deref()))
            .catch_unwind()
            .await;

        let outcome = match run {
            Ok(result) => result,
            Err(panic) => Err(RedeemError::TransientNetworkError(format!(
                "internal error: {}",
                panic_message(&*panic)
            ))),
        };

        if let Err(err) = outcome {
            self.fail(&id, &err).await;
        }

        match self.ledger.get(&id).await {
            Ok(Some(attempt)) => {
                log_redemption_event(&attempt);
                RedeemResult::from_attempt(&attempt)
            }
            Ok(None) | Err(_) => RedeemResult::rejected(
                &RedeemError::TransientNetworkError(format!("attempt {} vanished", id)),
                destination,
                using_default,
            ),
        }
    }

    async fn advance(&self, id: &str, update: AttemptUpdate) -> Result<RedemptionAttempt, RedeemError> {
        let attempt = self.ledger.update(id, update).await?;
        debug!(attempt = %id, state = %attempt.state, "attempt advanced");
        Ok(attempt)
    }

    async fn execute(
        &self,
        id: &str,
        token: &str,
        destination: Option<&str>,
    ) -> Result<(), RedeemError> {
        // ParsingToken: purely local checks
        self.advance(id, AttemptUpdate::state(RedemptionState::ParsingToken))
            .await?;

        let parsed = self.validator.parse(token)?;
        let declared = parsed.total_value;
        self.advance(
            id,
            AttemptUpdate {
                mint_url: Some(parsed.record.mint_url.clone()),
                declared_amount: Some(declared),
                computed_fee: Some(fees::protocol_min_fee(declared)),
                ..Default::default()
            },
        )
        .await?;

        let net = fees::net_invoice_amount(declared)?;
        self.advance(
            id,
            AttemptUpdate {
                net_invoice_amount: Some(net),
                ..Default::default()
            },
        )
        .await?;

        let target = self.destination_gate(id, destination)?;

        // CheckingSpendability
        self.advance(id, AttemptUpdate::state(RedemptionState::CheckingSpendability))
            .await?;
        self.check_mint(id, &parsed).await?;

        // ResolvingInvoice
        self.advance(id, AttemptUpdate::state(RedemptionState::ResolvingInvoice))
            .await?;
        let resolution = self
            .resolver
            .fetch_capabilities(&target.domain, &target.username)
            .await?;
        let invoice = self
            .resolver
            .request_invoice(&resolution, net, self.options.invoice_comment.as_deref())
            .await?;
        let decoded = self.invoices.decode(&invoice.invoice)?;
        verify_invoice(&decoded, net)?;
        info!(attempt = %id, amount = net, network = %decoded.network, "invoice obtained");

        // MeltingToken
        self.advance(id, AttemptUpdate::state(RedemptionState::MeltingToken))
            .await?;
        let mint_url = &parsed.record.mint_url;
        let client = self.mints.client();

        let quote = client
            .create_melt_quote(mint_url, &invoice.invoice, &parsed.record.unit)
            .await
            .map_err(|e| e.into_redeem_error())?;
        let plan = fees::reconcile(declared, quote.amount, quote.fee_reserve)?;
        debug!(
            attempt = %id,
            net = plan.net_invoice_amount,
            expected_fee = plan.expected_fee,
            quoted_fee = plan.quoted_fee,
            "melt quote reconciled"
        );
        self.advance(
            id,
            AttemptUpdate {
                net_invoice_amount: Some(plan.net_invoice_amount),
                computed_fee: Some(plan.expected_fee),
                quoted_fee: Some(plan.quoted_fee),
                ..Default::default()
            },
        )
        .await?;

        // Past this point the mint may pay even if we never hear back
        let outcome = match client.melt(mint_url, &quote, &parsed.record.proofs).await {
            Ok(outcome) => outcome,
            Err(e) if e.outcome_unknown() => {
                let err = RedeemError::TransientNetworkError(format!(
                    "melt outcome unknown for quote {}: {}",
                    quote.quote_id, e
                ));
                warn!(attempt = %id, quote = %quote.quote_id, error = %e, "melt unanswered, leaving attempt in flight");
                self.advance(
                    id,
                    AttemptUpdate::unsettled(AttemptError::from_error(
                        &err,
                        RedemptionState::MeltingToken,
                    )),
                )
                .await?;
                return Ok(());
            }
            Err(e) => return Err(e.into_redeem_error()),
        };

        match settlement::classify(&outcome) {
            Settlement::Settled { signal, proof } => {
                let settled = fees::settle(declared, &quote, &outcome);
                info!(attempt = %id, %signal, actual_fee = settled.actual_fee, "melt settled");
                self.advance(
                    id,
                    AttemptUpdate {
                        state: Some(RedemptionState::Paid),
                        paid: Some(true),
                        payment_proof: proof,
                        actual_fee: Some(settled.actual_fee),
                        settled_amount: Some(settled.net_amount),
                        ..Default::default()
                    },
                )
                .await?;
                Ok(())
            }
            Settlement::Unconfirmed => Err(RedeemError::SettlementAmbiguous(format!(
                "mint gave no payment confirmation for quote {} (state: {})",
                quote.quote_id,
                outcome.state.as_deref().unwrap_or("none")
            ))),
        }
    }

    fn destination_gate(
        &self,
        id: &str,
        destination: Option<&str>,
    ) -> Result<LightningAddress, RedeemError> {
        let destination = destination.ok_or_else(|| {
            RedeemError::InvalidAddressFormat(
                "no lightning address supplied and no default configured".to_string(),
            )
        })?;

        self.resolver.resolve(destination).map_err(|err| {
            if let RedeemError::DomainNotAllowed(_) = err {
                log_security_event(
                    "destination_not_allowed",
                    false,
                    serde_json::json!({ "destination": destination }),
                    Some(id),
                );
            }
            err
        })
    }

    /// Connectivity is required; spendability is advisory
    async fn check_mint(&self, id: &str, parsed: &ParsedToken) -> Result<(), RedeemError> {
        let mint_url = &parsed.record.mint_url;
        self.mints
            .ensure(mint_url)
            .await
            .map_err(|e| e.into_redeem_error())?;

        let secrets = parsed.record.secrets();
        match self.mints.client().check_spendable(mint_url, &secrets).await {
            Ok(states) => {
                let spent = states.spent_indices();
                if !spent.is_empty() {
                    return Err(RedeemError::AlreadySpent(format!(
                        "{} of {} proofs already spent at {}",
                        spent.len(),
                        secrets.len(),
                        mint_url
                    )));
                }
                if states.any_pending() {
                    warn!(attempt = %id, mint = %mint_url, "some proofs are pending at the mint");
                }
            }
            Err(e) if e.is_unsupported() => {
                debug!(attempt = %id, mint = %mint_url, "mint has no spendability check");
            }
            Err(e) => {
                warn!(attempt = %id, mint = %mint_url, error = %e, "spendability check failed, continuing");
            }
        }

        Ok(())
    }

    async fn fail(&self, id: &str, err: &RedeemError) {
        let step = match self.ledger.get(id).await {
            Ok(Some(attempt)) => attempt.state,
            _ => RedemptionState::Processing,
        };

        warn!(attempt = %id, %step, kind = %err.kind(), error = %err, "redemption failed");

        if let Err(e) = self
            .ledger
            .update(id, AttemptUpdate::failed(AttemptError::from_error(err, step)))
            .await
        {
            warn!(attempt = %id, error = %e, "could not record failure");
        }
    }

    /// Decode a token without contacting its mint
    pub fn decode_token(&self, token: &str) -> Result<DecodedTokenInfo, RedeemError> {
        let parsed = self.validator.parse(token)?;
        let record = &parsed.record;

        Ok(DecodedTokenInfo {
            mint_url: record.mint_url.clone(),
            unit: record.unit.clone(),
            total_value: parsed.total_value,
            proof_count: record.proofs.len(),
            denominations: record.denominations(),
            format_version: record.format.to_string(),
            memo: record.memo.clone(),
        })
    }

    /// Resolve an address without requesting an invoice
    pub async fn validate_address(&self, address: &str) -> AddressValidation {
        self.resolver.validate(address).await
    }

    /// Ask the token's mint whether its proofs are still spendable
    pub async fn check_spendable(&self, token: &str) -> Result<SpendableReport, RedeemError> {
        let parsed = self.validator.parse(token)?;
        let mint_url = parsed.record.mint_url.clone();

        match self
            .mints
            .client()
            .check_spendable(&mint_url, &parsed.record.secrets())
            .await
        {
            Ok(states) => Ok(SpendableReport::Checked {
                spendable: states.spendable,
                pending: states.pending,
                mint_url,
                total_value: parsed.total_value,
            }),
            Err(e) if e.is_unsupported() => Ok(SpendableReport::Unsupported {
                supported: false,
                reason: e.to_string(),
            }),
            Err(e) => Err(e.into_redeem_error()),
        }
    }

    /// Current snapshot of an attempt
    pub async fn get_status(&self, id: &str) -> Result<Option<RedemptionAttempt>, RedeemError> {
        Ok(self.ledger.get(id).await?)
    }

    pub async fn stats(&self) -> Result<LedgerStats, RedeemError> {
        Ok(self.ledger.stats().await?)
    }

    /// Remove terminal attempts past the retention horizon
    pub async fn sweep_expired(&self) -> Result<usize, RedeemError> {
        Ok(self.ledger.sweep(self.options.retention).await?)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{DomainAllowList, DEFAULT_TIMEOUT};
    use crate::common::error::ErrorKind;
    use crate::invoice::DecodedInvoice;
    use crate::mint::{MeltQuote, MeltResult, MintError, MintInfo, MockMintClient, ProofStates};
    use crate::token::codec::tests::encode_v1;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MINT: &str = "https://mint.example.com";

    /// Reads the msat amount from invoices shaped `lnfake<msat>`
    struct FakeInvoices;

    impl InvoiceDecoder for FakeInvoices {
        fn decode(&self, invoice: &str) -> Result<DecodedInvoice, RedeemError> {
            let amount = invoice
                .strip_prefix("lnfake")
                .and_then(|a| a.parse().ok())
                .ok_or_else(|| RedeemError::InvoiceEndpointError("bad fake invoice".into()))?;
            Ok(DecodedInvoice {
                amount_msat: Some(amount),
                expiry_secs: 3600,
                network: "regtest".to_string(),
                expired: false,
            })
        }
    }

    async fn provider(server: &MockServer, user: &str, invoice: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/.well-known/lnurlp/{}", user)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tag": "payRequest",
                "callback": format!("{}/cb/{}", server.uri(), user),
                "minSendable": 1000,
                "maxSendable": 1_000_000_000,
                "commentAllowed": 0
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/cb/{}", user)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "pr": invoice })),
            )
            .mount(server)
            .await;
    }

    fn service_with(mint: MockMintClient, allow: &str, default: Option<String>) -> RedemptionService {
        RedemptionService::new(
            TokenValidator::default(),
            AddressResolver::new(DomainAllowList::parse(allow), DEFAULT_TIMEOUT).with_scheme("http"),
            Arc::new(mint),
            Arc::new(FakeInvoices),
            Arc::new(MemoryLedger::new()),
            RedemptionOptions {
                default_address: default,
                invoice_comment: None,
                retention: Duration::from_secs(60),
            },
        )
    }

    fn healthy_mint() -> MockMintClient {
        let mut mint = MockMintClient::new();
        mint.expect_get_info().returning(|_| {
            Ok(MintInfo {
                name: Some("test mint".to_string()),
                ..Default::default()
            })
        });
        mint.expect_check_spendable()
            .returning(|_, secrets| {
                Ok(ProofStates {
                    spendable: vec![true; secrets.len()],
                    pending: vec![false; secrets.len()],
                })
            });
        mint
    }

    fn quote_for(amount: u64, fee_reserve: u64) -> MeltQuote {
        MeltQuote {
            quote_id: "q-1".to_string(),
            amount,
            fee_reserve,
            state: Some("UNPAID".to_string()),
            expiry: None,
        }
    }

    fn address(user: &str, server: &MockServer) -> String {
        format!("{}@{}", user, server.address())
    }

    #[tokio::test]
    async fn test_redeem_to_supplied_address() {
        let server = MockServer::start().await;
        provider(&server, "alice", "lnfake20580000").await;

        let mut mint = healthy_mint();
        mint.expect_create_melt_quote()
            .withf(|url, invoice, unit| url == MINT && invoice == "lnfake20580000" && unit == "sat")
            .times(1)
            .returning(|_, _, _| Ok(quote_for(20_580, 400)));
        mint.expect_melt().times(1).returning(|_, _, proofs| {
            assert_eq!(proofs.len(), 4);
            Ok(MeltResult {
                paid: Some(true),
                payment_proof: Some("preimage".to_string()),
                change_amount: 380,
                ..Default::default()
            })
        });

        let service = service_with(mint, "*", None);
        let token = encode_v1(MINT, &[16384, 4096, 512, 8]);
        let result = service.redeem(&token, Some(&address("alice", &server))).await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.paid);
        assert!(!result.using_default);
        assert_eq!(result.declared_amount, Some(21_000));
        assert_eq!(result.invoice_amount, Some(20_580));
        assert_eq!(result.expected_fee, Some(420));
        assert_eq!(result.quoted_fee, Some(400));
        assert_eq!(result.actual_fee, Some(20));
        assert_eq!(result.net_amount, Some(20_980));
        assert_eq!(result.settlement_proof.as_deref(), Some("preimage"));

        let attempt = service
            .get_status(result.attempt_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt.state, RedemptionState::Paid);
    }

    #[tokio::test]
    async fn test_insufficient_value_makes_no_network_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        // No expectations: any mint call panics and would change the error
        let service = service_with(MockMintClient::new(), "*", None);
        let result = service
            .redeem(&encode_v1(MINT, &[1]), Some(&address("alice", &server)))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::InsufficientValue));
        assert_eq!(result.declared_amount, Some(1));

        let attempt = service
            .get_status(result.attempt_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        let error = attempt.error.unwrap();
        assert_eq!(error.step, Some(RedemptionState::ParsingToken));
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_melt_once() {
        let server = MockServer::start().await;
        provider(&server, "alice", "lnfake20580000").await;

        let mut mint = healthy_mint();
        mint.expect_create_melt_quote()
            .times(1)
            .returning(|_, _, _| Ok(quote_for(20_580, 420)));
        mint.expect_melt().times(1).returning(|_, _, _| {
            Ok(MeltResult {
                state: Some("PAID".to_string()),
                ..Default::default()
            })
        });

        let service = service_with(mint, "*", None);
        let token = encode_v1(MINT, &[16384, 4096, 512, 8]);
        let dest = address("alice", &server);

        let (a, b) = tokio::join!(
            service.redeem(&token, Some(&dest)),
            service.redeem(&token, Some(&dest))
        );

        let (winner, loser) = if a.success { (a, b) } else { (b, a) };
        assert!(winner.success);
        assert!(!loser.success);
        assert_eq!(loser.error_kind(), Some(ErrorKind::AlreadyRedeemed));
        assert!(loser.attempt_id.is_none());

        // Paid tokens stay blocked
        let again = service.redeem(&token, Some(&dest)).await;
        assert_eq!(again.error_kind(), Some(ErrorKind::AlreadyRedeemed));
    }

    #[tokio::test]
    async fn test_domain_not_allowed_before_network() {
        let mut mint = MockMintClient::new();
        mint.expect_get_info().times(0);

        let service = service_with(mint, "ln.tips", None);
        let result = service
            .redeem(&encode_v1(MINT, &[64]), Some("user@evil.com"))
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::DomainNotAllowed));
        assert_eq!(result.destination.as_deref(), Some("user@evil.com"));
    }

    #[tokio::test]
    async fn test_missing_destination_without_default() {
        let service = service_with(MockMintClient::new(), "*", None);
        let result = service.redeem(&encode_v1(MINT, &[64]), None).await;

        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidAddressFormat));
        assert!(result.using_default);
        assert!(result.destination.is_none());
    }

    #[tokio::test]
    async fn test_spent_proof_fails_and_blocks_retry() {
        let mut mint = MockMintClient::new();
        mint.expect_get_info()
            .returning(|_| Ok(MintInfo::default()));
        mint.expect_check_spendable().returning(|_, _| {
            Ok(ProofStates {
                spendable: vec![false],
                pending: vec![false],
            })
        });
        mint.expect_melt().times(0);

        let service = service_with(mint, "*", Some("admin@ln.tips".to_string()));
        let token = encode_v1(MINT, &[64]);

        let first = service.redeem(&token, None).await;
        assert_eq!(first.error_kind(), Some(ErrorKind::AlreadySpent));
        assert!(!first.paid);

        let retry = service.redeem(&token, None).await;
        assert_eq!(retry.error_kind(), Some(ErrorKind::AlreadyRedeemed));
    }

    #[tokio::test]
    async fn test_unsupported_spendability_is_ignored() {
        let server = MockServer::start().await;
        provider(&server, "bob", "lnfake62000").await;

        let mut mint = MockMintClient::new();
        mint.expect_get_info().returning(|_| Ok(MintInfo::default()));
        mint.expect_check_spendable()
            .returning(|_, _| Err(MintError::Unsupported("HTTP 404".into())));
        mint.expect_create_melt_quote()
            .returning(|_, _, _| Ok(quote_for(62, 2)));
        mint.expect_melt().returning(|_, _, _| {
            Ok(MeltResult {
                paid: Some(false),
                payment_proof: Some("ab".to_string()),
                ..Default::default()
            })
        });

        let service = service_with(mint, "*", None);
        let result = service
            .redeem(&encode_v1(MINT, &[64]), Some(&address("bob", &server)))
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.expected_fee, Some(2));
        assert_eq!(result.actual_fee, Some(2));
    }

    #[tokio::test]
    async fn test_unconfirmed_melt_is_ambiguous() {
        let server = MockServer::start().await;
        provider(&server, "bob", "lnfake62000").await;

        let mut mint = healthy_mint();
        mint.expect_create_melt_quote()
            .returning(|_, _, _| Ok(quote_for(62, 2)));
        mint.expect_melt().times(1).returning(|_, _, _| {
            Ok(MeltResult {
                paid: Some(false),
                state: Some("PENDING".to_string()),
                ..Default::default()
            })
        });

        let service = service_with(mint, "*", None);
        let token = encode_v1(MINT, &[64]);
        let result = service.redeem(&token, Some(&address("bob", &server))).await;

        assert!(!result.success);
        assert!(!result.paid);
        assert_eq!(result.error_kind(), Some(ErrorKind::SettlementAmbiguous));
        assert!(result.settlement_proof.is_none());

        // The payment may still land, so the token is not offered again
        let retry = service.redeem(&token, Some(&address("bob", &server))).await;
        assert_eq!(retry.error_kind(), Some(ErrorKind::AlreadyRedeemed));
    }

    #[tokio::test]
    async fn test_unanswered_melt_stays_in_flight() {
        for err in [
            MintError::Timeout("operation timed out".into()),
            MintError::Interrupted("connection reset".into()),
        ] {
            let server = MockServer::start().await;
            provider(&server, "bob", "lnfake62000").await;

            let mut mint = healthy_mint();
            mint.expect_create_melt_quote()
                .returning(|_, _, _| Ok(quote_for(62, 2)));
            mint.expect_melt()
                .times(1)
                .returning(move |_, _, _| Err(err.clone()));

            let service = service_with(mint, "*", None);
            let token = encode_v1(MINT, &[64]);
            let result = service.redeem(&token, Some(&address("bob", &server))).await;

            assert!(!result.success);
            assert!(!result.paid);
            assert_eq!(result.error_kind(), Some(ErrorKind::TransientNetworkError));

            let attempt = service
                .get_status(result.attempt_id.as_deref().unwrap())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(attempt.state, RedemptionState::MeltingToken);
            assert!(!attempt.paid);
            let error = attempt.error.unwrap();
            assert_eq!(error.step, Some(RedemptionState::MeltingToken));
            assert!(error.message.contains("outcome unknown"));

            // Same token again while the first melt may still pay: no second melt
            let retry = service.redeem(&token, Some(&address("bob", &server))).await;
            assert_eq!(retry.error_kind(), Some(ErrorKind::AlreadyRedeemed));
            assert!(retry.attempt_id.is_none());

            let stats = service.stats().await.unwrap();
            assert_eq!(stats.in_flight, 1);
            assert_eq!(stats.failed, 0);

            // Never swept while unresolved
            assert_eq!(service.sweep_expired().await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_mint_rejection_is_classified() {
        let server = MockServer::start().await;
        provider(&server, "bob", "lnfake62000").await;

        let mut mint = healthy_mint();
        mint.expect_create_melt_quote()
            .returning(|_, _, _| Ok(quote_for(62, 2)));
        mint.expect_melt().returning(|_, _, _| {
            Err(MintError::Rejected {
                status: 400,
                code: Some(11001),
                detail: "Token already spent.".to_string(),
            })
        });

        let service = service_with(mint, "*", None);
        let result = service
            .redeem(&encode_v1(MINT, &[64]), Some(&address("bob", &server)))
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::AlreadySpent));
        let attempt = service
            .get_status(result.attempt_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt.error.unwrap().step, Some(RedemptionState::MeltingToken));
    }

    #[tokio::test]
    async fn test_quote_exceeding_value() {
        let server = MockServer::start().await;
        provider(&server, "bob", "lnfake62000").await;

        let mut mint = healthy_mint();
        mint.expect_create_melt_quote()
            .returning(|_, _, _| Ok(quote_for(62, 5)));
        mint.expect_melt().times(0);

        let service = service_with(mint, "*", None);
        let result = service
            .redeem(&encode_v1(MINT, &[64]), Some(&address("bob", &server)))
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::InsufficientValue));
    }

    #[tokio::test]
    async fn test_invoice_amount_mismatch() {
        let server = MockServer::start().await;
        provider(&server, "bob", "lnfake64000").await;

        let mut mint = healthy_mint();
        mint.expect_create_melt_quote().times(0);

        let service = service_with(mint, "*", None);
        let result = service
            .redeem(&encode_v1(MINT, &[64]), Some(&address("bob", &server)))
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::InvoiceEndpointError));
    }

    #[tokio::test]
    async fn test_panic_marks_attempt_failed() {
        let mut mint = MockMintClient::new();
        mint.expect_get_info()
            .returning(|_| panic!("mint client exploded"));

        let service = service_with(mint, "*", Some("admin@ln.tips".to_string()));
        let result = service.redeem(&encode_v1(MINT, &[64]), None).await;

        assert!(!result.success);
        assert!(!result.paid);
        let error = result.error.unwrap();
        assert!(error.message.contains("mint client exploded"));

        // A failed attempt frees the token for another try
        let stats = service.stats().await.unwrap();
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_unreachable_mint_is_fatal() {
        let mut mint = MockMintClient::new();
        mint.expect_get_info()
            .returning(|_| Err(MintError::Unreachable("connection refused".into())));
        mint.expect_check_spendable().times(0);

        let service = service_with(mint, "*", Some("admin@ln.tips".to_string()));
        let result = service.redeem(&encode_v1(MINT, &[64]), None).await;

        assert_eq!(result.error_kind(), Some(ErrorKind::EndpointUnreachable));
        assert!(result.using_default);
        assert_eq!(result.destination.as_deref(), Some("admin@ln.tips"));
    }

    #[tokio::test]
    async fn test_decode_token() {
        let service = service_with(MockMintClient::new(), "*", None);
        let info = service
            .decode_token(&encode_v1(MINT, &[8, 2, 4]))
            .unwrap();

        assert_eq!(info.mint_url, MINT);
        assert_eq!(info.total_value, 14);
        assert_eq!(info.proof_count, 3);
        assert_eq!(info.denominations, vec![2, 4, 8]);
        assert_eq!(info.format_version, "V1");

        let err = service.decode_token("not a token").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[tokio::test]
    async fn test_check_spendable_reports() {
        let mut mint = MockMintClient::new();
        let mut seq = mockall::Sequence::new();
        mint.expect_check_spendable()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(ProofStates {
                    spendable: vec![true, false],
                    pending: vec![false, false],
                })
            });
        mint.expect_check_spendable()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(MintError::Unsupported("HTTP 405".into())));

        let service = service_with(mint, "*", None);
        let token = encode_v1(MINT, &[8, 2]);

        match service.check_spendable(&token).await.unwrap() {
            SpendableReport::Checked { spendable, total_value, .. } => {
                assert_eq!(spendable, vec![true, false]);
                assert_eq!(total_value, 10);
            }
            other => panic!("unexpected report: {:?}", other),
        }

        assert!(matches!(
            service.check_spendable(&token).await.unwrap(),
            SpendableReport::Unsupported { supported: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_status() {
        let service = service_with(MockMintClient::new(), "*", None);
        assert!(service.get_status("rd_unknown").await.unwrap().is_none());
    }
}

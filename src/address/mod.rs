//! Lightning Address Resolver
//!
//! Turns `user@domain` into a payable invoice:
//!
//! ```text
//! resolve()            format gate + domain allow-list (no network)
//!   └── fetch_capabilities()   GET {scheme}://{domain}/.well-known/lnurlp/{user}
//!         └── check_amount()   min <= amount * 1000 <= max
//!               └── request_invoice()   GET {callback}?amount=<msat>&comment=..
//! ```
//!
//! Failures are terminal for the current attempt; no fallback address is
//! ever substituted here.

pub mod allowlist;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::common::error::RedeemError;
use crate::types::{msat_to_sats_ceil, msat_to_sats_floor, sats_to_msat, AddressValidation, ErrorBody};
pub use allowlist::DomainAllowList;

/// Provider-imposed ceiling on invoice comments
pub const MAX_COMMENT_LENGTH: usize = 144;

/// Default timeout for discovery and invoice calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Intentionally permissive: a format gate, not RFC validation
static ADDRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid address regex"));

/// A syntactically valid Lightning address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightningAddress {
    pub username: String,
    pub domain: String,
}

impl std::fmt::Display for LightningAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.username, self.domain)
    }
}

/// Split and format-check a Lightning address
pub fn parse_address(address: &str) -> Result<LightningAddress, RedeemError> {
    let address = address.trim();

    if !ADDRESS_PATTERN.is_match(address) {
        return Err(RedeemError::InvalidAddressFormat(format!(
            "'{}' is not of the form user@domain",
            address
        )));
    }

    let (username, domain) = address
        .split_once('@')
        .ok_or_else(|| RedeemError::InvalidAddressFormat("missing '@'".to_string()))?;

    if domain.contains(&['/', '?', '#'][..]) {
        return Err(RedeemError::InvalidAddressFormat(format!(
            "'{}' is not a bare domain",
            domain
        )));
    }

    Ok(LightningAddress {
        username: username.to_lowercase(),
        domain: domain.to_lowercase(),
    })
}

/// Pay-request capabilities advertised by an address provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressResolution {
    pub payable: bool,
    pub domain: String,
    pub username: String,
    /// Minimum payable amount in msat
    pub min_amount: u64,
    /// Maximum payable amount in msat
    pub max_amount: u64,
    pub comment_max_length: u32,
    pub callback_url: Url,
}

impl AddressResolution {
    /// Require `min <= amount * 1000 <= max`
    pub fn check_amount(&self, amount: u64) -> Result<(), RedeemError> {
        let msat = sats_to_msat(amount);
        if msat < self.min_amount || msat > self.max_amount {
            return Err(RedeemError::AmountOutOfRange(format!(
                "{} sats is outside the payable range {}-{} sats for {}@{}",
                amount,
                msat_to_sats_ceil(self.min_amount),
                msat_to_sats_floor(self.max_amount),
                self.username,
                self.domain
            )));
        }
        Ok(())
    }
}

/// Invoice returned by the provider callback
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceResponse {
    pub invoice: String,
    pub success_action: Option<Value>,
}

/// Lightning address resolver
#[derive(Debug, Clone)]
pub struct AddressResolver {
    client: Client,
    allow_list: DomainAllowList,
    scheme: String,
}

impl AddressResolver {
    pub fn new(allow_list: DomainAllowList, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            allow_list,
            scheme: "https".to_string(),
        }
    }

    /// Override the discovery scheme (plain `http` for local providers)
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    pub fn allow_list(&self) -> &DomainAllowList {
        &self.allow_list
    }

    /// Format gate and allow-list check; never touches the network
    pub fn resolve(&self, address: &str) -> Result<LightningAddress, RedeemError> {
        let parsed = parse_address(address)?;
        self.allow_list.check(&parsed.domain)?;
        Ok(parsed)
    }

    fn well_known_url(&self, domain: &str, username: &str) -> Result<Url, RedeemError> {
        let raw = format!(
            "{}://{}/.well-known/lnurlp/{}",
            self.scheme, domain, username
        );
        Url::parse(&raw).map_err(|e| {
            RedeemError::InvalidAddressFormat(format!("cannot build discovery url: {}", e))
        })
    }

    /// Fetch pay-request capabilities from the well-known endpoint
    pub async fn fetch_capabilities(
        &self,
        domain: &str,
        username: &str,
    ) -> Result<AddressResolution, RedeemError> {
        let url = self.well_known_url(domain, username)?;

        let resp = self.client.get(url.clone()).send().await.map_err(|e| {
            RedeemError::EndpointUnreachable(format!("{}: {}", domain, describe_transport(&e)))
        })?;

        if !resp.status().is_success() {
            return Err(RedeemError::EndpointUnreachable(format!(
                "{} answered HTTP {}",
                domain,
                resp.status().as_u16()
            )));
        }

        let body: Value = resp.json().await.map_err(|e| {
            RedeemError::MalformedResponse(format!("{} returned invalid JSON: {}", domain, e))
        })?;

        parse_capabilities(&body, domain, username)
    }

    /// Request an invoice for `amount` whole units
    pub async fn request_invoice(
        &self,
        resolution: &AddressResolution,
        amount: u64,
        comment: Option<&str>,
    ) -> Result<InvoiceResponse, RedeemError> {
        resolution.check_amount(amount)?;

        let mut url = resolution.callback_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("amount", &sats_to_msat(amount).to_string());

            let limit = (resolution.comment_max_length as usize).min(MAX_COMMENT_LENGTH);
            if let Some(comment) = comment.filter(|c| !c.is_empty() && limit > 0) {
                let truncated: String = comment.chars().take(limit).collect();
                query.append_pair("comment", &truncated);
            }
        }

        let resp = self.client.get(url).send().await.map_err(|e| {
            RedeemError::InvoiceEndpointError(format!(
                "callback for {}: {}",
                resolution.domain,
                describe_transport(&e)
            ))
        })?;

        let status = resp.status();
        let body: Value = resp.json().await.map_err(|e| {
            RedeemError::InvoiceEndpointError(format!(
                "callback for {} returned invalid JSON: {}",
                resolution.domain, e
            ))
        })?;

        if let Some(reason) = error_reason(&body) {
            return Err(RedeemError::InvoiceEndpointError(reason));
        }
        if !status.is_success() {
            return Err(RedeemError::InvoiceEndpointError(format!(
                "callback answered HTTP {}",
                status.as_u16()
            )));
        }

        let invoice = body
            .get("pr")
            .and_then(Value::as_str)
            .filter(|pr| !pr.is_empty())
            .ok_or_else(|| {
                RedeemError::InvoiceEndpointError("callback response has no invoice".to_string())
            })?;

        Ok(InvoiceResponse {
            invoice: invoice.to_string(),
            success_action: body.get("successAction").filter(|v| !v.is_null()).cloned(),
        })
    }

    /// Resolve an address end to end, without requesting an invoice
    pub async fn validate(&self, address: &str) -> AddressValidation {
        let parsed = match self.resolve(address) {
            Ok(parsed) => parsed,
            Err(e) => return invalid(None, &e),
        };

        match self.fetch_capabilities(&parsed.domain, &parsed.username).await {
            Ok(resolution) => AddressValidation {
                valid: resolution.payable,
                domain: Some(resolution.domain.clone()),
                min_amount: Some(msat_to_sats_ceil(resolution.min_amount)),
                max_amount: Some(msat_to_sats_floor(resolution.max_amount)),
                comment_max_length: Some(resolution.comment_max_length),
                error: None,
            },
            Err(e) => invalid(Some(parsed.domain), &e),
        }
    }
}

fn invalid(domain: Option<String>, err: &RedeemError) -> AddressValidation {
    AddressValidation {
        valid: false,
        domain,
        min_amount: None,
        max_amount: None,
        comment_max_length: None,
        error: Some(ErrorBody::from(err)),
    }
}

fn describe_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.to_string()
    }
}

/// LUD-06 style `{"status":"ERROR","reason":..}`
fn error_reason(body: &Value) -> Option<String> {
    let status = body.get("status").and_then(Value::as_str)?;
    if !status.eq_ignore_ascii_case("ERROR") {
        return None;
    }
    Some(
        body.get("reason")
            .and_then(Value::as_str)
            .unwrap_or("provider reported an error")
            .to_string(),
    )
}

fn amount_field(body: &Value, key: &str) -> Option<u64> {
    let value = body.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

fn parse_capabilities(
    body: &Value,
    domain: &str,
    username: &str,
) -> Result<AddressResolution, RedeemError> {
    if let Some(reason) = error_reason(body) {
        return Err(RedeemError::MalformedResponse(format!("{}: {}", domain, reason)));
    }

    if let Some(tag) = body.get("tag").and_then(Value::as_str) {
        if tag != "payRequest" {
            return Err(RedeemError::MalformedResponse(format!(
                "{} advertised tag '{}' instead of payRequest",
                domain, tag
            )));
        }
    }

    let callback = body
        .get("callback")
        .and_then(Value::as_str)
        .ok_or_else(|| RedeemError::MalformedResponse(format!("{} sent no callback", domain)))?;
    let callback_url = Url::parse(callback).map_err(|e| {
        RedeemError::MalformedResponse(format!("{} sent an invalid callback: {}", domain, e))
    })?;

    let min_amount = amount_field(body, "minSendable")
        .ok_or_else(|| RedeemError::MalformedResponse(format!("{} sent no minSendable", domain)))?;
    let max_amount = amount_field(body, "maxSendable")
        .ok_or_else(|| RedeemError::MalformedResponse(format!("{} sent no maxSendable", domain)))?;

    if min_amount > max_amount {
        return Err(RedeemError::MalformedResponse(format!(
            "{} advertised minSendable {} above maxSendable {}",
            domain, min_amount, max_amount
        )));
    }

    let comment_max_length = body
        .get("commentAllowed")
        .and_then(Value::as_u64)
        .map(|n| n.min(u64::from(u32::MAX)) as u32)
        .unwrap_or(0);

    Ok(AddressResolution {
        payable: max_amount > 0,
        domain: domain.to_string(),
        username: username.to_string(),
        min_amount,
        max_amount,
        comment_max_length,
        callback_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_resolver(allow: &str) -> AddressResolver {
        AddressResolver::new(DomainAllowList::parse(allow), DEFAULT_TIMEOUT).with_scheme("http")
    }

    fn server_domain(server: &MockServer) -> String {
        server.address().to_string()
    }

    fn resolution(min: u64, max: u64, comment: u32) -> AddressResolution {
        AddressResolution {
            payable: true,
            domain: "ln.tips".to_string(),
            username: "user".to_string(),
            min_amount: min,
            max_amount: max,
            comment_max_length: comment,
            callback_url: Url::parse("https://ln.tips/cb").unwrap(),
        }
    }

    #[test]
    fn test_address_format() {
        assert!(parse_address("user@ln.tips").is_ok());
        assert_eq!(
            parse_address(" User@GetAlby.com ").unwrap(),
            LightningAddress {
                username: "user".to_string(),
                domain: "getalby.com".to_string()
            }
        );

        for bad in ["", "user", "user@", "@ln.tips", "user@localhost", "a b@ln.tips", "u@ln.tips/x"] {
            assert!(
                matches!(parse_address(bad), Err(RedeemError::InvalidAddressFormat(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_allow_list_gate() {
        let resolver = AddressResolver::new(
            DomainAllowList::parse("ln.tips,getalby.com"),
            DEFAULT_TIMEOUT,
        );

        assert!(matches!(
            resolver.resolve("user@evil.com"),
            Err(RedeemError::DomainNotAllowed(_))
        ));
        assert!(resolver.resolve("user@ln.tips").is_ok());
        assert!(resolver.resolve("USER@GETALBY.COM").is_ok());
    }

    #[test]
    fn test_amount_bounds_inclusive() {
        let res = resolution(1_000, 100_000_000, 0);

        let err = res.check_amount(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmountOutOfRange);
        assert!(err.message().contains("1-100000 sats"));

        assert!(res.check_amount(1).is_ok());
        assert!(res.check_amount(100_000).is_ok());
        assert!(res.check_amount(100_001).is_err());
    }

    #[test]
    fn test_parse_capabilities_requires_fields() {
        let ok = serde_json::json!({
            "tag": "payRequest",
            "callback": "https://ln.tips/cb",
            "minSendable": 1000,
            "maxSendable": 5000,
            "commentAllowed": 255
        });
        let res = parse_capabilities(&ok, "ln.tips", "user").unwrap();
        assert_eq!(res.comment_max_length, 255);
        assert!(res.payable);

        for body in [
            serde_json::json!({"minSendable": 1, "maxSendable": 2}),
            serde_json::json!({"callback": "https://ln.tips/cb", "maxSendable": 2}),
            serde_json::json!({"callback": "https://ln.tips/cb", "minSendable": 1}),
            serde_json::json!({"callback": "not a url", "minSendable": 1, "maxSendable": 2}),
            serde_json::json!({"callback": "https://ln.tips/cb", "minSendable": 5, "maxSendable": 2}),
            serde_json::json!({"status": "ERROR", "reason": "unknown user"}),
            serde_json::json!({"tag": "withdrawRequest", "callback": "https://ln.tips/cb", "minSendable": 1, "maxSendable": 2}),
        ] {
            let err = parse_capabilities(&body, "ln.tips", "user").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedResponse, "body {}", body);
        }
    }

    #[tokio::test]
    async fn test_fetch_capabilities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/lnurlp/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tag": "payRequest",
                "callback": format!("{}/lnurlp/alice/callback", server.uri()),
                "minSendable": 1000,
                "maxSendable": 100000000,
                "commentAllowed": 32,
                "metadata": "[[\"text/plain\",\"alice\"]]"
            })))
            .mount(&server)
            .await;

        let resolver = local_resolver("*");
        let res = resolver
            .fetch_capabilities(&server_domain(&server), "alice")
            .await
            .unwrap();

        assert_eq!(res.min_amount, 1_000);
        assert_eq!(res.max_amount, 100_000_000);
        assert_eq!(res.comment_max_length, 32);
    }

    #[tokio::test]
    async fn test_fetch_capabilities_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = local_resolver("*")
            .fetch_capabilities(&server_domain(&server), "nobody")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndpointUnreachable);
    }

    #[tokio::test]
    async fn test_request_invoice_sends_amount_and_truncated_comment() {
        let server = MockServer::start().await;
        let long_comment = "x".repeat(200);
        Mock::given(method("GET"))
            .and(path("/cb"))
            .and(query_param("amount", "20580000"))
            .and(query_param("comment", "x".repeat(144)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "pr": "lnbc205800n1fakeinvoice",
                "routes": [],
                "successAction": {"tag": "message", "message": "thanks"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut res = resolution(1_000, 100_000_000, 255);
        res.callback_url = Url::parse(&format!("{}/cb", server.uri())).unwrap();

        let invoice = local_resolver("*")
            .request_invoice(&res, 20_580, Some(&long_comment))
            .await
            .unwrap();

        assert_eq!(invoice.invoice, "lnbc205800n1fakeinvoice");
        assert!(invoice.success_action.is_some());
    }

    #[tokio::test]
    async fn test_request_invoice_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ERROR",
                "reason": "amount too large"
            })))
            .mount(&server)
            .await;

        let mut res = resolution(1_000, 100_000_000, 0);
        res.callback_url = Url::parse(&format!("{}/cb", server.uri())).unwrap();

        let err = local_resolver("*")
            .request_invoice(&res, 500, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvoiceEndpointError);
        assert!(err.message().contains("amount too large"));
    }

    #[tokio::test]
    async fn test_request_invoice_out_of_range_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut res = resolution(10_000, 20_000, 0);
        res.callback_url = Url::parse(&format!("{}/cb", server.uri())).unwrap();

        let err = local_resolver("*")
            .request_invoice(&res, 5, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmountOutOfRange);
    }

    #[tokio::test]
    async fn test_validate_reports_bounds_in_sats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/lnurlp/bob"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "callback": format!("{}/cb", server.uri()),
                "minSendable": 1500,
                "maxSendable": 2000999
            })))
            .mount(&server)
            .await;

        let domain = server_domain(&server);
        let report = local_resolver("*")
            .validate(&format!("bob@{}", domain))
            .await;

        assert!(report.valid);
        assert_eq!(report.min_amount, Some(2));
        assert_eq!(report.max_amount, Some(2000));
        assert_eq!(report.comment_max_length, Some(0));

        let rejected = local_resolver("ln.tips").validate("bob@evil.com").await;
        assert!(!rejected.valid);
        assert_eq!(rejected.error.unwrap().kind, ErrorKind::DomainNotAllowed);
    }
}

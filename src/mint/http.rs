//! HTTP Mint Client
//!
//! Speaks the mint REST API:
//! - `GET  {mint}/v1/info`
//! - `POST {mint}/v1/melt/quote/bolt11`
//! - `POST {mint}/v1/melt/bolt11`
//! - `POST {mint}/v1/checkstate` (proof state by `Y`)
//! - `POST {mint}/check` (legacy spendability, tried when checkstate is absent)
//!
//! Melt blocks until the mint has tried the Lightning payment, so it runs
//! under its own, longer timeout.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::curve::secret_y;
use super::{MeltQuote, MeltResult, MintClient, MintError, MintInfo, ProofStates};
use crate::token::Proof;

/// Mint client over HTTP
#[derive(Debug, Clone)]
pub struct HttpMintClient {
    client: Client,
    timeout: Duration,
    melt_timeout: Duration,
}

/// Default bound on a melt submission
pub const DEFAULT_MELT_TIMEOUT: Duration = Duration::from_secs(300);

impl HttpMintClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
            melt_timeout: DEFAULT_MELT_TIMEOUT.max(timeout),
        }
    }

    pub fn with_melt_timeout(mut self, melt_timeout: Duration) -> Self {
        self.melt_timeout = melt_timeout;
        self
    }

    fn endpoint(mint_url: &str, path: &str) -> String {
        format!("{}{}", mint_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, url: &str) -> Result<Value, MintError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(resp).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Value, MintError> {
        let resp = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(resp).await
    }
}

impl Default for HttpMintClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[derive(Serialize)]
struct MeltQuoteRequest<'a> {
    request: &'a str,
    unit: &'a str,
}

#[derive(Serialize)]
struct MeltRequest<'a> {
    quote: &'a str,
    inputs: &'a [Proof],
}

#[derive(Serialize)]
struct SecretRef<'a> {
    secret: &'a str,
}

#[derive(Serialize)]
struct CheckStateRequest<'a> {
    #[serde(rename = "Ys")]
    ys: &'a [String],
}

#[derive(Serialize)]
struct CheckRequest<'a> {
    proofs: Vec<SecretRef<'a>>,
}

#[async_trait]
impl MintClient for HttpMintClient {
    async fn get_info(&self, mint_url: &str) -> Result<MintInfo, MintError> {
        let body = self.get_json(&Self::endpoint(mint_url, "/v1/info")).await?;

        if !body.is_object() {
            return Err(MintError::Malformed("info is not an object".to_string()));
        }

        Ok(MintInfo {
            name: str_field(&body, "name"),
            version: str_field(&body, "version"),
            pubkey: str_field(&body, "pubkey"),
        })
    }

    async fn create_melt_quote(
        &self,
        mint_url: &str,
        invoice: &str,
        unit: &str,
    ) -> Result<MeltQuote, MintError> {
        let body = self
            .post_json(
                &Self::endpoint(mint_url, "/v1/melt/quote/bolt11"),
                &MeltQuoteRequest {
                    request: invoice,
                    unit,
                },
                self.timeout,
            )
            .await?;

        let quote_id = str_field(&body, "quote")
            .ok_or_else(|| MintError::Malformed("melt quote has no id".to_string()))?;
        let amount = body
            .get("amount")
            .and_then(Value::as_u64)
            .ok_or_else(|| MintError::Malformed("melt quote has no amount".to_string()))?;
        let fee_reserve = body
            .get("fee_reserve")
            .and_then(Value::as_u64)
            .ok_or_else(|| MintError::Malformed("melt quote has no fee_reserve".to_string()))?;

        Ok(MeltQuote {
            quote_id,
            amount,
            fee_reserve,
            state: str_field(&body, "state"),
            expiry: body.get("expiry").and_then(Value::as_u64),
        })
    }

    async fn melt(
        &self,
        mint_url: &str,
        quote: &MeltQuote,
        proofs: &[Proof],
    ) -> Result<MeltResult, MintError> {
        let body = self
            .post_json(
                &Self::endpoint(mint_url, "/v1/melt/bolt11"),
                &MeltRequest {
                    quote: &quote.quote_id,
                    inputs: proofs,
                },
                self.melt_timeout,
            )
            .await?;

        if !body.is_object() {
            return Err(MintError::Malformed("melt response is not an object".to_string()));
        }

        Ok(parse_melt_result(&body))
    }

    async fn check_spendable(
        &self,
        mint_url: &str,
        secrets: &[String],
    ) -> Result<ProofStates, MintError> {
        match self.check_state(mint_url, secrets).await {
            Err(e) if e.is_unsupported() => self.check_legacy(mint_url, secrets).await,
            other => other,
        }
    }
}

impl HttpMintClient {
    async fn check_state(
        &self,
        mint_url: &str,
        secrets: &[String],
    ) -> Result<ProofStates, MintError> {
        let ys = secrets
            .iter()
            .map(|s| secret_y(s))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| MintError::Malformed("secret does not map to a curve point".to_string()))?;

        let body = self
            .post_json(
                &Self::endpoint(mint_url, "/v1/checkstate"),
                &CheckStateRequest { ys: &ys },
                self.timeout,
            )
            .await?;

        let states = body
            .get("states")
            .and_then(Value::as_array)
            .ok_or_else(|| MintError::Malformed("checkstate response has no states".to_string()))?;

        let mut result = ProofStates {
            spendable: Vec::with_capacity(ys.len()),
            pending: Vec::with_capacity(ys.len()),
        };
        for y in &ys {
            let entry = states
                .iter()
                .find(|s| s.get("Y").and_then(Value::as_str) == Some(y.as_str()))
                .ok_or_else(|| MintError::Malformed(format!("checkstate omitted proof {}", y)))?;

            let (spendable, pending) = match entry.get("state").and_then(Value::as_str) {
                Some("UNSPENT") => (true, false),
                Some("PENDING") => (false, true),
                Some("SPENT") => (false, false),
                other => {
                    return Err(MintError::Malformed(format!(
                        "unknown proof state {:?}",
                        other
                    )))
                }
            };
            result.spendable.push(spendable);
            result.pending.push(pending);
        }

        Ok(result)
    }

    async fn check_legacy(
        &self,
        mint_url: &str,
        secrets: &[String],
    ) -> Result<ProofStates, MintError> {
        let request = CheckRequest {
            proofs: secrets.iter().map(|s| SecretRef { secret: s }).collect(),
        };
        let body = self
            .post_json(&Self::endpoint(mint_url, "/check"), &request, self.timeout)
            .await?;

        let spendable = bool_list(&body, "spendable")
            .ok_or_else(|| MintError::Malformed("check response has no spendable list".to_string()))?;
        let pending = bool_list(&body, "pending").unwrap_or_else(|| vec![false; spendable.len()]);

        if spendable.len() != secrets.len() || pending.len() != secrets.len() {
            return Err(MintError::Malformed(format!(
                "check response covers {} proofs, expected {}",
                spendable.len(),
                secrets.len()
            )));
        }

        Ok(ProofStates { spendable, pending })
    }
}

fn transport_error(err: reqwest::Error) -> MintError {
    if err.is_timeout() {
        MintError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_builder() {
        MintError::Unreachable(err.to_string())
    } else {
        MintError::Interrupted(err.to_string())
    }
}

async fn read_json(resp: Response) -> Result<Value, MintError> {
    let status = resp.status();

    if matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
    ) {
        return Err(MintError::Unsupported(format!(
            "{} answered HTTP {}",
            resp.url().path(),
            status.as_u16()
        )));
    }

    let text = resp.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(rejection(status.as_u16(), &text));
    }

    serde_json::from_str(&text).map_err(|e| MintError::Malformed(e.to_string()))
}

/// Mint error bodies look like `{"detail": "...", "code": 11001}`
fn rejection(status: u16, text: &str) -> MintError {
    let body: Option<Value> = serde_json::from_str(text).ok();
    let code = body
        .as_ref()
        .and_then(|b| b.get("code"))
        .and_then(Value::as_u64);
    let detail = body
        .as_ref()
        .and_then(|b| str_field(b, "detail").or_else(|| str_field(b, "error")))
        .unwrap_or_else(|| text.chars().take(200).collect());

    MintError::Rejected {
        status,
        code,
        detail,
    }
}

fn parse_melt_result(body: &Value) -> MeltResult {
    let payment_proof = str_field(body, "payment_preimage")
        .or_else(|| str_field(body, "preimage"))
        .filter(|p| !p.is_empty());

    let change_amount = body
        .get("change")
        .and_then(Value::as_array)
        .map(|change| {
            change
                .iter()
                .filter_map(|c| c.get("amount").and_then(Value::as_u64))
                .fold(0u64, u64::saturating_add)
        })
        .unwrap_or(0);

    MeltResult {
        paid: body.get("paid").and_then(Value::as_bool),
        payment_proof,
        state: str_field(body, "state"),
        fee_paid: body.get("fee_paid").and_then(Value::as_u64),
        change_amount,
    }
}

fn str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_list(body: &Value, key: &str) -> Option<Vec<bool>> {
    body.get(key)?
        .as_array()?
        .iter()
        .map(Value::as_bool)
        .collect()
}

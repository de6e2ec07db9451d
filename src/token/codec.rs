//! Ecash Token Codec
//!
//! Decodes the two supported serializations into a [`TokenRecord`]:
//!
//! - `cashuA` (V1): URL-safe base64 of a JSON document
//!   `{"token":[{"mint":..,"proofs":[{"amount","id","secret","C"}]}],"unit","memo"}`
//! - `cashuB` (V2): URL-safe base64 of a CBOR map
//!   `{m: mint, u: unit, d: memo, t: [{i: keyset bytes, p: [{a, s, c}]}]}`
//!
//! No cryptographic verification happens here; proofs are carried opaquely.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ciborium::Value;
use serde::Deserialize;

use super::{Proof, TokenFormat, TokenRecord, V1_PREFIX, V2_PREFIX};
use crate::common::error::RedeemError;

const DEFAULT_UNIT: &str = "sat";

/// Structural token decoding capability
pub trait TokenDecoder: Send + Sync {
    fn decode(&self, raw: &str) -> Result<TokenRecord, RedeemError>;
}

/// Decoder for `cashuA` / `cashuB` tokens
#[derive(Debug, Clone, Default)]
pub struct CashuTokenCodec;

impl TokenDecoder for CashuTokenCodec {
    fn decode(&self, raw: &str) -> Result<TokenRecord, RedeemError> {
        if let Some(payload) = raw.strip_prefix(V1_PREFIX) {
            decode_v1(&decode_base64(payload)?)
        } else if let Some(payload) = raw.strip_prefix(V2_PREFIX) {
            decode_v2(&decode_base64(payload)?)
        } else {
            Err(RedeemError::InvalidFormat(
                "unsupported token version prefix".to_string(),
            ))
        }
    }
}

/// Accepts standard or URL-safe alphabets, padded or not
fn decode_base64(payload: &str) -> Result<Vec<u8>, RedeemError> {
    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| RedeemError::DecodeFailure(format!("invalid base64 payload: {}", e)))
}

#[derive(Debug, Deserialize)]
struct TokenV1 {
    token: Vec<TokenV1Entry>,
    unit: Option<String>,
    memo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenV1Entry {
    mint: String,
    proofs: Vec<ProofV1>,
}

#[derive(Debug, Deserialize)]
struct ProofV1 {
    amount: u64,
    id: String,
    secret: String,
    #[serde(rename = "C")]
    c: String,
}

fn decode_v1(bytes: &[u8]) -> Result<TokenRecord, RedeemError> {
    let token: TokenV1 = serde_json::from_slice(bytes)
        .map_err(|e| RedeemError::DecodeFailure(format!("invalid token JSON: {}", e)))?;

    let mut mint_url: Option<String> = None;
    let mut proofs = Vec::new();

    for entry in token.token {
        let mint = normalize_mint_url(&entry.mint)?;
        match &mint_url {
            Some(existing) if *existing != mint => {
                return Err(RedeemError::DecodeFailure(
                    "tokens spanning multiple mints are not supported".to_string(),
                ));
            }
            Some(_) => {}
            None => mint_url = Some(mint),
        }

        proofs.extend(entry.proofs.into_iter().map(|p| Proof {
            amount: p.amount,
            keyset_id: p.id,
            secret: p.secret,
            c: p.c,
        }));
    }

    let mint_url = mint_url
        .ok_or_else(|| RedeemError::EmptyValue("token contains no mint entries".to_string()))?;

    Ok(TokenRecord {
        mint_url,
        unit: token.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        memo: token.memo,
        proofs,
        format: TokenFormat::V1,
    })
}

fn decode_v2(bytes: &[u8]) -> Result<TokenRecord, RedeemError> {
    let value: Value = ciborium::de::from_reader(bytes)
        .map_err(|e| RedeemError::DecodeFailure(format!("invalid token CBOR: {}", e)))?;

    let root = value
        .as_map()
        .ok_or_else(|| malformed("token root is not a map"))?;

    let mint = text_field(root, "m")?.ok_or_else(|| malformed("missing mint url"))?;
    let unit = text_field(root, "u")?.unwrap_or_else(|| DEFAULT_UNIT.to_string());
    let memo = text_field(root, "d")?;

    let entries = map_get(root, "t")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing proof groups"))?;

    let mut proofs = Vec::new();
    for entry in entries {
        let entry = entry
            .as_map()
            .ok_or_else(|| malformed("proof group is not a map"))?;
        let keyset_id = map_get(entry, "i")
            .and_then(Value::as_bytes)
            .map(hex::encode)
            .ok_or_else(|| malformed("missing keyset id"))?;
        let group = map_get(entry, "p")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing proofs"))?;

        for proof in group {
            let proof = proof
                .as_map()
                .ok_or_else(|| malformed("proof is not a map"))?;
            let amount = map_get(proof, "a")
                .and_then(Value::as_integer)
                .and_then(|i| u64::try_from(i).ok())
                .ok_or_else(|| malformed("invalid proof amount"))?;
            let secret = text_field(proof, "s")?.ok_or_else(|| malformed("missing secret"))?;
            let c = map_get(proof, "c")
                .and_then(Value::as_bytes)
                .map(hex::encode)
                .ok_or_else(|| malformed("missing signature"))?;

            proofs.push(Proof {
                amount,
                keyset_id: keyset_id.clone(),
                secret,
                c,
            });
        }
    }

    Ok(TokenRecord {
        mint_url: normalize_mint_url(&mint)?,
        unit,
        memo,
        proofs,
        format: TokenFormat::V2,
    })
}

fn map_get<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

fn text_field(map: &[(Value, Value)], key: &str) -> Result<Option<String>, RedeemError> {
    match map_get(map, key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(s)) => Ok(Some(s.clone())),
        Some(_) => Err(malformed(&format!("field '{}' is not text", key))),
    }
}

fn malformed(msg: &str) -> RedeemError {
    RedeemError::DecodeFailure(msg.to_string())
}

fn normalize_mint_url(raw: &str) -> Result<String, RedeemError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| RedeemError::DecodeFailure(format!("invalid mint url '{}': {}", raw, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(RedeemError::DecodeFailure(format!(
            "unsupported mint url scheme: {}",
            other
        ))),
    }
}

//! Proof identifiers for state queries
//!
//! Mints index proof state by `Y = hash_to_curve(secret)`, a compressed
//! secp256k1 point, rather than by the secret itself.

use secp256k1::PublicKey;
use sha2::{Digest, Sha256};

const DOMAIN_SEPARATOR: &[u8] = b"Secp256k1_HashToCurve_Cashu_";

/// Map a message onto the curve by hashing until an x-coordinate is valid
pub fn hash_to_curve(message: &[u8]) -> Option<PublicKey> {
    let msg_hash = Sha256::new()
        .chain_update(DOMAIN_SEPARATOR)
        .chain_update(message)
        .finalize();

    for counter in 0u32..(1 << 16) {
        let hash = Sha256::new()
            .chain_update(msg_hash)
            .chain_update(counter.to_le_bytes())
            .finalize();

        let mut candidate = [0u8; 33];
        candidate[0] = 0x02;
        candidate[1..].copy_from_slice(&hash);

        if let Ok(point) = PublicKey::from_slice(&candidate) {
            return Some(point);
        }
    }

    None
}

/// Hex `Y` for a proof secret
pub fn secret_y(secret: &str) -> Option<String> {
    hash_to_curve(secret.as_bytes()).map(|point| hex::encode(point.serialize()))
}

//! Unit Conversion Utilities
//!
//! Token amounts are whole units (sats); Lightning address bounds and
//! invoice amounts are sub-units (msat).

/// Sub-units per unit (msat per sat)
pub const MSAT_PER_SAT: u64 = 1_000;

/// Convert whole units to sub-units, saturating on overflow
pub fn sats_to_msat(sats: u64) -> u64 {
    sats.saturating_mul(MSAT_PER_SAT)
}

/// Smallest whole-unit amount not below `msat`
pub fn msat_to_sats_ceil(msat: u64) -> u64 {
    msat / MSAT_PER_SAT + u64::from(msat % MSAT_PER_SAT != 0)
}

/// Largest whole-unit amount not above `msat`
pub fn msat_to_sats_floor(msat: u64) -> u64 {
    msat / MSAT_PER_SAT
}

/// Convert satoshis to human-readable string
/// e.g., 100000 -> "100,000 sats"
pub fn sats_to_display(sats: u64) -> String {
    format!("{} sats", format_with_commas(sats))
}

/// Format number with thousands separators
fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msat_conversions() {
        assert_eq!(sats_to_msat(1), 1_000);
        assert_eq!(sats_to_msat(u64::MAX), u64::MAX);
        assert_eq!(msat_to_sats_ceil(1), 1);
        assert_eq!(msat_to_sats_ceil(1_000), 1);
        assert_eq!(msat_to_sats_ceil(1_001), 2);
        assert_eq!(msat_to_sats_floor(1_999), 1);
    }

    #[test]
    fn test_display_format() {
        assert_eq!(sats_to_display(0), "0 sats");
        assert_eq!(sats_to_display(1_000_000), "1,000,000 sats");
        assert_eq!(sats_to_display(21_000), "21,000 sats");
    }
}

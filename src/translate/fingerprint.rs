//! Content fingerprints for units without a natural id.
//! blake3 over field bytes with separators, hex encoded. Stable across
//! restarts since nothing process-specific goes into the hash.

use serde_json::Value;

/// Hex characters kept from a scenario fingerprint.
pub const SCENARIO_FINGERPRINT_LEN: usize = 16;

/// Scenario identity: hashes title, briefing and insight, truncated to
/// `SCENARIO_FINGERPRINT_LEN` hex chars. Distinct scenarios sharing these
/// three fields collide.
pub fn scenario_fingerprint(title: &str, briefing: &str, insight: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(briefing.as_bytes());
    hasher.update(b"|");
    hasher.update(insight.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("scn-{}", &hex.as_str()[..SCENARIO_FINGERPRINT_LEN])
}

/// Full-width fingerprint of a JSON value. serde_json maps keep keys
/// sorted, so equal values serialize identically.
pub fn value_fingerprint(value: &Value) -> String {
    let canonical = value.to_string();
    format!("fb-{}", blake3::hash(canonical.as_bytes()).to_hex())
}

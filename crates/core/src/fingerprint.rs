//! Deduplication fingerprint (§3.3).
//!
//! `fingerprint(addon_id, alert_type, device_ip)` is a pure function:
//! `SHA-256(addon_id + ":" + alert_type + ":" + device_ip)` truncated to the
//! first 32 hex characters (16 bytes of digest).

use sha2::{Digest, Sha256};

/// Number of hex characters retained from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 32;

/// Compute the deduplication fingerprint for an alert condition.
///
/// Identical `(addon_id, alert_type, device_ip)` triples always produce the
/// same fingerprint; this is the sole basis for alert deduplication (§3.3,
/// §8 "Fingerprint determinism").
#[must_use]
pub fn compute_fingerprint(addon_id: &str, alert_type: &str, device_ip: &str) -> String {
    let input = format!("{addon_id}:{alert_type}:{device_ip}");
    let digest = Sha256::digest(input.as_bytes());
    let hex = hex::encode(digest);
    hex[..FINGERPRINT_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = compute_fingerprint("siklu", "link_down", "10.0.0.5");
        let b = compute_fingerprint("siklu", "link_down", "10.0.0.5");
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn distinguishes_inputs() {
        let a = compute_fingerprint("siklu", "link_down", "10.0.0.5");
        let b = compute_fingerprint("siklu", "link_down", "10.0.0.6");
        let c = compute_fingerprint("siklu", "link_up", "10.0.0.5");
        let d = compute_fingerprint("prtg", "link_down", "10.0.0.5");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn only_hex_chars() {
        let fp = compute_fingerprint("addon", "type", "1.2.3.4");
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

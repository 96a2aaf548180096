use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a new raw API key (`nwk_<32 hex><32 hex>`, ~256 bits of entropy
/// from two UUIDv4s — this workspace carries no dedicated CSPRNG crate, and
/// `uuid`'s `v4` generator already draws from the OS RNG). Only the hash is
/// ever persisted; the raw value is returned to the caller exactly once.
#[must_use]
pub fn generate_api_key() -> String {
    format!("nwk_{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Hash a raw API key to its storage form (lowercase hex SHA-256).
#[must_use]
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// First 8 characters of the raw key, retained for display (§6.6).
#[must_use]
pub fn key_prefix(raw_key: &str) -> String {
    raw_key.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_unique_and_hash_deterministically() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
        assert_eq!(hash_api_key(&a), hash_api_key(&a));
        assert_ne!(hash_api_key(&a), hash_api_key(&b));
    }
}

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Default API key prefix.
pub const DEFAULT_API_KEY_PREFIX: &str = "sk_live_";

/// Number of random bytes in a key; hex encoding doubles it.
const KEY_ENTROPY_BYTES: usize = 32;

/// Visible leading characters in a masked key.
pub const MASK_VISIBLE_PREFIX: usize = 12;

/// Visible trailing characters in a masked key.
pub const MASK_VISIBLE_SUFFIX: usize = 4;

/// A freshly generated credential.
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// Full key, shown to the caller exactly once.
    pub raw: String,
    /// SHA-256 hex digest stored in the database.
    pub hash: String,
    pub prefix: String,
    pub suffix: String,
}

/// Generate `prefix` followed by 64 lowercase hex characters.
pub fn generate_api_key_with_prefix(prefix: &str) -> GeneratedApiKey {
    let mut bytes = [0u8; KEY_ENTROPY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    let raw = format!("{}{}", prefix, hex::encode(bytes));
    let hash = hash_api_key(&raw);
    let prefix = raw[..MASK_VISIBLE_PREFIX.min(raw.len())].to_string();
    let suffix = raw[raw.len().saturating_sub(MASK_VISIBLE_SUFFIX)..].to_string();

    GeneratedApiKey {
        raw,
        hash,
        prefix,
        suffix,
    }
}

pub fn generate_api_key() -> GeneratedApiKey {
    generate_api_key_with_prefix(DEFAULT_API_KEY_PREFIX)
}

/// Hex-encoded SHA-256 of the key.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Constant-time check of a raw key against a stored hash.
pub fn verify_api_key(raw_key: &str, stored_hash: &str) -> bool {
    hash_api_key(raw_key)
        .as_bytes()
        .ct_eq(stored_hash.as_bytes())
        .into()
}

/// Mask a key for display. The hidden middle is rendered as asterisks of the
/// length it had in the original 72-character key.
pub fn mask_api_key(prefix: &str, suffix: &str) -> String {
    let hidden = (DEFAULT_API_KEY_PREFIX.len() + KEY_ENTROPY_BYTES * 2)
        .saturating_sub(MASK_VISIBLE_PREFIX + MASK_VISIBLE_SUFFIX);
    format!("{}{}{}", prefix, "*".repeat(hidden), suffix)
}

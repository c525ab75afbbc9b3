//! Token hashing and constant-time comparison helpers.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hash a bearer token for storage/lookup. Tokens are high-entropy random
/// strings, so a plain SHA-256 (no salt/stretching) is sufficient.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string equality for secret comparison.
pub fn secrets_equal(a: &str, b: &str) -> bool {
    // Length is not secret; mismatched lengths fail fast.
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Generate a random alphanumeric suffix for provider references.
pub fn random_suffix(len: usize) -> String {
    use rand::Rng;
    const CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

//! One-way digests and random secrets for codes and refresh tokens.

use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const REFRESH_TOKEN_BYTES: usize = 40;

/// SHA-256 hex digest. Used for OTP codes and refresh tokens, which are
/// high-entropy or short-lived enough that a slow KDF buys nothing.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Constant-time comparison of two hex digests.
pub fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Uniform six-digit numeric code.
pub fn generate_numeric_code() -> String {
    OsRng.gen_range(100_000u32..1_000_000).to_string()
}

/// Hex-encoded random refresh token.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_hex() {
        let a = hash_token("123456");
        assert_eq!(a, hash_token("123456"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_token("123457"));
    }

    #[test]
    fn test_digests_match() {
        let h = hash_token("abc");
        assert!(digests_match(&h, &hash_token("abc")));
        assert!(!digests_match(&h, &hash_token("abd")));
        assert!(!digests_match(&h, "short"));
    }

    #[test]
    fn test_numeric_code_shape() {
        for _ in 0..100 {
            let code = generate_numeric_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let a = generate_refresh_token();
        assert_eq!(a.len(), REFRESH_TOKEN_BYTES * 2);
        assert_ne!(a, generate_refresh_token());
    }
}

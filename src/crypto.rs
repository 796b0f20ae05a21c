//! Token generation and hashing for API keys and download tokens.

use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix for API key secrets
pub const API_KEY_PREFIX: &str = "rk-";

/// Generates an API key with 256 bits of entropy.
///
/// The key is formatted as `rk-{base64url_encoded_random_bytes}` where the
/// random bytes are 32 bytes of cryptographically secure random data.
pub fn generate_api_key() -> String {
    let mut key_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key_bytes);

    format!("{}{}", API_KEY_PREFIX, general_purpose::URL_SAFE_NO_PAD.encode(key_bytes))
}

/// One-way hash of an API key secret, used as the lookup column.
///
/// Keys are high-entropy random tokens, not passwords, so a plain SHA-256
/// suffices; the plaintext secret is never stored.
pub fn hash_api_key(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Truncated display form stored alongside the hash (e.g. `rk-Ab3dEf…`).
pub fn key_prefix(secret: &str) -> String {
    secret.chars().take(10).collect()
}

/// Mints an unguessable download token for a completed job's output.
///
/// The token is a bearer credential: anyone holding it can fetch the file
/// without further authentication, so it carries the same entropy as an
/// API key.
pub fn generate_download_token() -> String {
    let mut token_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut token_bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_api_key_format() {
        let key = generate_api_key();

        assert!(key.starts_with("rk-"));
        // "rk-" (3) + base64url(32 bytes) (43)
        assert_eq!(key.len(), 46);

        let key_part = &key[3..];
        assert!(key_part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_generate_api_key_uniqueness() {
        let mut keys = HashSet::new();
        for _ in 0..1000 {
            assert!(keys.insert(generate_api_key()), "Generated duplicate API key");
        }
    }

    #[test]
    fn test_hash_is_deterministic_and_hex() {
        let key = generate_api_key();
        let h1 = hash_api_key(&key);
        let h2 = hash_api_key(&key);

        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));

        // Different key, different hash
        assert_ne!(hash_api_key(&generate_api_key()), h1);
    }

    #[test]
    fn test_key_prefix_truncates() {
        let key = generate_api_key();
        let prefix = key_prefix(&key);
        assert_eq!(prefix.len(), 10);
        assert!(key.starts_with(&prefix));
    }

    #[test]
    fn test_download_token_no_padding() {
        let token = generate_download_token();
        assert!(!token.contains('='));
        assert_eq!(token.len(), 43);
    }
}

//! Cryptographic utility functions

use anyhow::{Result, bail};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a cryptographically secure random key
pub fn generate_key(len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Generate a 256-bit (32 byte) signing key
pub fn generate_signing_key() -> Vec<u8> {
    generate_key(32)
}

/// Generate a cryptographically secure random hex token
pub fn generate_token(byte_len: usize) -> String {
    hex::encode(generate_key(byte_len))
}

/// Constant-time string comparison to prevent timing attacks
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Calculate SHA256 hash and return as hex string
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a client secret with a fresh random salt.
///
/// Stored form is `salt$digest` where digest = SHA256(salt || secret),
/// both hex encoded.
pub fn hash_secret(secret: &str) -> String {
    let salt = generate_token(16);
    let digest = sha256_hex(&format!("{}{}", salt, secret));
    format!("{}${}", salt, digest)
}

/// Verify a client secret against its stored `salt$digest` hash in
/// constant time.
pub fn verify_secret(secret: &str, stored: &str) -> Result<bool> {
    let Some((salt, digest)) = stored.split_once('$') else {
        bail!("Malformed secret hash");
    };
    let candidate = sha256_hex(&format!("{}{}", salt, secret));
    Ok(constant_time_eq(&candidate, digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_length() {
        assert_eq!(generate_key(16).len(), 16);
        assert_eq!(generate_key(32).len(), 32);
        assert_eq!(generate_signing_key().len(), 32);
    }

    #[test]
    fn test_generate_token_is_hex() {
        let token = generate_token(32);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_and_verify_secret() {
        let secret = "super-secret";
        let stored = hash_secret(secret);
        assert!(stored.contains('$'));
        assert!(verify_secret(secret, &stored).unwrap());
        assert!(!verify_secret("wrong", &stored).unwrap());
    }

    #[test]
    fn test_hash_secret_is_salted() {
        let a = hash_secret("same");
        let b = hash_secret("same");
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(verify_secret("x", "no-dollar-sign").is_err());
    }
}

//! Digest functions used for request keys.

use std::sync::Arc;

use ring::digest;

/// Pluggable digest: text in, lowercase hex out, `None` when no digest can
/// be produced.
pub type HashFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// SHA-256 over the lower-cased UTF-8 input, as lowercase hex.
///
/// This is the digest the backend verifies keys with. Input is lower-cased
/// before hashing, so `GET` and `get` hash identically.
pub fn sha256_lowercase_hex(input: &str) -> Option<String> {
    let lowered = input.to_lowercase();
    let hash = digest::digest(&digest::SHA256, lowered.as_bytes());
    Some(hex::encode(hash.as_ref()))
}

/// The production digest as a [`HashFn`].
pub fn default_hash() -> HashFn {
    Arc::new(sha256_lowercase_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(
            sha256_lowercase_hex("").unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_input_is_lowercased() {
        assert_eq!(sha256_lowercase_hex("GET"), sha256_lowercase_hex("get"));
        assert_ne!(sha256_lowercase_hex("GET"), sha256_lowercase_hex("PUT"));
    }

    #[test]
    fn test_output_is_lowercase_hex() {
        let hash = sha256_lowercase_hex("{\"name\":\"Todo\"}").unwrap();
        assert_eq!(
            hash,
            "f6dae2d0b89e382d1bf42ccc015649a5d51963423e406932f07638493ae99663"
        );
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}

//! Content digests for payload integrity checks.
//!
//! Digests are lowercase hex SHA-256 over the *decoded* document bytes, the
//! same value publishers put in the `Original-SHA256` tag.

use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

/// Case-insensitive comparison of two hex digests (surrounding whitespace ignored).
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn comparison_ignores_case() {
        let d = sha256_hex(b"{}");
        assert!(digests_match(&d.to_uppercase(), &d));
        assert!(!digests_match("00", &d));
    }
}

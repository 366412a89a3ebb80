//! SHA-1 hex digests and prefix-based routing.

use sha1::{Digest, Sha1};

/// Returns the 40-character lowercase hex SHA-1 digest of `key`.
pub fn sha1_hex(key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key);
    hex::encode(hasher.finalize())
}

/// Returns the first `prefix_len` hex characters of `sha1_hex(key)`.
///
/// Panics if `prefix_len` exceeds 40 — callers never construct a `Table`
/// with a prefix length that large.
pub fn prefix_of(key: &[u8], prefix_len: usize) -> String {
    let digest = sha1_hex(key);
    digest[..prefix_len].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        // echo -n "asdf" | sha1sum
        assert_eq!(sha1_hex(b"asdf"), "3da541559918a808c2402bba5012f6c60b27661");
    }

    #[test]
    fn prefix_is_stable_across_calls() {
        let a = prefix_of(b"hello world", 1);
        let b = prefix_of(b"hello world", 1);
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn prefix_matches_digest_head() {
        let digest = sha1_hex(b"zht");
        let prefix = prefix_of(b"zht", 4);
        assert!(digest.starts_with(&prefix));
        assert_eq!(prefix.len(), 4);
    }
}

//! Key/value/timestamp records and last-writer-wins merge.

use crate::hash::sha1_hex;
use bytes::Bytes;

/// A single stored record: a key, its value, and the external write timestamp.
///
/// `hash` is cached at construction time so routing and bucket-membership
/// checks never recompute SHA-1.
#[derive(Debug, Clone)]
pub struct Entry {
    key: Bytes,
    hash: String,
    value: Bytes,
    /// `None` compares less than any real timestamp — the first write to a
    /// freshly allocated entry always wins.
    timestamp: Option<f64>,
}

impl Entry {
    /// Allocates an entry for `key` with no value yet (null timestamp).
    pub fn new(key: Bytes) -> Self {
        let hash = sha1_hex(&key);
        Self {
            key,
            hash,
            value: Bytes::new(),
            timestamp: None,
        }
    }

    /// Allocates an entry and immediately writes `value` at `timestamp`.
    pub fn with_value(key: Bytes, value: Bytes, timestamp: f64) -> Self {
        let mut entry = Self::new(key);
        entry.timestamp = Some(timestamp);
        entry.value = value;
        entry
    }

    /// The key this entry stores a value for.
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    /// The 40-character lowercase hex SHA-1 digest of `key`.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// The current value. Empty if never written.
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// The current timestamp, or `None` if never written.
    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    /// Applies a last-writer-wins merge.
    ///
    /// Replaces the value and timestamp when the current timestamp is null
    /// or strictly less than `new_timestamp`. Ties keep the existing value —
    /// first write wins for equal timestamps. Returns whether the entry was
    /// mutated.
    pub fn merge(&mut self, new_value: Bytes, new_timestamp: f64) -> bool {
        let should_replace = match self.timestamp {
            None => true,
            Some(current) => current < new_timestamp,
        };
        if should_replace {
            self.value = new_value;
            self.timestamp = Some(new_timestamp);
        }
        should_replace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_always_wins_over_null_timestamp() {
        let mut entry = Entry::new(Bytes::from_static(b"k"));
        assert!(entry.merge(Bytes::from_static(b"v1"), 100.0));
        assert_eq!(entry.value(), &Bytes::from_static(b"v1"));
        assert_eq!(entry.timestamp(), Some(100.0));
    }

    #[test]
    fn later_timestamp_replaces_value() {
        let mut entry = Entry::with_value(Bytes::from_static(b"k"), Bytes::from_static(b"v1"), 100.0);
        assert!(entry.merge(Bytes::from_static(b"v2"), 200.0));
        assert_eq!(entry.value(), &Bytes::from_static(b"v2"));
    }

    #[test]
    fn earlier_timestamp_is_rejected() {
        let mut entry = Entry::with_value(Bytes::from_static(b"k"), Bytes::from_static(b"v1"), 200.0);
        assert!(!entry.merge(Bytes::from_static(b"v0"), 100.0));
        assert_eq!(entry.value(), &Bytes::from_static(b"v1"));
    }

    #[test]
    fn tied_timestamp_keeps_first_write() {
        let mut entry = Entry::with_value(Bytes::from_static(b"k"), Bytes::from_static(b"v1"), 100.0);
        assert!(!entry.merge(Bytes::from_static(b"v2"), 100.0));
        assert_eq!(entry.value(), &Bytes::from_static(b"v1"));
    }

    #[test]
    fn idempotent_replay_of_same_update() {
        let mut entry = Entry::new(Bytes::from_static(b"k"));
        assert!(entry.merge(Bytes::from_static(b"v1"), 100.0));
        assert!(!entry.merge(Bytes::from_static(b"v1"), 100.0));
    }
}

//! Owned/unowned containers of entries under one hash prefix.

use crate::entry::Entry;
use crate::error::StoreError;
use bytes::Bytes;
use hashbrown::HashMap;

/// A container for entries whose key hash shares `prefix`.
///
/// Owned buckets are authoritative: reads of a missing key report
/// [`StoreError::KeyMissing`] and writes are accepted. Unowned buckets are
/// routing stubs used only while this node caches entries it saw in transit;
/// they reject writes and report [`StoreError::UncachedLookup`] for keys
/// they haven't cached.
#[derive(Debug, Clone)]
pub struct Bucket {
    prefix: String,
    owned: bool,
    entries: HashMap<Bytes, Entry>,
}

impl Bucket {
    /// Creates an empty bucket for `prefix`.
    pub fn new(prefix: impl Into<String>, owned: bool) -> Self {
        Self {
            prefix: prefix.into(),
            owned,
            entries: HashMap::new(),
        }
    }

    /// The hex prefix this bucket answers for.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether this bucket is authoritative for its prefix.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bucket holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates all `(key, entry)` pairs currently stored.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Entry)> {
        self.entries.iter()
    }

    /// Reads the entry for `key`.
    pub fn get(&self, key: &Bytes) -> Result<&Entry, StoreError> {
        match self.entries.get(key) {
            Some(entry) => Ok(entry),
            None if self.owned => Err(StoreError::KeyMissing),
            None => Err(StoreError::UncachedLookup),
        }
    }

    /// Inserts or merges `value` at `timestamp`. Returns whether the store
    /// mutated.
    pub fn put(&mut self, key: Bytes, value: Bytes, timestamp: f64) -> Result<bool, StoreError> {
        if !self.owned {
            return Err(StoreError::UnownedWrite);
        }
        match self.entries.get_mut(&key) {
            Some(entry) => Ok(entry.merge(value, timestamp)),
            None => {
                let mut entry = Entry::new(key.clone());
                let mutated = entry.merge(value, timestamp);
                self.entries.insert(key, entry);
                Ok(mutated)
            }
        }
    }

    /// Distributes this bucket's entries into 16 new buckets whose prefix is
    /// one hex digit longer, preserving `owned`.
    pub fn split(&self) -> [Bucket; 16] {
        let mut children: Vec<Bucket> = (0..16u8)
            .map(|digit| Bucket::new(format!("{}{:x}", self.prefix, digit), self.owned))
            .collect();
        for (key, entry) in &self.entries {
            let child_prefix_len = self.prefix.len() + 1;
            let digit = usize::from_str_radix(&entry.hash()[self.prefix.len()..child_prefix_len], 16)
                .expect("sha1 hex digest is valid hex");
            children[digit].entries.insert(key.clone(), entry.clone());
        }
        children
            .try_into()
            .unwrap_or_else(|_| unreachable!("exactly 16 children constructed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_get_missing_key_is_key_missing() {
        let bucket = Bucket::new("a", true);
        assert_eq!(bucket.get(&Bytes::from_static(b"x")), Err(StoreError::KeyMissing));
    }

    #[test]
    fn unowned_get_missing_key_is_uncached_lookup() {
        let bucket = Bucket::new("a", false);
        assert_eq!(
            bucket.get(&Bytes::from_static(b"x")),
            Err(StoreError::UncachedLookup)
        );
    }

    #[test]
    fn unowned_put_is_rejected() {
        let mut bucket = Bucket::new("a", false);
        assert_eq!(
            bucket.put(Bytes::from_static(b"x"), Bytes::from_static(b"v"), 1.0),
            Err(StoreError::UnownedWrite)
        );
    }

    #[test]
    fn owned_put_then_get_roundtrips() {
        let mut bucket = Bucket::new("a", true);
        assert_eq!(
            bucket.put(Bytes::from_static(b"x"), Bytes::from_static(b"v"), 1.0),
            Ok(true)
        );
        let entry = bucket.get(&Bytes::from_static(b"x")).unwrap();
        assert_eq!(entry.value(), &Bytes::from_static(b"v"));
    }

    #[test]
    fn split_preserves_ownership_and_routes_by_next_hex_digit() {
        let mut bucket = Bucket::new("", true);
        bucket.put(Bytes::from_static(b"asdf"), Bytes::from_static(b"qwer"), 1.0).unwrap();
        let digest = crate::hash::sha1_hex(b"asdf");
        let expected_digit = usize::from_str_radix(&digest[0..1], 16).unwrap();

        let children = bucket.split();
        assert_eq!(children.len(), 16);
        for (i, child) in children.iter().enumerate() {
            assert!(child.is_owned());
            assert_eq!(child.prefix(), &format!("{:x}", i));
            if i == expected_digit {
                assert_eq!(child.len(), 1);
            } else {
                assert!(child.is_empty());
            }
        }
    }
}

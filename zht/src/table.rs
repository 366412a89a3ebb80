//! Prefix-routed collection of buckets spanning the whole key space.

use crate::bucket::Bucket;
use crate::entry::Entry;
use crate::error::StoreError;
use crate::hash::prefix_of;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default prefix length: 16 buckets, each node owns all of them.
pub const DEFAULT_PREFIX_LENGTH: usize = 1;

/// The full key space, partitioned into `16^prefix_length` buckets.
///
/// At construction every prefix of length `prefix_length` exists and is
/// owned. Ownership never shrinks in the current design — see the module
/// docs on [`crate::peer`] for why overlapping ownership across peers is
/// expected rather than a bug.
pub struct Table {
    prefix_length: usize,
    buckets: HashMap<String, Bucket>,
    owned: HashSet<String>,
}

impl Table {
    /// Builds a table with `prefix_length` hex digits of partitioning,
    /// owning every bucket.
    pub fn new(prefix_length: usize) -> Self {
        let mut buckets = HashMap::new();
        let mut owned = HashSet::new();
        let bucket_count = 16usize.pow(prefix_length as u32);
        for i in 0..bucket_count {
            let prefix = format!("{:0width$x}", i, width = prefix_length);
            buckets.insert(prefix.clone(), Bucket::new(prefix.clone(), true));
            owned.insert(prefix);
        }
        Self {
            prefix_length,
            buckets,
            owned,
        }
    }

    /// The hex-prefix width used to partition the key space.
    pub fn prefix_length(&self) -> usize {
        self.prefix_length
    }

    fn route(&self, key: &[u8]) -> String {
        prefix_of(key, self.prefix_length)
    }

    /// Reads the entry for `key`, routing to the owning bucket.
    pub fn get(&self, key: &Bytes) -> Result<&Entry, StoreError> {
        let prefix = self.route(key);
        self.buckets
            .get(&prefix)
            .expect("every prefix exists at construction")
            .get(key)
    }

    /// Writes `key`/`value` with the current wall-clock timestamp.
    pub fn put(&mut self, key: Bytes, value: Bytes) -> Result<bool, StoreError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the unix epoch")
            .as_secs_f64();
        self.put_with_ts(key, value, now)
    }

    /// Writes `key`/`value` with a caller-supplied timestamp. Used when
    /// applying remote updates — using [`Table::put`]'s wall clock there
    /// would violate last-writer-wins ordering.
    pub fn put_with_ts(&mut self, key: Bytes, value: Bytes, timestamp: f64) -> Result<bool, StoreError> {
        let prefix = self.route(&key);
        self.buckets
            .get_mut(&prefix)
            .expect("every prefix exists at construction")
            .put(key, value, timestamp)
    }

    /// Whether this node owns the bucket that `key` routes to.
    pub fn owns(&self, key: &[u8]) -> bool {
        self.owned.contains(&self.route(key))
    }

    /// All prefixes this node owns.
    pub fn owned_buckets(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.owned.iter().cloned().collect();
        prefixes.sort();
        prefixes
    }

    /// The `key -> timestamp` map for the bucket matching `prefix`.
    ///
    /// `prefix` is truncated to `prefix_length` if longer; if the truncated
    /// prefix doesn't name a bucket (never happens at the default topology,
    /// but guarded for future variable-depth tables), returns an empty map.
    pub fn keys_of(&self, prefix: &str) -> HashMap<Bytes, f64> {
        let truncated = if prefix.len() > self.prefix_length {
            &prefix[..self.prefix_length]
        } else {
            prefix
        };
        match self.buckets.get(truncated) {
            Some(bucket) => bucket
                .iter()
                .filter_map(|(key, entry)| entry.timestamp().map(|ts| (key.clone(), ts)))
                .collect(),
            None => HashMap::new(),
        }
    }

    /// Directly accesses a bucket by exact prefix, for tests and the split
    /// primitive.
    pub fn bucket(&self, prefix: &str) -> Option<&Bucket> {
        self.buckets.get(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_owns_sixteen_buckets() {
        let table = Table::new(DEFAULT_PREFIX_LENGTH);
        assert_eq!(table.owned_buckets().len(), 16);
    }

    #[test]
    fn every_key_routes_to_a_bucket_whose_prefix_it_shares() {
        let table = Table::new(DEFAULT_PREFIX_LENGTH);
        for key in [&b"a"[..], b"asdf", b"zht", b""] {
            let entry_prefix = crate::hash::prefix_of(key, DEFAULT_PREFIX_LENGTH);
            assert!(table.owns(key));
            assert!(table.bucket(&entry_prefix).is_some());
        }
    }

    #[test]
    fn put_with_ts_is_required_for_lww_replay_safety() {
        let mut table = Table::new(DEFAULT_PREFIX_LENGTH);
        let key = Bytes::from_static(b"asdf");
        assert!(table
            .put_with_ts(key.clone(), Bytes::from_static(b"v1"), 100.0)
            .unwrap());
        assert!(!table
            .put_with_ts(key.clone(), Bytes::from_static(b"v0"), 50.0)
            .unwrap());
        assert_eq!(table.get(&key).unwrap().value(), &Bytes::from_static(b"v1"));
    }

    #[test]
    fn keys_of_truncates_long_prefixes() {
        let mut table = Table::new(DEFAULT_PREFIX_LENGTH);
        let key = Bytes::from_static(b"asdf");
        table.put_with_ts(key.clone(), Bytes::from_static(b"v"), 1.0).unwrap();
        let prefix = crate::hash::prefix_of(&key, DEFAULT_PREFIX_LENGTH);
        let long_prefix = format!("{}extra", prefix);
        let keys = table.keys_of(&long_prefix);
        assert_eq!(keys.get(&key), Some(&1.0));
    }

    #[test]
    fn keys_of_missing_prefix_is_empty() {
        let table = Table::new(DEFAULT_PREFIX_LENGTH);
        assert!(table.keys_of("zz").is_empty());
    }
}

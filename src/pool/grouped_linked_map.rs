//! A grouped, insertion-ordered multi-map: each key owns a bucket (a small
//! `VecDeque` of values), and buckets themselves are kept in insertion order
//! so the least-recently-inserted bucket can be evicted in O(1).
//!
//! Grounded on the `IndexMap`-backed LRU shape used elsewhere in the pack
//! (`cache-lru.rs` — front of the map is least-recent, back is most-recent)
//! but generalized from a single value per key to a bucket of values per key,
//! per spec §4.6's `GroupedLinkedMap`.

use std::collections::VecDeque;

use indexmap::IndexMap;

pub(crate) struct GroupedLinkedMap<K, V> {
    buckets: IndexMap<K, VecDeque<V>>,
}

impl<K, V> GroupedLinkedMap<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            buckets: IndexMap::new(),
        }
    }

    /// Appends `value` to the tail-side bucket for `key`, creating it at the
    /// most-recent end if absent.
    pub(crate) fn put(&mut self, key: K, value: V) {
        self.buckets.entry(key).or_default().push_back(value);
    }

    /// Moves `key`'s bucket to the most-recent end and pops one value from
    /// it, or returns `None` if the key has no pooled values.
    pub(crate) fn get(&mut self, key: &K) -> Option<V> {
        let idx = self.buckets.get_index_of(key)?;
        let last = self.buckets.len() - 1;
        self.buckets.move_index(idx, last);
        let bucket = self.buckets.get_mut(key)?;
        let value = bucket.pop_front();
        if bucket.is_empty() {
            self.buckets.shift_remove(key);
        }
        value
    }

    /// Walks from the least-recent bucket, popping one value. Empty buckets
    /// are unlinked as they're encountered.
    pub(crate) fn remove_last(&mut self) -> Option<(K, V)> {
        loop {
            let (key, bucket) = self.buckets.first_mut()?;
            let key = key.clone();
            if let Some(value) = bucket.pop_front() {
                if self.buckets.get(&key).is_some_and(VecDeque::is_empty) {
                    self.buckets.shift_remove(&key);
                }
                return Some((key, value));
            }
            self.buckets.shift_remove(&key);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

//! A small pool of reusable lookup-key objects, mirroring Glide's
//! `KeyPool`: callers borrow a key, fill it in, use it for one lookup, then
//! return it instead of allocating a fresh one every call. Bounded by a
//! small fixed count since key objects are cheap and the only point is to
//! avoid per-lookup allocation churn, not to bound memory (spec §4.6).

use std::collections::VecDeque;

use parking_lot::Mutex;

const DEFAULT_MAX_SIZE: usize = 10;

pub struct LruSimpleKeyPool<K> {
    max_size: usize,
    pool: Mutex<VecDeque<K>>,
}

impl<K: Default> LruSimpleKeyPool<K> {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            pool: Mutex::new(VecDeque::with_capacity(max_size)),
        }
    }

    /// Borrows a key from the pool, or constructs a fresh one if empty.
    pub fn get(&self) -> K {
        self.pool.lock().pop_front().unwrap_or_default()
    }

    /// Returns a key to the pool for reuse. Dropped if the pool is already
    /// at capacity.
    pub fn offer(&self, key: K) {
        let mut pool = self.pool.lock();
        if pool.len() < self.max_size {
            pool.push_back(key);
        }
    }

    pub fn len(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Default> Default for LruSimpleKeyPool<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq, Eq)]
    struct SizeKey(u64);

    #[test]
    fn reuses_offered_keys() {
        let pool: LruSimpleKeyPool<SizeKey> = LruSimpleKeyPool::new();
        let key = pool.get();
        assert_eq!(key, SizeKey(0));
        pool.offer(key);
        assert_eq!(pool.len(), 1);
        let _ = pool.get();
        assert!(pool.is_empty());
    }

    #[test]
    fn drops_past_capacity() {
        let pool: LruSimpleKeyPool<SizeKey> = LruSimpleKeyPool::with_max_size(2);
        pool.offer(SizeKey(1));
        pool.offer(SizeKey(2));
        pool.offer(SizeKey(3));
        assert_eq!(pool.len(), 2);
    }
}

//! A size-bounded in-memory object pool that recycles buffers keyed by a
//! typed size class. See `spec.md` §4.6.

mod grouped_linked_map;
pub mod key_pool;
mod size_strategy;
pub mod specialized;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use size_strategy::{SizeKey, SizeStrategy};

/// Opaque shape discriminator for a [`Poolable`] type. Every shipped
/// specialization (byte/int/long/float/double array) returns its byte width
/// here, which makes "type" and "size" isomorphic for those types — spec
/// §9 leaves open whether the ledger should eventually support true
/// best-fit lookup across genuinely distinct types; today it doesn't need to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(pub u32);

/// A value the pool can hand out and later recycle.
///
/// `TYPE_TAG` is fixed per `V`: every value produced by one [`MemoryPool`]'s
/// factory shares the same shape discriminator, since one pool instance
/// manages exactly one `Poolable` type (spec's "Specialized Pools" are thin
/// façades, one [`MemoryPool`] per element type, not one heterogeneous pool).
pub trait Poolable: Send + 'static {
    const TYPE_TAG: TypeTag;

    /// Footprint in bytes, charged against the pool's `max_size` budget.
    fn byte_size(&self) -> u64;

    /// Resets the value to a blank/zeroed state before handing it back out.
    fn clear(&mut self);

    /// Called instead of pooling when the pool is released, or when an
    /// evicted value has nowhere left to go. Default: drop.
    fn recycle(self);
}

/// Configuration for a [`MemoryPool`]: just the byte budget, matching spec
/// §6's pool constructor (`max_size` plus an injected factory, passed
/// separately to [`MemoryPool::new`]).
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    max_size: u64,
}

impl PoolConfig {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }
}

struct PoolState<V> {
    strategy: SizeStrategy<V>,
    current_bytes: u64,
}

/// Size-indexed LRU object pool. See `spec.md` §4.6 for the full contract.
///
/// `K` is the size-class key (an array length, or any other integer shape);
/// `V` is the pooled value; `F` is the factory invoked on a pool miss.
pub struct MemoryPool<V, F>
where
    V: Poolable,
    F: Fn(u64) -> V,
{
    max_size: u64,
    factory: F,
    state: Mutex<PoolState<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    released: AtomicBool,
    /// Serializes the active→released transition against a racing `put`,
    /// per spec §5: "at most one transition from active→released and a
    /// race-free recycle-on-put after release."
    release_latch: Mutex<()>,
}

impl<V, F> MemoryPool<V, F>
where
    V: Poolable,
    F: Fn(u64) -> V,
{
    pub fn new(config: PoolConfig, factory: F) -> Self {
        Self {
            max_size: config.max_size,
            factory,
            state: Mutex::new(PoolState {
                strategy: SizeStrategy::new(),
                current_bytes: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            released: AtomicBool::new(false),
            release_latch: Mutex::new(()),
        }
    }

    /// Returns a value for `key`, cleared, preferring a pooled exact-size
    /// match over the factory.
    pub fn get(&self, key: u64) -> V {
        self.get_impl(key, true)
    }

    /// As [`MemoryPool::get`], but skips [`Poolable::clear`] on a pool hit.
    pub fn get_dirty(&self, key: u64) -> V {
        self.get_impl(key, false)
    }

    fn get_impl(&self, key: u64, clear: bool) -> V {
        let size_key = SizeKey {
            type_tag: V::TYPE_TAG,
            size: key,
        };
        let pooled = {
            let mut state = self.state.lock();
            let value = state.strategy.get(size_key);
            if let Some(value) = &value {
                state.current_bytes -= value.byte_size();
            }
            value
        };

        if let Some(mut value) = pooled {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("pool_hits_total").increment(1);
            metrics::gauge!("pool_current_size_bytes").set(self.current_size() as f64);
            if clear {
                value.clear();
            }
            return value;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pool_misses_total").increment(1);
        (self.factory)(key)
    }

    /// Pools `value` under `key` unless the pool has been [`release`]d, in
    /// which case `value` is recycled immediately. Evicts least-recently
    /// inserted values until `current_size() <= max_size`.
    ///
    /// [`release`]: MemoryPool::release
    pub fn put(&self, key: u64, value: V) {
        if self.released.load(Ordering::Acquire) {
            value.recycle();
            return;
        }
        let _guard = self.release_latch.lock();
        if self.released.load(Ordering::Acquire) {
            value.recycle();
            return;
        }

        let byte_size = value.byte_size();
        let size_key = SizeKey {
            type_tag: V::TYPE_TAG,
            size: key,
        };
        let mut state = self.state.lock();
        state.strategy.put(size_key, value);
        state.current_bytes += byte_size;
        self.evict_to_capacity(&mut state);
        metrics::gauge!("pool_current_size_bytes").set(state.current_bytes as f64);
    }

    /// Evicts every pooled value, recycling each one.
    pub fn clear_memory(&self) {
        let mut state = self.state.lock();
        while let Some(victim) = state.strategy.remove_last() {
            state.current_bytes -= victim.byte_size();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("pool_evictions_total").increment(1);
            metrics::gauge!("pool_current_size_bytes").set(state.current_bytes as f64);
            victim.recycle();
        }
    }

    /// One-shot transition to the terminal "released" state: evicts
    /// everything currently pooled, and every subsequent `put` recycles
    /// immediately instead of pooling.
    pub fn release(&self) {
        {
            let _guard = self.release_latch.lock();
            self.released.store(true, Ordering::Release);
        }
        self.clear_memory();
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn eviction_count(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn current_size(&self) -> u64 {
        self.state.lock().current_bytes
    }

    fn evict_to_capacity(&self, state: &mut PoolState<V>) {
        while state.current_bytes > self.max_size {
            let Some(victim) = state.strategy.remove_last() else {
                break;
            };
            state.current_bytes -= victim.byte_size();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("pool_evictions_total").increment(1);
            metrics::gauge!("pool_current_size_bytes").set(state.current_bytes as f64);
            victim.recycle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestBuf {
        len: u64,
        cleared: bool,
    }

    impl Poolable for TestBuf {
        const TYPE_TAG: TypeTag = TypeTag(1);

        fn byte_size(&self) -> u64 {
            self.len
        }

        fn clear(&mut self) {
            self.cleared = true;
        }

        fn recycle(self) {}
    }

    fn make(len: u64) -> TestBuf {
        TestBuf { len, cleared: false }
    }

    #[test]
    fn miss_then_hit() {
        let pool = MemoryPool::new(PoolConfig::new(100), make);
        let v = pool.get(10);
        assert_eq!(pool.miss_count(), 1);
        pool.put(10, v);
        let v = pool.get(10);
        assert_eq!(pool.hit_count(), 1);
        assert!(v.cleared);
    }

    #[test]
    fn exact_size_required() {
        let pool = MemoryPool::new(PoolConfig::new(100), make);
        pool.put(10, make(10));
        let v = pool.get(20);
        assert_eq!(pool.miss_count(), 1);
        assert_eq!(v.len, 20);
    }

    #[test]
    fn evicts_past_budget() {
        let pool = MemoryPool::new(PoolConfig::new(100), make);
        for _ in 0..20 {
            pool.put(10, make(10));
        }
        assert!(pool.current_size() <= 100);
        assert_eq!(pool.eviction_count(), 10);
    }

    #[test]
    fn release_recycles_future_puts() {
        let pool = MemoryPool::new(PoolConfig::new(100), make);
        pool.put(10, make(10));
        pool.release();
        assert_eq!(pool.current_size(), 0);
        pool.put(10, make(10));
        assert_eq!(pool.current_size(), 0);
    }
}

//! End-to-end scenario tests for the in-memory object pool, against the
//! public API only (spec §8 S5-S6).

use locus_cache::{ByteArrayPool, PoolConfig};

/// Rust has no object identity for owned `Vec`s, so "the same buffer" is
/// checked via its heap allocation pointer, which `clear()` never changes.
fn ptr_of(buf: &[u8]) -> *const u8 {
    buf.as_ptr()
}

#[test]
fn s5_pool_recycle() {
    let pool = ByteArrayPool::new(PoolConfig::new(100));

    let b1 = pool.get(10);
    let b1_ptr = ptr_of(&b1);
    pool.put(b1);
    let b2 = pool.get(10);
    assert_eq!(ptr_of(&b2), b1_ptr, "b2 should be the recycled b1 buffer");

    pool.release();
    pool.put(b2);
    let b3 = pool.get(10);
    assert_eq!(pool.current_size(), 0, "released pool holds nothing after put");
    assert_ne!(
        ptr_of(&b3),
        b1_ptr,
        "b3 must be freshly allocated, not the released b2 buffer"
    );
}

#[test]
fn s6_pool_lru_under_full_pressure() {
    let pool = ByteArrayPool::new(PoolConfig::new(100));

    // 20 buffers of 10 bytes each (200 bytes total) against a 100-byte
    // budget: only the 10 most-recently-put survive.
    let mut put_order = Vec::new();
    for _ in 0..20 {
        let buf = pool.get(10); // always a miss here; the pool starts empty
        put_order.push(ptr_of(&buf));
        pool.put(buf);
    }
    assert_eq!(pool.current_size(), 100);
    assert_eq!(pool.eviction_count(), 10);
    let surviving = &put_order[10..];

    // The first 10 requests drain the survivors in FIFO (least-recently-put
    // first) order — exact identity matches, not just membership.
    let misses_before = pool.miss_count();
    for &expected_ptr in surviving {
        let buf = pool.get(10);
        assert_eq!(ptr_of(&buf), expected_ptr, "expected buffers to drain in insertion order");
    }
    assert_eq!(pool.miss_count(), misses_before, "all ten should be pool hits");
    assert_eq!(pool.current_size(), 0);

    // With the pool now empty, the next 10 requests must allocate fresh.
    for _ in 0..10 {
        let buf = pool.get(10);
        assert!(!put_order.contains(&ptr_of(&buf)), "pool is empty, this must be a fresh allocation");
    }
}

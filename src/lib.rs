//! `locus-cache`
//!
//! A two-tier local caching substrate: a journaled, size-bounded, on-disk LRU
//! cache providing atomic multi-file entries with crash recovery, and a
//! size-bounded in-memory object pool that recycles buffers keyed by a typed
//! size class.
//!
//! The two subsystems are independent and composable but separable: a host
//! may use only [`disk`] for persistence, only [`pool`] for buffer reuse, or
//! both together.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
extern crate tracing;

pub mod disk;
pub mod pool;

pub use disk::{Cache, CacheConfig, CacheError, Editor, Snapshot};
pub use pool::{
    specialized::{ByteArrayPool, DoubleArrayPool, FloatArrayPool, IntArrayPool, LongArrayPool},
    MemoryPool, Poolable, PoolConfig, TypeTag,
};

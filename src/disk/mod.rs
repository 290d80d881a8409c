//! The journaled, size-bounded, on-disk LRU cache. See `spec.md` §4.1-§4.5.

mod cache;
mod config;
mod editor;
mod entry;
pub mod error;
mod journal;
mod snapshot;
pub mod trim;

pub use cache::Cache;
pub use config::{BuildError, CacheConfig, CacheConfigBuilder};
pub use editor::Editor;
pub use error::CacheError;
pub use snapshot::Snapshot;
pub use trim::{InlineTrimExecutor, ThreadTrimExecutor, TrimExecutor};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn open_cache(dir: &std::path::Path, max_size: u64) -> Cache {
        let config = CacheConfig::builder(dir)
            .value_count(1)
            .max_size(max_size)
            .build()
            .unwrap();
        Cache::open_with_executor(config, Arc::new(InlineTrimExecutor)).unwrap()
    }

    // The crash/eviction/round-trip scenarios from spec §8 (S1-S4) live in
    // `tests/disk_cache.rs`, exercised purely through the public API. What
    // follows here is internal edge-case coverage that doesn't fit that
    // narrative shape.

    #[test]
    fn single_editor_per_key() {
        let dir = tempdir::TempDir::new("locus-cache-single-editor").unwrap();
        let cache = open_cache(dir.path(), 5120);
        let _first = cache.edit("key1").unwrap().unwrap();
        assert!(cache.edit("key1").unwrap().is_none());
    }

    #[test]
    fn invalid_key_rejected() {
        let dir = tempdir::TempDir::new("locus-cache-invalid-key").unwrap();
        let cache = open_cache(dir.path(), 5120);
        let err = cache.edit("Not Valid!").unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey { .. }));
    }

    #[test]
    fn commit_missing_index_fails_and_aborts() {
        let dir = tempdir::TempDir::new("locus-cache-missing-index").unwrap();
        let config = CacheConfig::builder(dir.path())
            .value_count(2)
            .max_size(5120)
            .build()
            .unwrap();
        let cache = Cache::open_with_executor(config, Arc::new(InlineTrimExecutor)).unwrap();

        let mut editor = cache.edit("key1").unwrap().unwrap();
        editor.set(0, "only-one-index").unwrap();
        let err = editor.commit().unwrap_err();
        assert!(matches!(err, CacheError::IllegalState { .. }));
        assert!(cache.get("key1").unwrap().is_none());
    }

    #[test]
    fn byte_accounting_matches_disk() {
        let dir = tempdir::TempDir::new("locus-cache-accounting").unwrap();
        let cache = open_cache(dir.path(), 1_000_000);

        for i in 0..5 {
            let key = format!("k{i}");
            let mut editor = cache.edit(&key).unwrap().unwrap();
            editor.set(0, &"x".repeat(i + 1)).unwrap();
            editor.commit().unwrap();
        }
        cache.remove("k2").unwrap();
        let _ = cache.get("k0").unwrap();

        let expected: u64 = [0usize, 1, 3, 4]
            .iter()
            .map(|&i| std::fs::metadata(dir.path().join(format!("k{i}.0"))).unwrap().len())
            .sum();
        assert_eq!(cache.size(), expected);
    }
}

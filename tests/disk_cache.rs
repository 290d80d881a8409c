//! End-to-end scenario tests for the on-disk cache, against the public API
//! only. Mirrors the teacher's top-level `tests/buffering.rs` integration
//! test: one file per subsystem, exercised through its real constructors
//! rather than internal hooks.

use std::sync::Arc;

use locus_cache::disk::{Cache, CacheConfig, CacheError, InlineTrimExecutor};

fn open_cache(dir: &std::path::Path, max_size: u64) -> Cache {
    let config = CacheConfig::builder(dir)
        .value_count(10)
        .max_size(max_size)
        .build()
        .unwrap();
    Cache::open_with_executor(config, Arc::new(InlineTrimExecutor)).unwrap()
}

#[test]
fn s1_write_read_round_trip() {
    let dir = tempdir::TempDir::new("locus-cache-e2e-s1").unwrap();
    let cache = open_cache(dir.path(), 1_000_000);

    for i in 1..=10 {
        let key = format!("file{i}");
        let mut editor = cache.edit(&key).unwrap().unwrap();
        for index in 0..10 {
            editor.set(index, &format!("{key}.{index},")).unwrap();
        }
        editor.commit().unwrap();
    }

    cache.close().unwrap();
    let cache = open_cache(dir.path(), 1_000_000);
    let snapshot = cache.get("file10").unwrap().unwrap();
    assert_eq!(snapshot.string(0).unwrap(), "file10.0,");
    assert_eq!(snapshot.string(9).unwrap(), "file10.9,");
}

#[test]
fn s2_dirty_on_open_default_deletes() {
    let dir = tempdir::TempDir::new("locus-cache-e2e-s2").unwrap();
    {
        let cache = open_cache(dir.path(), 1_000_000);
        let mut editor = cache.edit("dirtyfile").unwrap().unwrap();
        editor.file(0).unwrap();
        std::fs::write(dir.path().join("dirtyfile.0.tmp"), b"partial").unwrap();
        std::mem::forget(editor);
    }
    let cache = open_cache(dir.path(), 1_000_000);
    assert!(cache.get("dirtyfile").unwrap().is_none());
    assert!(!dir.path().join("dirtyfile.0.tmp").exists());
}

#[test]
fn s2_dirty_on_open_preserved_when_configured() {
    let dir = tempdir::TempDir::new("locus-cache-e2e-s2b").unwrap();
    let build = |d: &std::path::Path| {
        CacheConfig::builder(d)
            .value_count(10)
            .max_size(1_000_000)
            .delete_dirty_file(false)
            .build()
            .unwrap()
    };
    {
        let cache = Cache::open_with_executor(build(dir.path()), Arc::new(InlineTrimExecutor)).unwrap();
        let mut editor = cache.edit("dirtyfile").unwrap().unwrap();
        editor.file(0).unwrap();
        std::fs::write(dir.path().join("dirtyfile.0.tmp"), b"partial").unwrap();
        std::mem::forget(editor);
    }
    let cache = Cache::open_with_executor(build(dir.path()), Arc::new(InlineTrimExecutor)).unwrap();
    assert!(cache.get("dirtyfile").unwrap().is_none());
    assert!(dir.path().join("dirtyfile.0.tmp").exists());
}

#[test]
fn s3_eviction_under_pressure() {
    let dir = tempdir::TempDir::new("locus-cache-e2e-s3").unwrap();
    let config = CacheConfig::builder(dir.path())
        .value_count(1)
        .max_size(30)
        .build()
        .unwrap();
    let cache = Cache::open_with_executor(config, Arc::new(InlineTrimExecutor)).unwrap();

    for i in 0..10 {
        let key = format!("k{i}");
        let mut editor = cache.edit(&key).unwrap().unwrap();
        editor.set(0, "0123456789").unwrap();
        editor.commit().unwrap();
    }

    assert!(cache.size() <= 30);
    for i in 7..10 {
        let key = format!("k{i}");
        assert!(cache.get(&key).unwrap().is_some(), "k{i} should remain readable");
    }
    for i in 0..7 {
        let key = format!("k{i}");
        assert!(cache.get(&key).unwrap().is_none(), "k{i} should have been evicted");
    }
}

#[test]
fn s4_crash_during_compact_promotes_backup() {
    let dir = tempdir::TempDir::new("locus-cache-e2e-s4").unwrap();
    {
        let cache = open_cache(dir.path(), 1_000_000);
        for i in 0..3 {
            let key = format!("f{i}");
            let mut editor = cache.edit(&key).unwrap().unwrap();
            editor.set(0, "value").unwrap();
            editor.commit().unwrap();
        }
        cache.close().unwrap();
    }

    let journal_path = dir.path().join("journal");
    let backup_path = dir.path().join("journal.bkp");
    std::fs::copy(&journal_path, &backup_path).unwrap();
    std::fs::remove_file(&journal_path).unwrap();

    let cache = open_cache(dir.path(), 1_000_000);
    for i in 0..3 {
        let key = format!("f{i}");
        let snapshot = cache.get(&key).unwrap().unwrap();
        assert_eq!(snapshot.string(0).unwrap(), "value");
    }
    assert!(!backup_path.exists());
}

#[test]
fn operations_after_close_fail() {
    let dir = tempdir::TempDir::new("locus-cache-e2e-closed").unwrap();
    let cache = open_cache(dir.path(), 1_000_000);
    cache.close().unwrap();
    let err = cache.get("anything").unwrap_err();
    assert!(matches!(err, CacheError::Closed));
}

use std::path::{Path, PathBuf};

/// One entry in the cache index. Lifetime spans the cache's open→close window.
///
/// An entry is in exactly one of three states at any moment, per spec §3
/// invariant 2:
/// - *empty*: `lengths` are all zero, `readable = false`, no clean files exist.
/// - *readable*: `readable = true`, every clean file exists with a matching length.
/// - *editing*: `editing = true`; at most one editor may hold this at a time.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) key: String,
    pub(crate) lengths: Vec<u64>,
    pub(crate) readable: bool,
    pub(crate) editing: bool,
    pub(crate) sequence_number: u64,
}

impl Entry {
    pub(crate) fn new(key: String, value_count: usize) -> Self {
        Self {
            key,
            lengths: vec![0; value_count],
            readable: false,
            editing: false,
            sequence_number: 0,
        }
    }

    pub(crate) fn clean_path(dir: &Path, key: &str, index: usize) -> PathBuf {
        dir.join(format!("{key}.{index}"))
    }

    pub(crate) fn dirty_path(dir: &Path, key: &str, index: usize) -> PathBuf {
        dir.join(format!("{key}.{index}.tmp"))
    }

    pub(crate) fn total_length(&self) -> u64 {
        self.lengths.iter().sum()
    }
}

/// Validates a key against `[a-z0-9_-]{1,120}`, per spec §6.
pub(crate) fn validate_key(key: &str) -> bool {
    static PATTERN: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"^[a-z0-9_-]{1,120}$").unwrap());
    PATTERN.is_match(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation() {
        assert!(validate_key("file1"));
        assert!(validate_key("a"));
        assert!(validate_key(&"a".repeat(120)));
        assert!(!validate_key(&"a".repeat(121)));
        assert!(!validate_key(""));
        assert!(!validate_key("Has-Upper"));
        assert!(!validate_key("has space"));
        assert!(!validate_key("has/slash"));
    }
}

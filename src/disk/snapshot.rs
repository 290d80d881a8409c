use std::{
    fs::File,
    io::Read,
    path::PathBuf,
};

use snafu::ResultExt;

use super::{
    cache::Cache,
    editor::Editor,
    error::{IoSnafu, Result},
};

/// An immutable capture of an entry's published files and lengths, tagged
/// with the `sequence_number` observed at read time (spec §4.4).
///
/// Paths are captured under the cache lock, but the files themselves are not
/// opened until [`Snapshot::file`]/[`Snapshot::string`] is called — a
/// concurrent eviction that deletes them between the snapshot and the read
/// surfaces as an `io::Error` from that call, not a panic or stale data
/// (spec §9's resolved Open Question on reader tolerance).
pub struct Snapshot {
    cache: Cache,
    key: String,
    sequence_number: u64,
    paths: Vec<PathBuf>,
    lengths: Vec<u64>,
}

impl Snapshot {
    pub(crate) fn new(
        cache: Cache,
        key: String,
        sequence_number: u64,
        paths: Vec<PathBuf>,
        lengths: Vec<u64>,
    ) -> Self {
        Self {
            cache,
            key,
            sequence_number,
            paths,
            lengths,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The byte length of value index `i`, as observed at snapshot time.
    pub fn length(&self, index: usize) -> u64 {
        self.lengths[index]
    }

    /// Opens the clean file for value index `i` for reading.
    pub fn file(&self, index: usize) -> Result<File> {
        File::open(&self.paths[index]).context(IoSnafu)
    }

    /// Reads the full contents of value index `i` as a UTF-8 string.
    pub fn string(&self, index: usize) -> Result<String> {
        let mut contents = String::new();
        self.file(index)?
            .read_to_string(&mut contents)
            .context(IoSnafu)?;
        Ok(contents)
    }

    /// Attempts to open a new editor for this snapshot's key, but only if
    /// the entry's sequence number has not advanced since this snapshot was
    /// captured — i.e. no intervening commit has happened. Returns `None`
    /// for either a stale snapshot or an entry already under edit.
    pub fn edit(&self) -> Result<Option<Editor>> {
        self.cache.edit_checked(&self.key, Some(self.sequence_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::config::CacheConfig;

    #[test]
    fn stale_snapshot_edit_returns_none() {
        let dir = tempdir::TempDir::new("locus-cache-snapshot").unwrap();
        let config = CacheConfig::builder(dir.path())
            .value_count(1)
            .max_size(1024)
            .build()
            .unwrap();
        let cache = Cache::open(config).unwrap();

        let editor = cache.edit("key1").unwrap().unwrap();
        let mut editor = editor;
        editor.set(0, "hello").unwrap();
        editor.commit().unwrap();

        let snapshot = cache.get("key1").unwrap().unwrap();

        let editor = cache.edit("key1").unwrap().unwrap();
        let mut editor = editor;
        editor.set(0, "world").unwrap();
        editor.commit().unwrap();

        assert!(snapshot.edit().unwrap().is_none());

        let fresh_snapshot = cache.get("key1").unwrap().unwrap();
        assert!(fresh_snapshot.edit().unwrap().is_some());
    }
}

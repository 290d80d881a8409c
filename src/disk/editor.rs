use std::{
    fs::{self, OpenOptions},
    io::{Read, Write},
    path::PathBuf,
};

use snafu::ResultExt;

use super::{
    cache::Cache,
    entry::Entry,
    error::{CacheError, IoSnafu, Result},
};

/// Exclusive write access to one entry's dirty files, held from `edit()`
/// until exactly one of `commit`/`abort` is called (spec §4.3).
///
/// `written[i]` tracks which indices have been written so far, but only
/// matters for entries that were not yet readable when the edit began — an
/// edit of an already-published entry may legitimately touch only some
/// indices and leave the others at their prior clean value.
pub struct Editor {
    cache: Cache,
    key: String,
    is_new: bool,
    written: Vec<bool>,
    done: bool,
}

impl Editor {
    pub(crate) fn new(cache: Cache, key: String, is_new: bool) -> Self {
        let value_count = cache.core.config.value_count;
        Self {
            cache,
            key,
            is_new,
            written: vec![false; value_count],
            done: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the dirty file path for value index `i`, creating the cache
    /// directory if needed. Marks the index written if this entry is new.
    ///
    /// If `is_append_mode` was configured and a prior dirty file for this
    /// index already has content (left over from an aborted edit with
    /// `delete_dirty_file = false`), the returned path is opened for append
    /// by [`Editor::file`]/[`Editor::string`]; this method only returns the
    /// path.
    pub fn file(&mut self, index: usize) -> Result<PathBuf> {
        self.check_active()?;
        self.check_index(index)?;
        self.cache.ensure_cache_dir()?;
        if self.is_new {
            self.written[index] = true;
        }
        Ok(Entry::dirty_path(&self.cache.dir(), &self.key, index))
    }

    /// Convenience wrapper around [`Editor::file`] that writes `value` as the
    /// full contents of the dirty file (or appends, in append mode).
    pub fn set(&mut self, index: usize, value: &str) -> Result<()> {
        let path = self.file(index)?;
        let mut options = OpenOptions::new();
        options.write(true).create(true);
        if self.cache.is_append_mode() {
            options.append(true);
        } else {
            options.truncate(true);
        }
        let mut file = options.open(path).context(IoSnafu)?;
        file.write_all(value.as_bytes()).context(IoSnafu)?;
        Ok(())
    }

    /// Reads the last *committed* clean file for `index`, or `None` if the
    /// entry has never been committed. Uncommitted writes made through this
    /// same editor are not visible here.
    pub fn string(&self, index: usize) -> Result<Option<String>> {
        self.check_active()?;
        self.check_index(index)?;
        let path = Entry::clean_path(&self.cache.dir(), &self.key, index);
        if !path.exists() {
            return Ok(None);
        }
        let mut contents = String::new();
        fs::File::open(path)
            .context(IoSnafu)?
            .read_to_string(&mut contents)
            .context(IoSnafu)?;
        Ok(Some(contents))
    }

    /// Commits the edit: renames every written dirty file to clean, updates
    /// lengths, and appends a flushed `CLEAN` record.
    pub fn commit(mut self) -> Result<()> {
        self.complete(true)
    }

    /// Aborts the edit: deletes dirty files and restores the entry to its
    /// prior state (or removes it, if it was new).
    pub fn abort(mut self) -> Result<()> {
        self.complete(false)
    }

    /// Idempotent safety net: aborts if neither `commit` nor `abort` has run
    /// yet. Intended for scoped-release / `Drop`-driven cleanup paths.
    pub fn abort_unless_committed(mut self) {
        if !self.done {
            let _ = self.complete(false);
        }
    }

    fn complete(&mut self, success: bool) -> Result<()> {
        self.check_active()?;
        self.done = true;
        self.cache
            .complete_edit(&self.key, self.is_new, &self.written, success)
    }

    fn check_active(&self) -> Result<()> {
        if self.done {
            Err(CacheError::NotAnEditor { key: self.key.clone() })
        } else {
            Ok(())
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.written.len() {
            Err(CacheError::IllegalState {
                reason: format!(
                    "index {index} out of range for value_count {}",
                    self.written.len()
                ),
            })
        } else {
            Ok(())
        }
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if !self.done {
            self.done = true;
            if let Err(error) = self.cache.complete_edit(&self.key, self.is_new, &self.written, false) {
                error!(%error, key = %self.key, "locus-cache: editor dropped without commit/abort");
            }
        }
    }
}

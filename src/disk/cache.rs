use std::{
    fs,
    path::PathBuf,
    sync::Arc,
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use snafu::ResultExt;

use super::{
    config::CacheConfig,
    editor::Editor,
    entry::{validate_key, Entry},
    error::{CacheError, IoSnafu, Result},
    journal::{self, CompactRecord, JournalWriter, Record, JOURNAL_FILE},
    snapshot::Snapshot,
    trim::{InlineTrimExecutor, TrimExecutor},
};

/// The compaction trigger named in spec §4.1: rebuilding the journal is only
/// worth it once there are at least this many redundant records *and* at
/// least that many relative to the number of live entries, which prevents
/// pathological rebuilds on tiny caches.
const REDUNDANT_OP_COMPACT_THRESHOLD: u64 = 2000;

pub(crate) struct Inner {
    pub(crate) entries: IndexMap<String, Entry>,
    pub(crate) size: u64,
    pub(crate) redundant_op_count: u64,
    pub(crate) next_sequence_number: u64,
    pub(crate) journal_writer: Option<JournalWriter>,
    pub(crate) closed: bool,
}

pub(crate) struct CacheCore {
    pub(crate) config: CacheConfig,
    pub(crate) state: Mutex<Inner>,
    pub(crate) trim_executor: Arc<dyn TrimExecutor>,
    /// Runtime override for `max_size`, set via [`Cache::set_max_size`].
    /// `None` means "use `config.max_size`" — `CacheConfig` itself stays
    /// immutable, matching the teacher's `DiskBufferConfig` style. Tracked
    /// as an `Option` rather than a zero sentinel so `set_max_size(0)` (a
    /// legitimate "shrink to nothing" call) takes effect.
    pub(crate) max_size_override: Mutex<Option<u64>>,
}

impl CacheCore {
    pub(crate) fn dir(&self) -> &std::path::Path {
        &self.config.dir
    }
}

/// A journaled, size-bounded, on-disk LRU cache of multi-file entries.
///
/// See `spec.md` §4 for the full protocol. `Cache` is a cheap `Arc` handle;
/// clone it freely to share across threads — every public operation takes
/// the single process-wide lock described in spec §5.
#[derive(Clone)]
pub struct Cache {
    pub(crate) core: Arc<CacheCore>,
}

impl Cache {
    /// Opens (or creates) a cache at `config.dir()`, replaying the journal
    /// and recovering from any incomplete compaction or crash, per spec §4.1
    /// and §4.2.
    pub fn open(config: CacheConfig) -> Result<Cache> {
        Self::open_with_executor(config, Arc::new(InlineTrimExecutor))
    }

    /// As [`Cache::open`], but with an explicit [`TrimExecutor`] — production
    /// callers typically want [`super::trim::ThreadTrimExecutor`].
    pub fn open_with_executor(config: CacheConfig, trim_executor: Arc<dyn TrimExecutor>) -> Result<Cache> {
        fs::create_dir_all(&config.dir).context(IoSnafu)?;
        journal::recover_backup(&config.dir)?;

        let journal_path = config.dir.join(JOURNAL_FILE);
        let mut needs_rebuild = false;
        let mut entries: IndexMap<String, Entry> = IndexMap::new();
        let mut redundant_op_count = 0u64;

        if journal_path.exists() {
            match journal::read_journal(&journal_path) {
                Ok(contents) => {
                    if contents.app_version != config.app_version
                        || contents.value_count != config.value_count
                    {
                        warn!("locus-cache: journal header mismatch, rebuilding cache directory");
                        wipe_directory(&config.dir)?;
                    } else {
                        let record_count = contents.records.len() as u64;
                        replay_records(&mut entries, contents.records, config.value_count);
                        redundant_op_count = record_count.saturating_sub(entries.len() as u64);
                        needs_rebuild = contents.truncated;
                    }
                }
                Err(CacheError::CorruptJournal { reason }) => {
                    warn!("locus-cache: corrupt journal ({reason}), rebuilding cache directory");
                    wipe_directory(&config.dir)?;
                }
                Err(other) => return Err(other),
            }
        }

        // Drop any entry still mid-edit after replay: it crashed without a
        // matching CLEAN/REMOVE, so neither its clean nor dirty files are
        // trustworthy (spec §4.2).
        let mut size = 0u64;
        let mut orphaned_keys = Vec::new();
        for (key, entry) in entries.iter() {
            if entry.editing {
                orphaned_keys.push(key.clone());
            } else {
                size += entry.total_length();
            }
        }
        for key in &orphaned_keys {
            entries.shift_remove(key);
            for i in 0..config.value_count {
                let clean = Entry::clean_path(&config.dir, key, i);
                let dirty = Entry::dirty_path(&config.dir, key, i);
                let _ = fs::remove_file(&clean);
                if config.delete_dirty_file {
                    let _ = fs::remove_file(&dirty);
                }
            }
        }

        journal::remove_stray_tmp(&config.dir).context(IoSnafu)?;

        let journal_writer = if journal_path.exists() {
            JournalWriter::append_existing(&config.dir)?
        } else {
            JournalWriter::create(&config.dir, config.app_version, config.value_count)?
        };

        let inner = Inner {
            entries,
            size,
            redundant_op_count,
            next_sequence_number: 1,
            journal_writer: Some(journal_writer),
            closed: false,
        };

        info!(
            dir = %config.dir.display(),
            entries = inner.entries.len(),
            "locus-cache: opened"
        );

        let cache = Cache {
            core: Arc::new(CacheCore {
                config,
                state: Mutex::new(inner),
                trim_executor,
                max_size_override: Mutex::new(None),
            }),
        };

        if needs_rebuild {
            cache.rebuild_journal_locked(&mut cache.core.state.lock())?;
        }

        cache.maybe_submit_trim();
        Ok(cache)
    }

    /// Returns a read snapshot of `key`, or `None` if the entry has never
    /// been published or does not exist. Moves the entry to the MRU end and
    /// appends (unflushed) a `READ` record.
    pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        check_key(key)?;
        let mut inner = self.core.state.lock();
        ensure_open(&inner)?;

        let Some(entry) = inner.entries.get(key) else {
            return Ok(None);
        };
        if !entry.readable {
            return Ok(None);
        }

        let lengths = entry.lengths.clone();
        let sequence_number = entry.sequence_number;
        let paths: Vec<PathBuf> = (0..lengths.len())
            .map(|i| Entry::clean_path(&self.core.config.dir, key, i))
            .collect();

        touch_mru(&mut inner, key);
        if let Some(writer) = inner.journal_writer.as_mut() {
            writer.write_read(key)?;
        }
        inner.redundant_op_count += 1;

        drop(inner);
        self.maybe_submit_trim();

        Ok(Some(Snapshot::new(
            self.clone(),
            key.to_string(),
            sequence_number,
            paths,
            lengths,
        )))
    }

    /// Opens an editor for `key`, or `None` if another editor already holds
    /// it. Appends and flushes a `DIRTY` record before returning.
    pub fn edit(&self, key: &str) -> Result<Option<Editor>> {
        check_key(key)?;
        self.edit_checked(key, None)
    }

    /// Entry point used by [`Snapshot::edit`], which must additionally
    /// verify the entry's sequence number has not advanced since the
    /// snapshot was captured (spec §4.4's stale-check).
    pub(crate) fn edit_checked(&self, key: &str, expected_sequence: Option<u64>) -> Result<Option<Editor>> {
        let mut inner = self.core.state.lock();
        ensure_open(&inner)?;

        if let Some(entry) = inner.entries.get(key) {
            if entry.editing {
                return Ok(None);
            }
            if let Some(expected) = expected_sequence {
                if entry.sequence_number != expected {
                    return Ok(None);
                }
            }
        } else if expected_sequence.is_some() {
            // The entry vanished since the snapshot was taken.
            return Ok(None);
        }

        let is_new = !inner.entries.get(key).map(|e| e.readable).unwrap_or(false);
        let value_count = self.core.config.value_count;
        {
            let entry = inner
                .entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(key.to_string(), value_count));
            entry.editing = true;
        }

        if let Some(writer) = inner.journal_writer.as_mut() {
            writer.write_dirty(key)?;
        }
        touch_mru(&mut inner, key);

        drop(inner);

        Ok(Some(Editor::new(self.clone(), key.to_string(), is_new)))
    }

    /// Removes `key` entirely. Rejected if an editor currently holds it
    /// (spec §4.2).
    pub fn remove(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        let mut inner = self.core.state.lock();
        ensure_open(&inner)?;
        self.remove_locked(&mut inner, key)
    }

    fn remove_locked(&self, inner: &mut Inner, key: &str) -> Result<bool> {
        let Some(entry) = inner.entries.get(key) else {
            return Ok(false);
        };
        if entry.editing {
            return Err(CacheError::IllegalState {
                reason: format!("cannot remove '{key}' while an editor holds it"),
            });
        }

        let total_length = entry.total_length();
        for i in 0..self.core.config.value_count {
            let path = Entry::clean_path(&self.core.config.dir, key, i);
            let _ = fs::remove_file(path);
        }
        inner.entries.shift_remove(key);
        inner.size -= total_length;

        if let Some(writer) = inner.journal_writer.as_mut() {
            writer.write_remove(key)?;
            writer.flush()?;
        }
        inner.redundant_op_count += 1;
        Ok(true)
    }

    pub fn size(&self) -> u64 {
        self.core.state.lock().size
    }

    pub fn max_size(&self) -> u64 {
        self.effective_max_size()
    }

    pub fn set_max_size(&self, max_size: u64) {
        *self.core.max_size_override.lock() = Some(max_size);
        self.maybe_submit_trim();
    }

    pub fn flush(&self) -> Result<()> {
        let mut inner = self.core.state.lock();
        ensure_open(&inner)?;
        if self.journal_rebuild_required(&inner) {
            self.rebuild_journal_locked(&mut inner)?;
        }
        if let Some(writer) = inner.journal_writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Aborts all in-flight editors, trims, and closes the journal writer.
    /// Every public operation after `close` fails with [`CacheError::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.core.state.lock();
        if inner.closed {
            return Ok(());
        }
        if let Some(writer) = inner.journal_writer.as_mut() {
            writer.flush()?;
        }
        inner.journal_writer = None;
        inner.closed = true;
        Ok(())
    }

    /// Closes the cache and deletes its entire directory.
    pub fn delete(&self) -> Result<()> {
        self.close()?;
        if self.core.config.dir.exists() {
            fs::remove_dir_all(&self.core.config.dir).context(IoSnafu)?;
        }
        Ok(())
    }

    pub(crate) fn effective_max_size(&self) -> u64 {
        self.core
            .max_size_override
            .lock()
            .unwrap_or(self.core.config.max_size)
    }

    fn journal_rebuild_required(&self, inner: &Inner) -> bool {
        inner.redundant_op_count >= REDUNDANT_OP_COMPACT_THRESHOLD
            && inner.redundant_op_count >= inner.entries.len() as u64
    }

    fn rebuild_journal_locked(&self, inner: &mut Inner) -> Result<()> {
        let records = inner.entries.values().map(|entry| {
            if entry.editing {
                CompactRecord::Dirty(entry.key.clone())
            } else {
                CompactRecord::Clean(entry.key.clone(), entry.lengths.clone())
            }
        });
        journal::compact(
            &self.core.config.dir,
            self.core.config.app_version,
            self.core.config.value_count,
            records.collect::<Vec<_>>(),
        )?;
        inner.journal_writer = Some(JournalWriter::append_existing(&self.core.config.dir)?);
        debug!(
            entries = inner.entries.len(),
            redundant_op_count = inner.redundant_op_count,
            "locus-cache: compacted journal"
        );
        inner.redundant_op_count = 0;
        Ok(())
    }

    fn trim_to_size_locked(&self, inner: &mut Inner) -> Result<()> {
        let max_size = self.effective_max_size();
        while inner.size > max_size {
            let Some((key, _)) = inner.entries.iter().next().map(|(k, v)| (k.clone(), v.clone())) else {
                break;
            };
            debug!(key = %key, size = inner.size, max_size, "locus-cache: evicting");
            self.remove_locked(inner, &key)?;
        }
        Ok(())
    }

    fn maybe_submit_trim(&self) {
        let should_submit = {
            let inner = self.core.state.lock();
            if inner.closed {
                false
            } else {
                inner.size > self.effective_max_size() || self.journal_rebuild_required(&inner)
            }
        };
        if !should_submit {
            return;
        }
        let cache = self.clone();
        self.core.trim_executor.submit(Box::new(move || {
            let mut inner = cache.core.state.lock();
            if inner.closed {
                return;
            }
            if let Err(error) = cache.trim_to_size_locked(&mut inner) {
                error!(%error, "locus-cache: trim failed");
                return;
            }
            if cache.journal_rebuild_required(&inner) {
                if let Err(error) = cache.rebuild_journal_locked(&mut inner) {
                    error!(%error, "locus-cache: journal rebuild failed");
                }
            }
        }));
    }

    /// Called by [`Editor::commit`]/[`Editor::abort`] under no external lock;
    /// acquires the cache lock itself.
    pub(crate) fn complete_edit(&self, key: &str, is_new: bool, written: &[bool], success: bool) -> Result<()> {
        let mut inner = self.core.state.lock();
        // Closed caches still allow completing an edit that was opened
        // before close, matching spec's close() semantics of aborting
        // in-flight editors rather than leaving them stuck.
        let value_count = self.core.config.value_count;

        let Some(entry) = inner.entries.get(key).cloned() else {
            return Err(CacheError::IllegalState {
                reason: format!("no entry for '{key}' during complete_edit"),
            });
        };

        if success {
            if is_new {
                for i in 0..value_count {
                    if !written[i] {
                        self.abort_edit_locked(&mut inner, key, is_new)?;
                        return Err(CacheError::IllegalState {
                            reason: format!("newly created entry didn't create value for index {i}"),
                        });
                    }
                }
            }

            let mut new_lengths = entry.lengths.clone();
            for i in 0..value_count {
                let dirty = Entry::dirty_path(&self.core.config.dir, key, i);
                if dirty.exists() {
                    let metadata = fs::metadata(&dirty).context(IoSnafu)?;
                    let clean = Entry::clean_path(&self.core.config.dir, key, i);
                    fs::rename(&dirty, &clean).context(IoSnafu)?;
                    let old_len = new_lengths[i];
                    new_lengths[i] = metadata.len();
                    inner.size = inner.size - old_len + metadata.len();
                } else if is_new {
                    // Should have been caught by the written[] check above.
                    return Err(CacheError::IllegalState {
                        reason: format!("missing dirty file for new entry index {i}"),
                    });
                }
            }

            let entry_mut = inner.entries.get_mut(key).expect("entry present");
            entry_mut.lengths = new_lengths.clone();
            entry_mut.readable = true;
            entry_mut.editing = false;
            entry_mut.sequence_number = inner.next_sequence_number;
            inner.next_sequence_number += 1;

            if let Some(writer) = inner.journal_writer.as_mut() {
                writer.write_clean(key, &new_lengths)?;
                writer.flush()?;
            }
            touch_mru(&mut inner, key);
        } else {
            self.abort_edit_locked(&mut inner, key, is_new)?;
        }

        drop(inner);
        self.maybe_submit_trim();
        Ok(())
    }

    fn abort_edit_locked(&self, inner: &mut Inner, key: &str, is_new: bool) -> Result<()> {
        let value_count = self.core.config.value_count;
        for i in 0..value_count {
            let dirty = Entry::dirty_path(&self.core.config.dir, key, i);
            let _ = fs::remove_file(dirty);
        }

        if is_new {
            inner.entries.shift_remove(key);
            if let Some(writer) = inner.journal_writer.as_mut() {
                writer.write_remove(key)?;
                writer.flush()?;
            }
        } else if let Some(entry) = inner.entries.get_mut(key) {
            entry.editing = false;
            if let Some(writer) = inner.journal_writer.as_mut() {
                writer.write_clean(key, &entry.lengths.clone())?;
                writer.flush()?;
            }
        }
        Ok(())
    }

    pub(crate) fn ensure_cache_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.core.config.dir).context(IoSnafu)?;
        Ok(())
    }

    pub(crate) fn is_append_mode(&self) -> bool {
        self.core.config.is_append_mode
    }

    pub(crate) fn dir(&self) -> PathBuf {
        self.core.config.dir.clone()
    }
}

fn touch_mru(inner: &mut Inner, key: &str) {
    move_to_back(&mut inner.entries, key);
}

fn check_key(key: &str) -> Result<()> {
    if validate_key(key) {
        Ok(())
    } else {
        Err(CacheError::InvalidKey { key: key.to_string() })
    }
}

fn ensure_open(inner: &Inner) -> Result<()> {
    if inner.closed {
        Err(CacheError::Closed)
    } else {
        Ok(())
    }
}

fn wipe_directory(dir: &std::path::Path) -> Result<()> {
    for entry in fs::read_dir(dir).context(IoSnafu)? {
        let entry = entry.context(IoSnafu)?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(path).context(IoSnafu)?;
        } else {
            fs::remove_file(path).context(IoSnafu)?;
        }
    }
    Ok(())
}

/// Replays parsed journal records into an in-memory entry index, per spec
/// §4.2. Returns the final map; orphaned (still-editing) entries are culled
/// by the caller afterward, since that step also requires filesystem access.
fn replay_records(entries: &mut IndexMap<String, Entry>, records: Vec<Record>, value_count: usize) {
    for record in records {
        let key = record.key().to_string();
        match record {
            Record::Dirty(key) => {
                entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry::new(key.clone(), value_count))
                    .editing = true;
                move_to_back(entries, &key);
            }
            Record::Clean(key, lengths) => {
                let entry = entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry::new(key.clone(), value_count));
                entry.lengths = lengths;
                entry.readable = true;
                entry.editing = false;
                move_to_back(entries, &key);
            }
            Record::Remove(_) => {
                entries.shift_remove(&key);
            }
            Record::Read(_) => {
                move_to_back(entries, &key);
            }
        }
    }
}


fn move_to_back(entries: &mut IndexMap<String, Entry>, key: &str) {
    if let Some(idx) = entries.get_index_of(key) {
        let last = entries.len() - 1;
        entries.move_index(idx, last);
    }
}

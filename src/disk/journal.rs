//! The on-disk journal protocol: an append-only, US-ASCII, newline-delimited
//! text log of entry state transitions, plus its compaction and crash-recovery
//! rules. See `spec.md` §4.1.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use snafu::ResultExt;

use super::error::{CacheError, IoSnafu, Result};

pub(crate) const MAGIC: &str = "libcore.io.DiskLruCache";
pub(crate) const VERSION: &str = "1";

pub(crate) const JOURNAL_FILE: &str = "journal";
pub(crate) const JOURNAL_TMP_FILE: &str = "journal.tmp";
pub(crate) const JOURNAL_BACKUP_FILE: &str = "journal.bkp";

const DIRTY: &str = "DIRTY";
const CLEAN: &str = "CLEAN";
const REMOVE: &str = "REMOVE";
const READ: &str = "READ";

/// One body record of the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    Dirty(String),
    Clean(String, Vec<u64>),
    Remove(String),
    Read(String),
}

impl Record {
    pub(crate) fn key(&self) -> &str {
        match self {
            Record::Dirty(k) | Record::Remove(k) | Record::Read(k) => k,
            Record::Clean(k, _) => k,
        }
    }

    fn render(&self) -> String {
        match self {
            Record::Dirty(k) => format!("{DIRTY} {k}\n"),
            Record::Remove(k) => format!("{REMOVE} {k}\n"),
            Record::Read(k) => format!("{READ} {k}\n"),
            Record::Clean(k, lens) => {
                let mut s = format!("{CLEAN} {k}");
                for len in lens {
                    s.push(' ');
                    s.push_str(&len.to_string());
                }
                s.push('\n');
                s
            }
        }
    }
}

/// Result of fully reading a journal: its declared `app_version`, `value_count`,
/// the parsed body records in order, and whether the final line was truncated
/// (unterminated), which forces immediate compaction on open.
pub(crate) struct JournalContents {
    pub(crate) app_version: u32,
    pub(crate) value_count: usize,
    pub(crate) records: Vec<Record>,
    pub(crate) truncated: bool,
}

/// Reads and parses the journal at `path`. Any header mismatch or malformed
/// body record is reported as [`CacheError::CorruptJournal`]; callers are
/// expected to wipe the directory and start fresh in that case, per spec §4.1.
pub(crate) fn read_journal(path: &Path) -> Result<JournalContents> {
    let file = File::open(path).context(IoSnafu)?;
    let mut reader = BufReader::new(file);

    let magic = read_line_trimmed(&mut reader)?;
    let version = read_line_trimmed(&mut reader)?;
    let app_version_line = read_line_trimmed(&mut reader)?;
    let value_count_line = read_line_trimmed(&mut reader)?;
    let blank = read_line_trimmed(&mut reader)?;

    if magic != MAGIC || version != VERSION || !blank.is_empty() {
        return Err(CacheError::CorruptJournal {
            reason: "header mismatch".to_string(),
        });
    }
    let app_version: u32 = app_version_line.parse().map_err(|_| CacheError::CorruptJournal {
        reason: format!("malformed app_version '{app_version_line}'"),
    })?;
    let value_count: usize = value_count_line.parse().map_err(|_| CacheError::CorruptJournal {
        reason: format!("malformed value_count '{value_count_line}'"),
    })?;

    let mut records = Vec::new();
    let mut truncated = false;
    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).context(IoSnafu)?;
        if bytes_read == 0 {
            break;
        }
        let ended_with_newline = line.ends_with('\n');
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }
        if !ended_with_newline {
            // A final, unterminated line: tolerated, but forces compaction.
            truncated = true;
            break;
        }
        records.push(parse_record(line, value_count)?);
    }

    Ok(JournalContents {
        app_version,
        value_count,
        records,
        truncated,
    })
}

fn read_line_trimmed<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).context(IoSnafu)?;
    if n == 0 {
        return Err(CacheError::CorruptJournal {
            reason: "unexpected end of file in header".to_string(),
        });
    }
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

fn parse_record(line: &str, value_count: usize) -> Result<Record> {
    let mut parts = line.splitn(2, ' ');
    let op = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default();

    match op {
        DIRTY => Ok(Record::Dirty(rest.to_string())),
        REMOVE => Ok(Record::Remove(rest.to_string())),
        READ => Ok(Record::Read(rest.to_string())),
        CLEAN => {
            let mut fields = rest.split(' ');
            let key = fields.next().ok_or_else(|| CacheError::CorruptJournal {
                reason: format!("malformed CLEAN record '{line}'"),
            })?;
            let mut lengths = Vec::with_capacity(value_count);
            for field in fields {
                let len: u64 = field.parse().map_err(|_| CacheError::CorruptJournal {
                    reason: format!("malformed length in CLEAN record '{line}'"),
                })?;
                lengths.push(len);
            }
            if lengths.len() != value_count {
                return Err(CacheError::CorruptJournal {
                    reason: format!(
                        "CLEAN record for '{key}' has {} lengths, expected {value_count}",
                        lengths.len()
                    ),
                });
            }
            Ok(Record::Clean(key.to_string(), lengths))
        }
        other => Err(CacheError::CorruptJournal {
            reason: format!("unrecognized record type '{other}'"),
        }),
    }
}

/// Buffered append-only journal writer. DIRTY records are flushed immediately
/// (spec §5: a crash after `edit` but before any write must be recoverable);
/// CLEAN/REMOVE are flushed by the caller after the corresponding filesystem
/// mutation completes. READ is appended but never flushed — it is an LRU hint
/// the cache can afford to lose.
pub(crate) struct JournalWriter {
    writer: BufWriter<File>,
}

impl JournalWriter {
    pub(crate) fn create(dir: &Path, app_version: u32, value_count: usize) -> Result<Self> {
        let path = dir.join(JOURNAL_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .context(IoSnafu)?;
        write_header(&mut file, app_version, value_count)?;
        file.flush().context(IoSnafu)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub(crate) fn append_existing(dir: &Path) -> Result<Self> {
        let path = dir.join(JOURNAL_FILE);
        let file = OpenOptions::new().append(true).open(&path).context(IoSnafu)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub(crate) fn write_dirty(&mut self, key: &str) -> Result<()> {
        self.writer
            .write_all(Record::Dirty(key.to_string()).render().as_bytes())
            .context(IoSnafu)?;
        self.writer.flush().context(IoSnafu)?;
        Ok(())
    }

    pub(crate) fn write_clean(&mut self, key: &str, lengths: &[u64]) -> Result<()> {
        self.writer
            .write_all(Record::Clean(key.to_string(), lengths.to_vec()).render().as_bytes())
            .context(IoSnafu)?;
        self.writer.flush().context(IoSnafu)?;
        Ok(())
    }

    pub(crate) fn write_remove(&mut self, key: &str) -> Result<()> {
        self.writer
            .write_all(Record::Remove(key.to_string()).render().as_bytes())
            .context(IoSnafu)?;
        self.writer.flush().context(IoSnafu)?;
        Ok(())
    }

    pub(crate) fn write_read(&mut self, key: &str) -> Result<()> {
        self.writer
            .write_all(Record::Read(key.to_string()).render().as_bytes())
            .context(IoSnafu)?;
        // Intentionally not flushed: see doc comment above.
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.writer.flush().context(IoSnafu)?;
        Ok(())
    }
}

fn write_header<W: Write>(writer: &mut W, app_version: u32, value_count: usize) -> Result<()> {
    writeln!(writer, "{MAGIC}").context(IoSnafu)?;
    writeln!(writer, "{VERSION}").context(IoSnafu)?;
    writeln!(writer, "{app_version}").context(IoSnafu)?;
    writeln!(writer, "{value_count}").context(IoSnafu)?;
    writeln!(writer).context(IoSnafu)?;
    Ok(())
}

/// One compacted journal record per in-memory entry: `DIRTY` for an entry
/// currently being edited for the first time, `CLEAN` (with lengths) for a
/// readable entry. Entries that are neither (empty, never-published) are
/// omitted entirely, matching spec §4.1.
pub(crate) enum CompactRecord {
    Dirty(String),
    Clean(String, Vec<u64>),
}

/// Writes a fresh journal containing only the header and the given compacted
/// records, then atomically promotes it over the live journal via the
/// rename/backup/delete sequence in spec §4.1.
pub(crate) fn compact(
    dir: &Path,
    app_version: u32,
    value_count: usize,
    records: impl IntoIterator<Item = CompactRecord>,
) -> Result<()> {
    let tmp_path = dir.join(JOURNAL_TMP_FILE);
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .context(IoSnafu)?;
        write_header(&mut file, app_version, value_count)?;
        for record in records {
            let rendered = match record {
                CompactRecord::Dirty(key) => Record::Dirty(key).render(),
                CompactRecord::Clean(key, lens) => Record::Clean(key, lens).render(),
            };
            file.write_all(rendered.as_bytes()).context(IoSnafu)?;
        }
        file.flush().context(IoSnafu)?;
    }
    promote_compacted_journal(dir)
}

fn promote_compacted_journal(dir: &Path) -> Result<()> {
    let journal = dir.join(JOURNAL_FILE);
    let backup = dir.join(JOURNAL_BACKUP_FILE);
    let tmp = dir.join(JOURNAL_TMP_FILE);

    if journal.exists() {
        fs::rename(&journal, &backup).context(IoSnafu)?;
    }
    fs::rename(&tmp, &journal).context(IoSnafu)?;
    if backup.exists() {
        fs::remove_file(&backup).context(IoSnafu)?;
    }
    Ok(())
}

/// Crash recovery for the compaction rename sequence, run at `open`. If a
/// backup exists, it means compaction crashed mid-rename: promote the backup
/// unless a current journal already won the race, in which case the backup
/// is simply stale and gets deleted.
pub(crate) fn recover_backup(dir: &Path) -> Result<()> {
    let journal = dir.join(JOURNAL_FILE);
    let backup = dir.join(JOURNAL_BACKUP_FILE);
    if !backup.exists() {
        return Ok(());
    }
    if journal.exists() {
        fs::remove_file(&backup).context(IoSnafu)?;
    } else {
        fs::rename(&backup, &journal).context(IoSnafu)?;
    }
    Ok(())
}

pub(crate) fn remove_stray_tmp(dir: &Path) -> io::Result<()> {
    let tmp = dir.join(JOURNAL_TMP_FILE);
    if tmp.exists() {
        fs::remove_file(&tmp)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip() {
        let cases = vec![
            Record::Dirty("file1".to_string()),
            Record::Clean("file1".to_string(), vec![10, 20]),
            Record::Remove("file1".to_string()),
            Record::Read("file1".to_string()),
        ];
        for record in cases {
            let rendered = record.render();
            let line = rendered.trim_end_matches('\n');
            let parsed = parse_record(line, 2).unwrap();
            assert_eq!(parsed, record);
        }
    }

    #[test]
    fn rejects_unknown_record() {
        let err = parse_record("BOGUS key", 1).unwrap_err();
        assert!(matches!(err, CacheError::CorruptJournal { .. }));
    }

    #[test]
    fn rejects_malformed_length() {
        let err = parse_record("CLEAN key notanumber", 1).unwrap_err();
        assert!(matches!(err, CacheError::CorruptJournal { .. }));
    }
}

//! Durability sinks.
//!
//! A [`JournalSink`] persists entries and branch records before the journal
//! indexes them. [`FileSink`] writes two JSON-lines files (`journal.jsonl` and
//! `branches.jsonl`) mirroring the persisted layout; [`MemorySink`] keeps
//! everything in memory for tests and ephemeral worlds.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use almanac_types::{BranchRecord, JournalEntry};

/// File name of the entry log inside a [`FileSink`] directory.
pub const JOURNAL_FILE: &str = "journal.jsonl";

/// File name of the branch table inside a [`FileSink`] directory.
pub const BRANCHES_FILE: &str = "branches.jsonl";

/// Errors raised by a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Filesystem failure.
    #[error("io error: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Serialization failure.
    #[error("encoding error: {source}")]
    Encode {
        /// Underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// A persisted line could not be decoded.
    #[error("corrupt line {line} in {path}")]
    Corrupt {
        /// File that failed to decode.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
    },

    /// The sink refuses writes (simulated storage outage).
    #[error("sink unavailable: {0}")]
    Unavailable(&'static str),
}

/// History loaded back from a sink.
#[derive(Debug, Default, Clone)]
pub struct Persisted {
    /// Branch-metadata rows in creation order.
    pub branches: Vec<BranchRecord>,
    /// Journal entries in append order.
    pub entries: Vec<JournalEntry>,
}

/// Durable backing store for the journal.
pub trait JournalSink: Send + Sync + core::fmt::Debug {
    /// Persist one entry. Must not return before the entry is durable.
    fn append(&mut self, entry: &JournalEntry) -> Result<(), SinkError>;

    /// Persist one branch-metadata row.
    fn record_branch(&mut self, record: &BranchRecord) -> Result<(), SinkError>;

    /// Load everything persisted so far.
    fn load(&self) -> Result<Persisted, SinkError>;
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// In-memory sink.
///
/// [`MemorySink::failing_after`] builds a sink that accepts a fixed number of
/// entry appends and then refuses every write, for exercising the engine's
/// durability-failure path.
#[derive(Debug, Default)]
pub struct MemorySink {
    persisted: Persisted,
    entry_budget: Option<usize>,
}

impl MemorySink {
    /// An unbounded in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that accepts `entries` entry appends, then fails.
    pub fn failing_after(entries: usize) -> Self {
        Self {
            persisted: Persisted::default(),
            entry_budget: Some(entries),
        }
    }
}

impl JournalSink for MemorySink {
    fn append(&mut self, entry: &JournalEntry) -> Result<(), SinkError> {
        if let Some(budget) = self.entry_budget.as_mut() {
            if *budget == 0 {
                return Err(SinkError::Unavailable("memory sink budget exhausted"));
            }
            *budget = budget.saturating_sub(1);
        }
        self.persisted.entries.push(entry.clone());
        Ok(())
    }

    fn record_branch(&mut self, record: &BranchRecord) -> Result<(), SinkError> {
        if self.entry_budget == Some(0) {
            return Err(SinkError::Unavailable("memory sink budget exhausted"));
        }
        self.persisted.branches.push(record.clone());
        Ok(())
    }

    fn load(&self) -> Result<Persisted, SinkError> {
        Ok(self.persisted.clone())
    }
}

// ---------------------------------------------------------------------------
// FileSink
// ---------------------------------------------------------------------------

/// JSON-lines sink rooted at a directory.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    journal: BufWriter<File>,
    branches: BufWriter<File>,
    fsync: bool,
}

impl FileSink {
    /// Open (creating if needed) a sink directory.
    ///
    /// With `fsync` set, every append is synced to stable storage before
    /// returning; otherwise it is flushed to the OS only.
    pub fn open(dir: impl AsRef<Path>, fsync: bool) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        trim_torn_tail(&dir.join(JOURNAL_FILE))?;
        trim_torn_tail(&dir.join(BRANCHES_FILE))?;
        let journal = BufWriter::new(append_handle(&dir.join(JOURNAL_FILE))?);
        let branches = BufWriter::new(append_handle(&dir.join(BRANCHES_FILE))?);
        Ok(Self {
            dir,
            journal,
            branches,
            fsync,
        })
    }

    /// Directory holding the sink files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Cut an unterminated final line left by a crash mid-append, so new rows
/// start on a fresh line.
fn trim_torn_tail(path: &Path) -> Result<(), SinkError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if bytes.last().is_none_or(|b| *b == b'\n') {
        return Ok(());
    }
    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos.saturating_add(1));
    warn!(path = %path.display(), dropped = bytes.len().saturating_sub(keep), "trimming torn journal tail");
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(u64::try_from(keep).unwrap_or(u64::MAX))?;
    file.sync_data()?;
    Ok(())
}

fn append_handle(path: &Path) -> Result<File, SinkError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn write_line<T: Serialize>(
    out: &mut BufWriter<File>,
    row: &T,
    fsync: bool,
) -> Result<(), SinkError> {
    serde_json::to_writer(&mut *out, row)?;
    out.write_all(b"\n")?;
    out.flush()?;
    if fsync {
        out.get_ref().sync_data()?;
    }
    Ok(())
}

/// Read every row of a JSON-lines file.
///
/// A final line that fails to decode is a torn write from a crash and is
/// dropped with a warning; a bad line anywhere else is corruption.
fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SinkError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let lines = BufReader::new(file)
        .lines()
        .collect::<Result<Vec<_>, _>>()?;
    let last = lines.len();
    let mut rows = Vec::with_capacity(last);
    for (i, line) in lines.iter().enumerate() {
        let number = i.saturating_add(1);
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(row) => rows.push(row),
            Err(_) if number == last => {
                warn!(path = %path.display(), line = number, "dropping torn final journal line");
            }
            Err(_) => {
                return Err(SinkError::Corrupt {
                    path: path.to_path_buf(),
                    line: number,
                });
            }
        }
    }
    Ok(rows)
}

impl JournalSink for FileSink {
    fn append(&mut self, entry: &JournalEntry) -> Result<(), SinkError> {
        write_line(&mut self.journal, entry, self.fsync)
    }

    fn record_branch(&mut self, record: &BranchRecord) -> Result<(), SinkError> {
        write_line(&mut self.branches, record, self.fsync)
    }

    fn load(&self) -> Result<Persisted, SinkError> {
        Ok(Persisted {
            branches: read_lines(&self.dir.join(BRANCHES_FILE))?,
            entries: read_lines(&self.dir.join(JOURNAL_FILE))?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use almanac_types::{BranchId, EntityId, EntryKind, Value};

    fn entry(seq: u64) -> JournalEntry {
        JournalEntry {
            seq,
            entity: EntityId::node("home"),
            key: "mood".to_owned(),
            branch: BranchId::trunk(),
            turn: 0,
            tick: seq.saturating_add(1),
            value: Some(Value::Int(0)),
            kind: EntryKind::Fact,
        }
    }

    #[test]
    fn memory_sink_budget_runs_out() {
        let mut sink = MemorySink::failing_after(1);
        assert!(sink.append(&entry(0)).is_ok());
        assert!(matches!(
            sink.append(&entry(1)),
            Err(SinkError::Unavailable(_))
        ));
        assert_eq!(sink.load().unwrap().entries.len(), 1);
    }

    #[test]
    fn file_sink_reloads_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = FileSink::open(dir.path(), false).unwrap();
            sink.record_branch(&BranchRecord::root(BranchId::trunk()))
                .unwrap();
            sink.append(&entry(0)).unwrap();
            sink.append(&entry(1)).unwrap();
        }
        let sink = FileSink::open(dir.path(), false).unwrap();
        let loaded = sink.load().unwrap();
        assert_eq!(loaded.branches.len(), 1);
        assert_eq!(loaded.entries, vec![entry(0), entry(1)]);
    }

    #[test]
    fn torn_final_line_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = FileSink::open(dir.path(), false).unwrap();
            sink.append(&entry(0)).unwrap();
        }
        let mut raw = OpenOptions::new()
            .append(true)
            .open(dir.path().join(JOURNAL_FILE))
            .unwrap();
        raw.write_all(b"{\"seq\":1,\"enti").unwrap();
        drop(raw);

        let loaded = FileSink::open(dir.path(), false).unwrap().load().unwrap();
        assert_eq!(loaded.entries.len(), 1);
    }

    #[test]
    fn corruption_mid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(JOURNAL_FILE),
            "garbage\n{\"also\":\"bad\"}\n",
        )
        .unwrap();
        let sink = FileSink::open(dir.path(), false).unwrap();
        assert!(matches!(
            sink.load(),
            Err(SinkError::Corrupt { line: 1, .. })
        ));
    }
}

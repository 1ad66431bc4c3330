//! Mirroring the journal into the Postgres cold archive.
//!
//! The archive is best-effort: the file journal is the durable record, and a
//! failed flush only logs a warning and retries on the next wake-up. Every
//! insert is idempotent, so a flush that partly succeeded is safe to repeat.
//!
//! ```text
//! turn completes --> ArchiveNotifier --notify--> run_archiver
//!                                                 |
//!                     interval tick --------------+
//!                                                 +-- record_branches() --> branches
//!                                                 +-- archive_entries() --> journal_entries
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use almanac_core::{Engine, TurnListener};
use almanac_db::{DbError, JournalArchive};
use almanac_types::TurnReport;

/// How often the archiver flushes when no turn wakes it, so writes made
/// outside turns (edits, forks) also reach the archive.
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Errors from one archive flush.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive rejected the write.
    #[error("archive write failed: {source}")]
    Db {
        /// The underlying database error.
        #[from]
        source: DbError,
    },

    /// Reading the journal on the blocking pool failed.
    #[error("journal read task failed: {source}")]
    Read {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}

/// Wakes the archiver after every completed turn.
#[derive(Debug)]
pub struct ArchiveNotifier {
    notify: Arc<Notify>,
}

impl ArchiveNotifier {
    /// A notifier that wakes `notify`.
    pub const fn new(notify: Arc<Notify>) -> Self {
        Self { notify }
    }
}

impl TurnListener for ArchiveNotifier {
    fn on_turn(&self, report: &TurnReport) {
        debug!(branch = %report.branch, turn = report.start.turn, "waking archiver");
        self.notify.notify_one();
    }
}

/// Copy journal entries at or after `cursor` into the archive.
///
/// Returns the cursor for the next flush.
async fn flush(engine: &Arc<Engine>, archive: &JournalArchive, cursor: u64) -> Result<u64, ArchiveError> {
    let source = Arc::clone(engine);
    let (branches, entries) =
        tokio::task::spawn_blocking(move || (source.branches(), source.entries_since(cursor))).await?;

    archive.record_branches(&branches).await?;
    let Some(last) = entries.last() else {
        return Ok(cursor);
    };
    let next = last.seq.saturating_add(1);
    let inserted = archive.archive_entries(&entries).await?;
    debug!(from = cursor, to = next, inserted, "journal entries archived");
    Ok(next)
}

/// Run until `shutdown` flips, flushing on every wake-up and once more on
/// the way out.
pub async fn run_archiver(
    engine: Arc<Engine>,
    archive: JournalArchive,
    notify: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut cursor = match archive.last_seq().await {
        Ok(last) => last.map_or(0, |seq| seq.saturating_add(1)),
        Err(e) => {
            warn!(error = %e, "could not read archive position, starting from the beginning");
            0
        }
    };
    info!(cursor, "archiver started");

    let mut interval = tokio::time::interval(FLUSH_INTERVAL);
    loop {
        let stopping = tokio::select! {
            () = notify.notified() => false,
            _ = interval.tick() => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        };

        match flush(&engine, &archive, cursor).await {
            Ok(next) => cursor = next,
            Err(e) => warn!(error = %e, cursor, "archive flush failed, will retry"),
        }

        if stopping {
            break;
        }
    }

    archive.close().await;
    info!(cursor, "archiver stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use almanac_types::{BranchId, Coord};

    #[tokio::test]
    async fn completed_turns_wake_the_archiver() {
        let notify = Arc::new(Notify::new());
        let engine = Engine::in_memory();
        engine.subscribe(Arc::new(ArchiveNotifier::new(Arc::clone(&notify))));

        let report = engine.advance_turn(&BranchId::trunk()).unwrap();
        assert_eq!(report.start, Coord::turn_start(1));
        tokio::time::timeout(Duration::from_secs(1), notify.notified())
            .await
            .unwrap();
    }
}

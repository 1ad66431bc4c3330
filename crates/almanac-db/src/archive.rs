//! Journal archive operations.
//!
//! The archive is a cold, queryable mirror of the journal: every entry the
//! engine appends is eventually copied into `journal_entries`, and every
//! branch into `branches`. Inserts are idempotent on `seq` and `branch_id`,
//! so re-archiving an overlapping range is harmless.
//!
//! The archive is never read on the hot path. [`JournalArchive::load`]
//! rebuilds the persisted layout from it for disaster recovery.
//!
//! Queries are built at runtime (not compile-time checked) so builds never
//! need a live database. All of them are parameterized.

use std::str::FromStr;
use std::time::Duration;

use almanac_journal::Persisted;
use almanac_types::{BranchId, BranchRecord, EntityId, EntryKind, JournalEntry, Value};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::error::DbError;

/// Default batch size for entry inserts.
const DEFAULT_BATCH_SIZE: usize = 500;

/// How long a flush waits for a free connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Archive connections idle longer than this are dropped between flushes.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

fn to_db(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_db(seq: i64, column: &str, n: i64) -> Result<u64, DbError> {
    u64::try_from(n).map_err(|e| DbError::CorruptRow {
        seq,
        reason: format!("{column}: {e}"),
    })
}

/// Operations on the `journal_entries` and `branches` tables.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct JournalArchive {
    pool: PgPool,
    batch_size: usize,
}

impl JournalArchive {
    /// Connect to the archive at `url` and bring its schema up to date.
    ///
    /// At most `max_connections` connections are held. The archive is ready
    /// to take entries once this returns.
    ///
    /// # Errors
    ///
    /// [`DbError::BadUrl`] if `url` does not parse, [`DbError::Postgres`]
    /// if the database is unreachable, and [`DbError::Migration`] if the
    /// archive schema cannot be applied.
    pub async fn open(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| DbError::BadUrl(e.to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_with(options)
            .await?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            pool.close().await;
            return Err(e.into());
        }
        tracing::info!(max_connections, "Journal archive ready");
        Ok(Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Close the archive's connections. Pending queries finish first.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Journal archive closed");
    }

    /// Set the batch size for inserts.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = if size == 0 { 1 } else { size };
        self
    }

    /// Insert branch rows that are not archived yet.
    ///
    /// `branches` must list parents before children, as
    /// [`Journal::branch_records`](almanac_journal::Journal::branch_records)
    /// does. Returns the number of new rows.
    pub async fn record_branches(&self, branches: &[BranchRecord]) -> Result<u64, DbError> {
        if branches.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = branches.iter().map(|b| b.id.to_string()).collect();
        let parents: Vec<Option<String>> = branches
            .iter()
            .map(|b| b.parent.as_ref().map(ToString::to_string))
            .collect();
        let fork_turns: Vec<i64> = branches.iter().map(|b| to_db(b.fork_turn)).collect();
        let fork_ticks: Vec<i64> = branches.iter().map(|b| to_db(b.fork_tick)).collect();

        let result = sqlx::query(
            r"INSERT INTO branches (branch_id, parent_branch_id, fork_turn, fork_tick)
              SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::BIGINT[], $4::BIGINT[])
              ON CONFLICT (branch_id) DO NOTHING",
        )
        .bind(&ids)
        .bind(&parents)
        .bind(&fork_turns)
        .bind(&fork_ticks)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected();
        if inserted > 0 {
            tracing::debug!(count = inserted, "Archived branches");
        }
        Ok(inserted)
    }

    /// Batch-insert journal entries.
    ///
    /// Each batch is one `UNNEST` insert inside its own transaction. Entries
    /// already archived are skipped. Returns the number of new rows.
    pub async fn archive_entries(&self, entries: &[JournalEntry]) -> Result<u64, DbError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut inserted: u64 = 0;
        for chunk in entries.chunks(self.batch_size) {
            let mut tx = self.pool.begin().await?;

            let len = chunk.len();
            let mut seqs = Vec::with_capacity(len);
            let mut entity_ids = Vec::with_capacity(len);
            let mut keys = Vec::with_capacity(len);
            let mut branch_ids = Vec::with_capacity(len);
            let mut turns = Vec::with_capacity(len);
            let mut ticks = Vec::with_capacity(len);
            let mut values: Vec<Option<serde_json::Value>> = Vec::with_capacity(len);
            let mut kinds = Vec::with_capacity(len);

            for entry in chunk {
                seqs.push(to_db(entry.seq));
                entity_ids.push(entry.entity.to_string());
                keys.push(entry.key.clone());
                branch_ids.push(entry.branch.to_string());
                turns.push(to_db(entry.turn));
                ticks.push(to_db(entry.tick));
                values.push(entry.value.as_ref().map(serde_json::to_value).transpose()?);
                kinds.push(entry.kind.as_str().to_owned());
            }

            let result = sqlx::query(
                r"INSERT INTO journal_entries (seq, entity_id, key, branch_id, turn, tick, value, kind)
                  SELECT * FROM UNNEST($1::BIGINT[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::BIGINT[], $6::BIGINT[], $7::JSONB[], $8::TEXT[])
                  ON CONFLICT (seq) DO NOTHING",
            )
            .bind(&seqs)
            .bind(&entity_ids)
            .bind(&keys)
            .bind(&branch_ids)
            .bind(&turns)
            .bind(&ticks)
            .bind(&values)
            .bind(&kinds)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            inserted = inserted.saturating_add(result.rows_affected());
        }

        tracing::debug!(count = inserted, "Archived journal entries (batch UNNEST)");
        Ok(inserted)
    }

    /// Highest archived sequence number, if anything is archived.
    pub async fn last_seq(&self) -> Result<Option<u64>, DbError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(seq) FROM journal_entries")
            .fetch_one(&self.pool)
            .await?;
        max.map(|seq| from_db(seq, "seq", seq)).transpose()
    }

    /// Entries written on `branch` itself for (entity, key), oldest first.
    pub async fn history(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
    ) -> Result<Vec<JournalEntryRow>, DbError> {
        let rows = sqlx::query_as::<_, JournalEntryRow>(
            r"SELECT seq, entity_id, key, branch_id, turn, tick, value, kind, archived_at
              FROM journal_entries
              WHERE branch_id = $1 AND entity_id = $2 AND key = $3
              ORDER BY turn, tick",
        )
        .bind(branch.as_str())
        .bind(entity.to_string())
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every archived branch, in archive order.
    pub async fn branches(&self) -> Result<Vec<BranchRow>, DbError> {
        let rows = sqlx::query_as::<_, BranchRow>(
            r"SELECT branch_id, parent_branch_id, fork_turn, fork_tick, archived_at
              FROM branches
              ORDER BY ordinal",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// The whole archive in the persisted journal layout, ready for
    /// [`Journal::rebuild`](almanac_journal::Journal::rebuild).
    pub async fn load(&self) -> Result<Persisted, DbError> {
        let branches = self
            .branches()
            .await?
            .into_iter()
            .map(BranchRow::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        let entries = sqlx::query_as::<_, JournalEntryRow>(
            r"SELECT seq, entity_id, key, branch_id, turn, tick, value, kind, archived_at
              FROM journal_entries
              ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(JournalEntryRow::into_entry)
        .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(
            branches = branches.len(),
            entries = entries.len(),
            "Loaded journal archive"
        );
        Ok(Persisted { branches, entries })
    }
}

/// A row from the `journal_entries` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JournalEntryRow {
    /// Journal sequence number.
    pub seq: i64,
    /// Entity in text form (`node:home`).
    pub entity_id: String,
    /// Attribute key.
    pub key: String,
    /// Branch the entry was written on.
    pub branch_id: String,
    /// Turn of the write.
    pub turn: i64,
    /// Tick of the write.
    pub tick: i64,
    /// Written value; `NULL` is a tombstone.
    pub value: Option<serde_json::Value>,
    /// Entry kind (`fact`, `fault`, ...).
    pub kind: String,
    /// When the row was archived.
    pub archived_at: DateTime<Utc>,
}

impl JournalEntryRow {
    /// Decode back into a [`JournalEntry`].
    pub fn into_entry(self) -> Result<JournalEntry, DbError> {
        let seq = self.seq;
        let corrupt = |reason: String| DbError::CorruptRow { seq, reason };
        let entity = EntityId::from_str(&self.entity_id).map_err(|e| corrupt(e.to_string()))?;
        let kind: EntryKind = serde_json::from_value(serde_json::Value::String(self.kind))
            .map_err(|e| corrupt(format!("kind: {e}")))?;
        let value = self
            .value
            .map(serde_json::from_value::<Value>)
            .transpose()
            .map_err(|e| corrupt(format!("value: {e}")))?;
        Ok(JournalEntry {
            seq: from_db(seq, "seq", seq)?,
            entity,
            key: self.key,
            branch: BranchId::new(self.branch_id),
            turn: from_db(seq, "turn", self.turn)?,
            tick: from_db(seq, "tick", self.tick)?,
            value,
            kind,
        })
    }
}

/// A row from the `branches` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BranchRow {
    /// Branch name.
    pub branch_id: String,
    /// Parent branch, `NULL` for the root.
    pub parent_branch_id: Option<String>,
    /// Fork turn in the parent.
    pub fork_turn: i64,
    /// Fork tick in the parent.
    pub fork_tick: i64,
    /// When the row was archived.
    pub archived_at: DateTime<Utc>,
}

impl BranchRow {
    /// Decode back into a [`BranchRecord`].
    pub fn into_record(self) -> Result<BranchRecord, DbError> {
        Ok(BranchRecord {
            fork_turn: from_db(0, "fork_turn", self.fork_turn)?,
            fork_tick: from_db(0, "fork_tick", self.fork_tick)?,
            id: BranchId::new(self.branch_id),
            parent: self.parent_branch_id.map(BranchId::new),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(entity: &str, kind: &str, value: Option<serde_json::Value>) -> JournalEntryRow {
        JournalEntryRow {
            seq: 4,
            entity_id: entity.to_owned(),
            key: "mood".to_owned(),
            branch_id: "trunk".to_owned(),
            turn: 2,
            tick: 1,
            value,
            kind: kind.to_owned(),
            archived_at: Utc::now(),
        }
    }

    #[test]
    fn row_decodes_to_entry() {
        let entry = row("node:home", "fact", Some(serde_json::json!(3)))
            .into_entry()
            .unwrap();
        assert_eq!(entry.seq, 4);
        assert_eq!(entry.entity, EntityId::node("home"));
        assert_eq!(entry.kind, EntryKind::Fact);
        assert_eq!(entry.value, Some(Value::Int(3)));

        let tombstone = row("node:home", "fact", None).into_entry().unwrap();
        assert_eq!(tombstone.value, None);
    }

    #[test]
    fn bad_rows_are_reported() {
        assert!(matches!(
            row("planet:mars", "fact", None).into_entry(),
            Err(DbError::CorruptRow { seq: 4, .. })
        ));
        assert!(matches!(
            row("node:home", "gossip", None).into_entry(),
            Err(DbError::CorruptRow { .. })
        ));
        let mut negative = row("node:home", "fact", None);
        negative.turn = -1;
        assert!(negative.into_entry().is_err());
    }

    #[test]
    fn branch_row_decodes() {
        let record = BranchRow {
            branch_id: "trunk.1".to_owned(),
            parent_branch_id: Some("trunk".to_owned()),
            fork_turn: 3,
            fork_tick: 2,
            archived_at: Utc::now(),
        }
        .into_record()
        .unwrap();
        assert_eq!(record.parent, Some(BranchId::trunk()));
        assert_eq!(record.fork_turn, 3);
    }

    #[tokio::test]
    async fn unparseable_url_is_refused_before_connecting() {
        let err = JournalArchive::open("not a database url", 1).await.unwrap_err();
        assert!(matches!(err, DbError::BadUrl(_)), "{err}");
    }
}

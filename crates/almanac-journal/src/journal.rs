//! The journal: an append-only log of every write, indexed per branch.
//!
//! The [`Journal`] struct owns all entries and all branch states. Reads walk
//! the branch's ancestor chain: a branch answers from its own entries first,
//! then asks its parent with the coordinate capped at the fork point, and so
//! on up to the root.
//!
//! # Design
//!
//! - **Append-only**: entries are never modified or deleted.
//! - **Strictly advancing**: each append lands strictly after the branch
//!   frontier, so history below the frontier never changes.
//! - **Durable first**: the sink sees an entry before the index does.
//! - **No copying on fork**: a child branch stores only its own entries.

use std::collections::BTreeMap;

use tracing::{debug, info};

use almanac_types::{
    BranchId, BranchRecord, Coord, EntityId, EntityKind, EntryKind, JournalEntry, Value, keys,
};

use crate::JournalError;
use crate::branch::{BranchState, child_name};
use crate::sink::{JournalSink, MemorySink};

// ---------------------------------------------------------------------------
// NewEntry
// ---------------------------------------------------------------------------

/// An entry waiting to be appended: a [`JournalEntry`] without its sequence
/// number or coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    /// Entity the entry is about.
    pub entity: EntityId,
    /// Attribute key.
    pub key: String,
    /// Written value; `None` is a tombstone.
    pub value: Option<Value>,
    /// Entry kind.
    pub kind: EntryKind,
}

impl NewEntry {
    /// A fact write.
    pub fn fact(entity: EntityId, key: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            entity,
            key: key.into(),
            value,
            kind: EntryKind::Fact,
        }
    }

    /// A definition write. The kind follows the entity kind.
    pub fn definition(entity: EntityId, key: impl Into<String>, value: Value) -> Self {
        let kind = match entity.kind() {
            EntityKind::Rulebook => EntryKind::Rulebook,
            EntityKind::Rule => EntryKind::Rule,
            EntityKind::Trigger => EntryKind::Trigger,
            EntityKind::Action => EntryKind::Action,
            _ => EntryKind::Fact,
        };
        Self {
            entity,
            key: key.into(),
            value: Some(value),
            kind,
        }
    }

    /// A rule fault record on the subject entity.
    pub fn fault(entity: EntityId, record: Value) -> Self {
        Self {
            entity,
            key: keys::FAULT.to_owned(),
            value: Some(record),
            kind: EntryKind::Fault,
        }
    }

    /// A turn start or end marker.
    pub fn turn_marker(turn: u64, end: bool) -> Self {
        let mut marker = BTreeMap::new();
        marker.insert(
            "phase".to_owned(),
            Value::from(if end { "end" } else { "start" }),
        );
        marker.insert(
            "turn".to_owned(),
            Value::Int(i64::try_from(turn).unwrap_or(i64::MAX)),
        );
        Self {
            entity: EntityId::Universal,
            key: keys::TURN.to_owned(),
            value: Some(Value::Map(marker)),
            kind: EntryKind::Turn,
        }
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// The authoritative, append-only history of every branch.
#[derive(Debug)]
pub struct Journal {
    /// All entries, in append order. `entries[i].seq == i`.
    entries: Vec<JournalEntry>,
    /// Branch states keyed by name.
    branches: BTreeMap<BranchId, BranchState>,
    /// Branch names in creation order.
    branch_order: Vec<BranchId>,
    /// Durable backing store.
    sink: Box<dyn JournalSink>,
}

impl Journal {
    /// Create an empty journal with a root branch, persisting the root row.
    pub fn create(root: BranchId, mut sink: Box<dyn JournalSink>) -> Result<Self, JournalError> {
        let record = BranchRecord::root(root);
        sink.record_branch(&record)?;
        let mut journal = Self::empty(sink);
        journal.insert_branch(record);
        Ok(journal)
    }

    /// An in-memory journal with a root branch named `trunk`.
    pub fn in_memory() -> Self {
        let mut journal = Self::empty(Box::new(MemorySink::new()));
        journal.insert_branch(BranchRecord::root(BranchId::trunk()));
        journal
    }

    pub(crate) fn empty(sink: Box<dyn JournalSink>) -> Self {
        Self {
            entries: Vec::new(),
            branches: BTreeMap::new(),
            branch_order: Vec::new(),
            sink,
        }
    }

    pub(crate) fn insert_branch(&mut self, record: BranchRecord) {
        let id = record.id.clone();
        self.branches.insert(id.clone(), BranchState::new(record));
        self.branch_order.push(id);
    }

    // ----- Introspection -----

    /// Total number of entries across all branches.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal holds no entries.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in append order.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Entries with `seq >= from`, in append order.
    pub fn entries_since(&self, from: u64) -> &[JournalEntry] {
        let start = usize::try_from(from).unwrap_or(usize::MAX);
        self.entries.get(start..).unwrap_or_default()
    }

    /// Entries written on `branch` itself (not inherited), in append order.
    pub fn branch_entries<'a>(
        &'a self,
        branch: &'a BranchId,
    ) -> impl Iterator<Item = &'a JournalEntry> + 'a {
        self.entries.iter().filter(move |e| &e.branch == branch)
    }

    /// Branch-metadata rows in creation order.
    pub fn branch_records(&self) -> Vec<&BranchRecord> {
        self.branch_order
            .iter()
            .filter_map(|id| self.branches.get(id).map(|state| &state.record))
            .collect()
    }

    /// State of one branch.
    pub fn branch(&self, branch: &BranchId) -> Result<&BranchState, JournalError> {
        self.branches
            .get(branch)
            .ok_or_else(|| JournalError::UnknownBranch {
                branch: branch.clone(),
            })
    }

    /// Whether `branch` exists.
    pub fn has_branch(&self, branch: &BranchId) -> bool {
        self.branches.contains_key(branch)
    }

    /// Current frontier of `branch`.
    pub fn frontier(&self, branch: &BranchId) -> Result<Coord, JournalError> {
        Ok(self.branch(branch)?.frontier)
    }

    /// Branches holding a turn start marker without an end marker.
    pub fn incomplete_turns(&self) -> Vec<(BranchId, u64)> {
        self.branch_order
            .iter()
            .filter_map(|id| {
                let state = self.branches.get(id)?;
                state.open_turn.map(|turn| (id.clone(), turn))
            })
            .collect()
    }

    /// The chain `[(branch, cap), (parent, fork), ...]` up to the root.
    ///
    /// Each element's cap is the largest coordinate that ancestor may
    /// contribute to a read on `branch` at `at`.
    pub fn lineage(
        &self,
        branch: &BranchId,
        at: Coord,
    ) -> Result<Vec<(&BranchState, Coord)>, JournalError> {
        let mut chain = Vec::new();
        let mut state = self.branch(branch)?;
        let mut cap = at;
        loop {
            chain.push((state, cap));
            let Some(parent) = state.parent() else {
                return Ok(chain);
            };
            cap = cap.min(state.record.fork_coord());
            state = self.branch(parent)?;
        }
    }

    // ----- Reads -----

    /// The latest entry for (entity, key) visible from `branch` at `at`.
    ///
    /// Tombstones are returned as entries with `value: None`; callers decide
    /// whether that means "not found".
    pub fn read(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        at: Coord,
    ) -> Result<Option<&JournalEntry>, JournalError> {
        for (state, cap) in self.lineage(branch, at)? {
            if let Some(pos) = state.latest(entity, key, cap) {
                return Ok(self.entries.get(pos));
            }
        }
        Ok(None)
    }

    /// The value of (entity, key) visible from `branch` at `at`.
    pub fn value(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        at: Coord,
    ) -> Result<Option<Value>, JournalError> {
        Ok(self
            .read(branch, entity, key, at)?
            .and_then(|entry| entry.value.clone()))
    }

    /// Every entry for (entity, key) visible from `branch` with turn in
    /// `from_turn..=to_turn`, ordered by coordinate.
    ///
    /// When a value written before the span is still in effect at
    /// `(from_turn, 0)`, its entry leads the result at its own coordinate.
    pub fn read_range(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        from_turn: u64,
        to_turn: u64,
    ) -> Result<Vec<&JournalEntry>, JournalError> {
        let lo = Coord::turn_start(from_turn);
        let carried = self
            .read(branch, entity, key, lo)?
            .filter(|entry| entry.coord() < lo && entry.value.is_some());
        let chain = self.lineage(branch, Coord::turn_end(to_turn))?;
        // Ancestors contribute only coordinates at or below their cap, which
        // precede everything the descendant wrote; root-first is in order.
        Ok(carried
            .into_iter()
            .chain(
                chain
                    .iter()
                    .rev()
                    .flat_map(|(state, cap)| state.span(entity, key, lo, *cap))
                    .filter_map(|pos| self.entries.get(pos)),
            )
            .collect())
    }

    /// Graph entities of `kind` ever created on the lineage of `branch` at or
    /// before `at`, in first-creation order.
    ///
    /// Existence is not checked here; a deleted entity is still listed.
    pub fn creations(
        &self,
        branch: &BranchId,
        kind: EntityKind,
        at: Coord,
    ) -> Result<Vec<EntityId>, JournalError> {
        let chain = self.lineage(branch, at)?;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (state, cap) in chain.iter().rev() {
            let Some(events) = state.creations.get(&kind) else {
                continue;
            };
            for (coord, entity) in events {
                if coord <= cap && seen.insert(entity) {
                    out.push(entity.clone());
                }
            }
        }
        Ok(out)
    }

    /// The last tick written in `turn` as seen from `branch`.
    pub fn turn_end(&self, branch: &BranchId, turn: u64) -> Result<Option<u64>, JournalError> {
        let frontier = self.frontier(branch)?;
        for (state, cap) in self.lineage(branch, frontier)? {
            if turn > cap.turn {
                continue;
            }
            if let Some(&tick) = state.turn_ends.get(&turn) {
                return Ok(Some(if turn == cap.turn {
                    tick.min(cap.tick)
                } else {
                    tick
                }));
            }
        }
        Ok(None)
    }

    // ----- Writes -----

    /// Append an entry at exactly `at` on `branch`.
    ///
    /// Fails with [`JournalError::AppendToMissingBranch`] or
    /// [`JournalError::NotAfterFrontier`] without touching anything, and with
    /// [`JournalError::Durability`] if the sink refuses the entry.
    pub fn append(
        &mut self,
        branch: &BranchId,
        at: Coord,
        entry: NewEntry,
    ) -> Result<&JournalEntry, JournalError> {
        let Some(state) = self.branches.get(branch) else {
            return Err(JournalError::AppendToMissingBranch {
                branch: branch.clone(),
            });
        };
        if at <= state.frontier {
            return Err(JournalError::NotAfterFrontier {
                branch: branch.clone(),
                coord: at,
                frontier: state.frontier,
            });
        }
        let seq = u64::try_from(self.entries.len()).map_err(|_| JournalError::Overflow {
            branch: branch.clone(),
            coord: at,
        })?;
        let record = JournalEntry {
            seq,
            entity: entry.entity,
            key: entry.key,
            branch: branch.clone(),
            turn: at.turn,
            tick: at.tick,
            value: entry.value,
            kind: entry.kind,
        };
        self.sink.append(&record)?;
        self.index(record)
    }

    /// Append an entry at the next tick after the frontier.
    pub fn append_next(
        &mut self,
        branch: &BranchId,
        entry: NewEntry,
    ) -> Result<&JournalEntry, JournalError> {
        let frontier = self.frontier(branch)?;
        let at = frontier.next_tick().ok_or_else(|| JournalError::Overflow {
            branch: branch.clone(),
            coord: frontier,
        })?;
        self.append(branch, at, entry)
    }

    /// Advance `branch` to the start of its next turn and journal the start
    /// marker there. Returns the new frontier.
    ///
    /// Fails with [`JournalError::TurnInProgress`] while the branch holds a
    /// turn that started but never ended.
    pub fn advance_turn(&mut self, branch: &BranchId) -> Result<Coord, JournalError> {
        let state = self.branch(branch)?;
        if let Some(turn) = state.open_turn {
            return Err(JournalError::TurnInProgress {
                branch: branch.clone(),
                turn,
            });
        }
        let frontier = state.frontier;
        let at = frontier.next_turn().ok_or_else(|| JournalError::Overflow {
            branch: branch.clone(),
            coord: frontier,
        })?;
        self.append(branch, at, NewEntry::turn_marker(at.turn, false))?;
        info!(branch = %branch, turn = at.turn, "turn started");
        Ok(at)
    }

    /// Journal the end marker for the turn in progress on `branch`.
    pub fn end_turn(&mut self, branch: &BranchId) -> Result<Coord, JournalError> {
        let turn = self.frontier(branch)?.turn;
        Ok(self
            .append_next(branch, NewEntry::turn_marker(turn, true))?
            .coord())
    }

    /// Create a child of `parent` forking at `at`.
    ///
    /// Forking the same parent at the same coordinate twice yields two
    /// sibling branches. Without a `name`, the first free `{parent}.{n}` is
    /// used.
    pub fn fork(
        &mut self,
        parent: &BranchId,
        at: Coord,
        name: Option<BranchId>,
    ) -> Result<BranchRecord, JournalError> {
        let state = self.branch(parent)?;
        if at > state.frontier {
            return Err(JournalError::BeyondFrontier {
                branch: parent.clone(),
                coord: at,
                frontier: state.frontier,
            });
        }
        if state.parent().is_some() && at < state.record.fork_coord() {
            return Err(JournalError::BeforeParentFork {
                parent: parent.clone(),
                coord: at,
                fork: state.record.fork_coord(),
            });
        }
        let id = match name {
            Some(id) if self.branches.contains_key(&id) => {
                return Err(JournalError::BranchExists { branch: id });
            }
            Some(id) => id,
            None => self.free_child_name(parent),
        };
        let record = BranchRecord {
            id,
            parent: Some(parent.clone()),
            fork_turn: at.turn,
            fork_tick: at.tick,
        };
        self.sink.record_branch(&record)?;
        self.insert_branch(record.clone());
        debug!(branch = %record.id, parent = %parent, turn = at.turn, tick = at.tick, "branch forked");
        Ok(record)
    }

    fn free_child_name(&self, parent: &BranchId) -> BranchId {
        let mut n: u64 = 1;
        loop {
            let candidate = child_name(parent, n);
            if !self.branches.contains_key(&candidate) {
                return candidate;
            }
            n = n.saturating_add(1);
        }
    }

    /// Add an already-persisted entry to the indexes.
    pub(crate) fn index(&mut self, entry: JournalEntry) -> Result<&JournalEntry, JournalError> {
        let at = entry.coord();
        let pos = self.entries.len();
        let state = self
            .branches
            .get_mut(&entry.branch)
            .ok_or_else(|| JournalError::Corrupt {
                seq: entry.seq,
                reason: format!("entry on unknown branch {}", entry.branch),
            })?;
        if at <= state.frontier {
            return Err(JournalError::Corrupt {
                seq: entry.seq,
                reason: format!("{at} does not advance {}", state.frontier),
            });
        }

        state
            .index
            .entry(entry.entity.clone())
            .or_default()
            .entry(entry.key.clone())
            .or_default()
            .insert(at, pos);
        if entry.kind == EntryKind::Fact
            && entry.key == keys::EXISTS
            && entry.value == Some(Value::Bool(true))
            && entry.entity.kind().is_graph()
        {
            state
                .creations
                .entry(entry.entity.kind())
                .or_default()
                .push((at, entry.entity.clone()));
        }
        if entry.kind == EntryKind::Turn {
            state.open_turn = match &entry.value {
                Some(Value::Map(m)) if m.get("phase") == Some(&Value::from("end")) => None,
                _ => Some(at.turn),
            };
        }
        state.turn_ends.insert(at.turn, at.tick);
        state.frontier = at;
        state.len = state.len.saturating_add(1);

        self.entries.push(entry);
        self.entries
            .last()
            .ok_or_else(|| JournalError::Corrupt {
                seq: u64::try_from(pos).unwrap_or(u64::MAX),
                reason: "entry vanished after push".to_owned(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn home() -> EntityId {
        EntityId::node("home")
    }

    fn mood(v: i64) -> NewEntry {
        NewEntry::fact(home(), "mood", Some(Value::Int(v)))
    }

    fn trunk() -> BranchId {
        BranchId::trunk()
    }

    #[test]
    fn read_before_write_is_empty() {
        let journal = Journal::in_memory();
        let hit = journal.read(&trunk(), &home(), "mood", Coord::new(9, 9)).unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn append_must_strictly_advance() {
        let mut journal = Journal::in_memory();
        journal.append(&trunk(), Coord::new(0, 1), mood(1)).unwrap();
        let err = journal.append(&trunk(), Coord::new(0, 1), mood(2)).unwrap_err();
        assert!(matches!(err, JournalError::NotAfterFrontier { .. }));
        let err = journal.append(&trunk(), Coord::new(0, 0), mood(2)).unwrap_err();
        assert!(matches!(err, JournalError::NotAfterFrontier { .. }));
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn append_to_missing_branch_is_concurrency() {
        let mut journal = Journal::in_memory();
        let err = journal
            .append(&BranchId::new("ghost"), Coord::new(0, 1), mood(1))
            .unwrap_err();
        assert_eq!(err.kind(), almanac_types::ErrorKind::Concurrency);
    }

    #[test]
    fn reads_see_latest_at_or_before() {
        let mut journal = Journal::in_memory();
        journal.append_next(&trunk(), mood(0)).unwrap();
        journal.advance_turn(&trunk()).unwrap();
        journal.append_next(&trunk(), mood(1)).unwrap();

        let at = |t, k| {
            journal
                .value(&trunk(), &home(), "mood", Coord::new(t, k))
                .unwrap()
        };
        assert_eq!(at(0, 0), None);
        assert_eq!(at(0, 1), Some(Value::Int(0)));
        assert_eq!(at(1, 0), Some(Value::Int(0)));
        assert_eq!(at(1, 1), Some(Value::Int(1)));
        assert_eq!(at(7, 0), Some(Value::Int(1)));
    }

    #[test]
    fn tombstone_reads_as_absent() {
        let mut journal = Journal::in_memory();
        journal.append_next(&trunk(), mood(3)).unwrap();
        journal
            .append_next(&trunk(), NewEntry::fact(home(), "mood", None))
            .unwrap();
        let v = journal.value(&trunk(), &home(), "mood", Coord::new(0, 2)).unwrap();
        assert_eq!(v, None);
        let v = journal.value(&trunk(), &home(), "mood", Coord::new(0, 1)).unwrap();
        assert_eq!(v, Some(Value::Int(3)));
    }

    #[test]
    fn child_reads_through_parent_up_to_fork() {
        let mut journal = Journal::in_memory();
        journal.append_next(&trunk(), mood(0)).unwrap();
        journal.advance_turn(&trunk()).unwrap();
        let fork_at = journal.frontier(&trunk()).unwrap();
        let child = journal.fork(&trunk(), fork_at, None).unwrap().id;
        journal.append_next(&trunk(), mood(1)).unwrap();
        journal.append_next(&child, mood(100)).unwrap();

        let child_now = journal.value(&child, &home(), "mood", Coord::new(1, 1)).unwrap();
        let trunk_now = journal.value(&trunk(), &home(), "mood", Coord::new(1, 1)).unwrap();
        let child_at_fork = journal.value(&child, &home(), "mood", fork_at).unwrap();
        assert_eq!(child_now, Some(Value::Int(100)));
        assert_eq!(trunk_now, Some(Value::Int(1)));
        assert_eq!(child_at_fork, Some(Value::Int(0)));
    }

    #[test]
    fn child_cannot_write_at_its_fork_coordinate() {
        let mut journal = Journal::in_memory();
        journal.append_next(&trunk(), mood(0)).unwrap();
        let at = journal.frontier(&trunk()).unwrap();
        let child = journal.fork(&trunk(), at, None).unwrap().id;
        let err = journal.append(&child, at, mood(5)).unwrap_err();
        assert!(matches!(err, JournalError::NotAfterFrontier { .. }));
    }

    #[test]
    fn sibling_forks_get_distinct_names() {
        let mut journal = Journal::in_memory();
        let a = journal.fork(&trunk(), Coord::ZERO, None).unwrap().id;
        let b = journal.fork(&trunk(), Coord::ZERO, None).unwrap().id;
        assert_eq!(a.as_str(), "trunk.1");
        assert_eq!(b.as_str(), "trunk.2");
    }

    #[test]
    fn fork_conflicts() {
        let mut journal = Journal::in_memory();
        journal.append_next(&trunk(), mood(0)).unwrap();
        journal.advance_turn(&trunk()).unwrap();

        let taken = journal.fork(&trunk(), Coord::ZERO, Some(trunk())).unwrap_err();
        assert_eq!(taken.kind(), almanac_types::ErrorKind::BranchConflict);

        let future = journal.fork(&trunk(), Coord::new(5, 0), None).unwrap_err();
        assert_eq!(future.kind(), almanac_types::ErrorKind::Validation);

        let alt = journal.fork(&trunk(), Coord::new(1, 0), None).unwrap().id;
        let early = journal.fork(&alt, Coord::new(0, 1), None).unwrap_err();
        assert!(matches!(early, JournalError::BeforeParentFork { .. }));
    }

    #[test]
    fn range_spans_ancestors_in_order() {
        let mut journal = Journal::in_memory();
        journal.append_next(&trunk(), mood(0)).unwrap();
        journal.advance_turn(&trunk()).unwrap();
        journal.append_next(&trunk(), mood(1)).unwrap();
        let child = journal
            .fork(&trunk(), journal.frontier(&trunk()).unwrap(), None)
            .unwrap()
            .id;
        journal.advance_turn(&child).unwrap();
        journal.append_next(&child, mood(50)).unwrap();
        journal.end_turn(&trunk()).unwrap();
        journal.advance_turn(&trunk()).unwrap();
        journal.append_next(&trunk(), mood(2)).unwrap();

        let values: Vec<_> = journal
            .read_range(&child, &home(), "mood", 0, 5)
            .unwrap()
            .into_iter()
            .map(|e| e.value.clone())
            .collect();
        assert_eq!(
            values,
            vec![Some(Value::Int(0)), Some(Value::Int(1)), Some(Value::Int(50))]
        );

        let later: Vec<_> = journal
            .read_range(&trunk(), &home(), "mood", 1, 1)
            .unwrap()
            .into_iter()
            .map(|e| e.coord())
            .collect();
        assert_eq!(later, vec![Coord::new(0, 1), Coord::new(1, 1)]);
    }

    #[test]
    fn range_starts_with_the_value_in_effect() {
        let mut journal = Journal::in_memory();
        journal.append_next(&trunk(), mood(3)).unwrap();
        for _ in 0..5 {
            journal.advance_turn(&trunk()).unwrap();
            journal.end_turn(&trunk()).unwrap();
        }
        let span: Vec<_> = journal
            .read_range(&trunk(), &home(), "mood", 2, 4)
            .unwrap()
            .into_iter()
            .map(|e| (e.coord(), e.value.clone()))
            .collect();
        assert_eq!(span, vec![(Coord::new(0, 1), Some(Value::Int(3)))]);

        journal
            .append_next(&trunk(), NewEntry::fact(home(), "mood", None))
            .unwrap();
        journal.advance_turn(&trunk()).unwrap();
        let after_delete = journal.read_range(&trunk(), &home(), "mood", 6, 6).unwrap();
        assert!(after_delete.is_empty());
    }

    #[test]
    fn durability_failure_leaves_journal_untouched() {
        let mut journal = Journal::create(trunk(), Box::new(MemorySink::failing_after(1))).unwrap();
        journal.append_next(&trunk(), mood(0)).unwrap();
        let err = journal.append_next(&trunk(), mood(1)).unwrap_err();
        assert_eq!(err.kind(), almanac_types::ErrorKind::Durability);
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.frontier(&trunk()).unwrap(), Coord::new(0, 1));
    }

    #[test]
    fn turn_markers_track_open_turns() {
        let mut journal = Journal::in_memory();
        journal.advance_turn(&trunk()).unwrap();
        assert_eq!(journal.incomplete_turns(), vec![(trunk(), 1)]);
        journal.end_turn(&trunk()).unwrap();
        assert!(journal.incomplete_turns().is_empty());
        assert_eq!(journal.turn_end(&trunk(), 1).unwrap(), Some(1));
    }

    #[test]
    fn open_turn_blocks_the_next_one() {
        let mut journal = Journal::in_memory();
        journal.advance_turn(&trunk()).unwrap();
        let err = journal.advance_turn(&trunk()).unwrap_err();
        assert!(matches!(err, JournalError::TurnInProgress { turn: 1, .. }));
        assert_eq!(journal.frontier(&trunk()).unwrap(), Coord::turn_start(1));
        assert_eq!(journal.incomplete_turns(), vec![(trunk(), 1)]);

        journal.end_turn(&trunk()).unwrap();
        assert_eq!(journal.advance_turn(&trunk()).unwrap(), Coord::turn_start(2));
    }

    #[test]
    fn turn_end_of_child_caps_at_fork() {
        let mut journal = Journal::in_memory();
        journal.append_next(&trunk(), mood(0)).unwrap();
        journal.append_next(&trunk(), mood(1)).unwrap();
        let child = journal.fork(&trunk(), Coord::new(0, 1), None).unwrap().id;
        journal.append_next(&trunk(), mood(2)).unwrap();
        assert_eq!(journal.turn_end(&trunk(), 0).unwrap(), Some(3));
        assert_eq!(journal.turn_end(&child, 0).unwrap(), Some(1));
    }

    #[test]
    fn creation_order_follows_lineage() {
        let mut journal = Journal::in_memory();
        let exists = |name: &str| {
            NewEntry::fact(EntityId::node(name), keys::EXISTS, Some(Value::Bool(true)))
        };
        journal.append_next(&trunk(), exists("b")).unwrap();
        journal.append_next(&trunk(), exists("a")).unwrap();
        let child = journal
            .fork(&trunk(), journal.frontier(&trunk()).unwrap(), None)
            .unwrap()
            .id;
        journal.append_next(&trunk(), exists("z")).unwrap();
        journal.append_next(&child, exists("c")).unwrap();

        let names = journal
            .creations(&child, EntityKind::Node, Coord::new(0, 9))
            .unwrap();
        assert_eq!(
            names,
            vec![EntityId::node("b"), EntityId::node("a"), EntityId::node("c")]
        );
    }
}

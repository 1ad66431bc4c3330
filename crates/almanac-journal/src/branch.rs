//! Per-branch state: metadata, frontier, fact index and turn bookkeeping.

use std::collections::{BTreeMap, HashMap};

use almanac_types::{BranchId, BranchRecord, Coord, EntityId, EntityKind};

/// Everything the journal tracks for one branch.
///
/// All fields are derived from the branch's record and its own entries; a
/// branch never stores anything inherited from its parent.
#[derive(Debug)]
pub struct BranchState {
    /// The branch-metadata row.
    pub record: BranchRecord,
    /// Latest coordinate written (or the fork coordinate for a fresh branch).
    pub frontier: Coord,
    /// entity -> key -> coordinate -> position in the journal entry vector.
    pub(crate) index: HashMap<EntityId, HashMap<String, BTreeMap<Coord, usize>>>,
    /// First-existence events in append order, per graph kind.
    pub(crate) creations: BTreeMap<EntityKind, Vec<(Coord, EntityId)>>,
    /// Latest tick written in each turn.
    pub(crate) turn_ends: BTreeMap<u64, u64>,
    /// Turn whose start marker was written without a matching end marker.
    pub(crate) open_turn: Option<u64>,
    /// Number of entries written on this branch.
    pub(crate) len: usize,
}

impl BranchState {
    /// Fresh state for a branch whose history begins at its fork coordinate.
    pub fn new(record: BranchRecord) -> Self {
        let frontier = record.fork_coord();
        Self {
            record,
            frontier,
            index: HashMap::new(),
            creations: BTreeMap::new(),
            turn_ends: BTreeMap::new(),
            open_turn: None,
            len: 0,
        }
    }

    /// Branch name.
    pub const fn id(&self) -> &BranchId {
        &self.record.id
    }

    /// Parent branch, `None` for a root.
    pub const fn parent(&self) -> Option<&BranchId> {
        self.record.parent.as_ref()
    }

    /// Number of entries written on this branch itself.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether this branch has no entries of its own.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The turn left open by a crash, if any.
    pub const fn open_turn(&self) -> Option<u64> {
        self.open_turn
    }

    /// Position of the latest entry for (entity, key) at or before `cap`.
    pub(crate) fn latest(&self, entity: &EntityId, key: &str, cap: Coord) -> Option<usize> {
        self.index
            .get(entity)?
            .get(key)?
            .range(..=cap)
            .next_back()
            .map(|(_, pos)| *pos)
    }

    /// Positions of entries for (entity, key) within `[lo, hi]`.
    pub(crate) fn span(&self, entity: &EntityId, key: &str, lo: Coord, hi: Coord) -> Vec<usize> {
        if lo > hi {
            return Vec::new();
        }
        self.index
            .get(entity)
            .and_then(|keys| keys.get(key))
            .map(|history| history.range(lo..=hi).map(|(_, pos)| *pos).collect())
            .unwrap_or_default()
    }
}

/// Generated name for the `n`th child of `parent`.
pub fn child_name(parent: &BranchId, n: u64) -> BranchId {
    BranchId::new(format!("{parent}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_branch_starts_at_fork() {
        let record = BranchRecord {
            id: BranchId::new("alt"),
            parent: Some(BranchId::trunk()),
            fork_turn: 3,
            fork_tick: 2,
        };
        let state = BranchState::new(record);
        assert_eq!(state.frontier, Coord::new(3, 2));
        assert!(state.is_empty());
    }

    #[test]
    fn inverted_span_is_empty() {
        let state = BranchState::new(BranchRecord::root(BranchId::trunk()));
        let hits = state.span(
            &EntityId::node("home"),
            "mood",
            Coord::new(5, 0),
            Coord::new(1, 0),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn child_names_are_dotted() {
        assert_eq!(child_name(&BranchId::trunk(), 2).as_str(), "trunk.2");
    }
}

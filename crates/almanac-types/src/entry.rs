//! Journal entries and branch metadata: the persisted layout.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::entity::EntityId;
use crate::ids::BranchId;
use crate::time::{Coord, Coordinate};
use crate::value::Value;

/// What a [`JournalEntry`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EntryKind {
    /// An attribute value written to a graph or universal entity.
    Fact,
    /// A rulebook membership definition.
    Rulebook,
    /// A rule definition (trigger or action references).
    Rule,
    /// A trigger body definition.
    Trigger,
    /// An action body definition.
    Action,
    /// A rule fault raised during a turn.
    Fault,
    /// A turn start or end marker.
    Turn,
}

impl EntryKind {
    /// Stable lowercase name, used as the persisted `kind` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Rulebook => "rulebook",
            Self::Rule => "rule",
            Self::Trigger => "trigger",
            Self::Action => "action",
            Self::Fault => "fault",
            Self::Turn => "turn",
        }
    }

    /// Whether the entry is a rule-engine definition write.
    pub const fn is_definition(self) -> bool {
        matches!(
            self,
            Self::Rulebook | Self::Rule | Self::Trigger | Self::Action
        )
    }
}

/// One immutable record in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct JournalEntry {
    /// Global append sequence number.
    pub seq: u64,
    /// Entity the entry is about.
    #[ts(as = "String")]
    pub entity: EntityId,
    /// Attribute key.
    pub key: String,
    /// Branch the entry was written on.
    pub branch: BranchId,
    /// Turn of the write.
    pub turn: u64,
    /// Tick of the write.
    pub tick: u64,
    /// Written value; `None` is a deletion tombstone.
    pub value: Option<Value>,
    /// Fact, definition, fault or marker.
    pub kind: EntryKind,
}

impl JournalEntry {
    /// The in-branch coordinate of the entry.
    pub const fn coord(&self) -> Coord {
        Coord::new(self.turn, self.tick)
    }

    /// The fully qualified coordinate of the entry.
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.branch.clone(), self.coord())
    }
}

/// A row of the branch-metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BranchRecord {
    /// Branch name.
    pub id: BranchId,
    /// Parent branch, `None` for the root.
    pub parent: Option<BranchId>,
    /// Turn of the fork coordinate in the parent.
    pub fork_turn: u64,
    /// Tick of the fork coordinate in the parent.
    pub fork_tick: u64,
}

impl BranchRecord {
    /// A root branch record.
    pub const fn root(id: BranchId) -> Self {
        Self {
            id,
            parent: None,
            fork_turn: 0,
            fork_tick: 0,
        }
    }

    /// The fork coordinate.
    pub const fn fork_coord(&self) -> Coord {
        Coord::new(self.fork_turn, self.fork_tick)
    }
}

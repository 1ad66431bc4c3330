//! Turn results delivered to callers and subscribers.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::entity::EntityId;
use crate::entry::JournalEntry;
use crate::ids::{ActionId, BranchId, RuleId, RulebookId};
use crate::time::Coord;

/// The failure taxonomy every error in the workspace classifies into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ErrorKind {
    /// Malformed reference; nothing was mutated.
    Validation,
    /// Write did not strictly advance the frontier, or the branch is busy.
    Concurrency,
    /// Fork request incompatible with the branch tree.
    BranchConflict,
    /// A trigger or action raised during a turn.
    RuleFault,
    /// The journal failed to persist an append. Fatal.
    Durability,
}

impl ErrorKind {
    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Concurrency => "concurrency",
            Self::BranchConflict => "branch_conflict",
            Self::RuleFault => "rule_fault",
            Self::Durability => "durability",
        }
    }
}

/// Where in a rule's evaluation a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FaultPhase {
    /// Resolving the rulebook, rule, trigger or action definitions.
    Definition,
    /// Evaluating the trigger.
    Trigger,
    /// Executing an action.
    Action,
}

impl FaultPhase {
    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Trigger => "trigger",
            Self::Action => "action",
        }
    }
}

/// A non-fatal rule fault recorded during a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FaultRecord {
    /// Subject entity the rule ran against.
    #[ts(as = "String")]
    pub entity: EntityId,
    /// Rulebook being evaluated, once resolved.
    pub rulebook: Option<RulebookId>,
    /// Rule that faulted; `None` when the rulebook itself failed to resolve.
    pub rule: Option<RuleId>,
    /// Phase of the fault.
    pub phase: FaultPhase,
    /// Action that faulted, for action faults.
    pub action: Option<ActionId>,
    /// Human-readable cause.
    pub message: String,
    /// Coordinate of the fault journal entry.
    pub coord: Coord,
}

/// Summary of one turn's rule pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TurnReport {
    /// Branch the turn ran on.
    pub branch: BranchId,
    /// The new turn's start coordinate.
    pub start: Coord,
    /// Frontier after the pass.
    pub end: Coord,
    /// Every fact written by the pass, in journal order.
    pub facts_written: Vec<JournalEntry>,
    /// Faults raised by the pass.
    pub faults: Vec<FaultRecord>,
    /// Rules whose trigger was evaluated.
    pub rules_evaluated: u64,
    /// Rules whose trigger returned true.
    pub rules_fired: u64,
}

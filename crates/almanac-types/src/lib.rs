//! Shared type definitions for the Almanac temporal world engine.
//!
//! This crate is the single source of truth for the types that cross crate
//! and process boundaries: coordinates, entity identifiers, attribute values,
//! journal entries, rule definitions and turn reports. Boundary types flow
//! to `TypeScript` via `ts-rs` for the frontend.
//!
//! # Modules
//!
//! - [`ids`] -- Branch, definition and session identifiers
//! - [`time`] -- (turn, tick) coordinates
//! - [`value`] -- Dynamically typed attribute values
//! - [`entity`] -- Entity identifiers and reserved structural keys
//! - [`entry`] -- Journal entries and branch metadata
//! - [`rules`] -- Trigger expressions and action steps
//! - [`report`] -- Turn reports, fault records and the error taxonomy

pub mod entity;
pub mod entry;
pub mod ids;
pub mod report;
pub mod rules;
pub mod time;
pub mod value;

// Re-export all public types at crate root for convenience.
pub use entity::{EntityId, EntityKind, ParseEntityError, keys};
pub use entry::{BranchRecord, EntryKind, JournalEntry};
pub use ids::{ActionId, BranchId, RuleId, RulebookId, SessionId, TriggerId};
pub use report::{ErrorKind, FaultPhase, FaultRecord, TurnReport};
pub use rules::{ActionStep, DefinitionError, Expr, RuleEdit};
pub use time::{Coord, Coordinate};
pub use value::Value;

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the boundary types.

    #[test]
    fn export_bindings() {
        // Files are written to `bindings/` relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::SessionId::export_all();
        let _ = crate::ids::BranchId::export_all();
        let _ = crate::ids::RuleId::export_all();
        let _ = crate::ids::RulebookId::export_all();
        let _ = crate::ids::TriggerId::export_all();
        let _ = crate::ids::ActionId::export_all();
        let _ = crate::time::Coord::export_all();
        let _ = crate::time::Coordinate::export_all();
        let _ = crate::value::Value::export_all();
        let _ = crate::entity::EntityKind::export_all();
        let _ = crate::entry::EntryKind::export_all();
        let _ = crate::entry::JournalEntry::export_all();
        let _ = crate::entry::BranchRecord::export_all();
        let _ = crate::rules::Expr::export_all();
        let _ = crate::rules::ActionStep::export_all();
        let _ = crate::rules::RuleEdit::export_all();
        let _ = crate::report::ErrorKind::export_all();
        let _ = crate::report::FaultPhase::export_all();
        let _ = crate::report::FaultRecord::export_all();
        let _ = crate::report::TurnReport::export_all();
    }
}

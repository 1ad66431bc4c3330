//! Time coordinates.
//!
//! A [`Coord`] orders history within one branch: lexicographically by turn,
//! then tick. A [`Coordinate`] adds the branch and is what the boundary
//! speaks.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::BranchId;

/// A (turn, tick) position inside one branch.
///
/// Tick 0 of a turn is the turn-start position: facts written during the
/// turn land at tick 1 and later, so reading at `(turn, 0)` yields the state
/// the turn's rule pass starts from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct Coord {
    /// Turn number.
    pub turn: u64,
    /// Tick within the turn.
    pub tick: u64,
}

impl Coord {
    /// The very first coordinate of a root branch.
    pub const ZERO: Self = Self { turn: 0, tick: 0 };

    /// Build a coordinate.
    pub const fn new(turn: u64, tick: u64) -> Self {
        Self { turn, tick }
    }

    /// The start position of `turn`.
    pub const fn turn_start(turn: u64) -> Self {
        Self { turn, tick: 0 }
    }

    /// The largest coordinate inside `turn`.
    pub const fn turn_end(turn: u64) -> Self {
        Self {
            turn,
            tick: u64::MAX,
        }
    }

    /// The next tick in the same turn, or `None` on overflow.
    pub fn next_tick(self) -> Option<Self> {
        Some(Self {
            turn: self.turn,
            tick: self.tick.checked_add(1)?,
        })
    }

    /// The start of the following turn, or `None` on overflow.
    pub fn next_turn(self) -> Option<Self> {
        Some(Self::turn_start(self.turn.checked_add(1)?))
    }
}

impl core::fmt::Display for Coord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.turn, self.tick)
    }
}

/// A fully qualified point in history: (branch, turn, tick).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coordinate {
    /// Branch the coordinate belongs to.
    pub branch: BranchId,
    /// Turn number.
    pub turn: u64,
    /// Tick within the turn.
    pub tick: u64,
}

impl Coordinate {
    /// Qualify a [`Coord`] with its branch.
    pub const fn new(branch: BranchId, coord: Coord) -> Self {
        Self {
            branch,
            turn: coord.turn,
            tick: coord.tick,
        }
    }

    /// The in-branch part of the coordinate.
    pub const fn coord(&self) -> Coord {
        Coord::new(self.turn, self.tick)
    }
}

impl core::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}.{}", self.branch, self.turn, self.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_turn_then_tick() {
        assert!(Coord::new(1, 9) < Coord::new(2, 0));
        assert!(Coord::new(2, 0) < Coord::new(2, 1));
        assert!(Coord::turn_end(2) < Coord::turn_start(3));
    }

    #[test]
    fn next_turn_resets_tick() {
        assert_eq!(Coord::new(4, 7).next_turn(), Some(Coord::new(5, 0)));
        assert_eq!(Coord::new(0, u64::MAX).next_tick(), None);
    }
}

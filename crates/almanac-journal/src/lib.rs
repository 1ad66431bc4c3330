//! Append-only journal and branch fork tree for the Almanac engine.
//!
//! The journal is the only authoritative record of world history. Every fact
//! write, definition write, rule fault and turn marker is a
//! [`JournalEntry`] stamped with a (branch, turn, tick) coordinate. Entries
//! are never modified or removed; an amendment is a new entry at a later
//! coordinate.
//!
//! # Architecture
//!
//! - [`journal`] -- The [`Journal`]: entries, per-branch indexes, reads.
//! - [`branch`] -- Per-branch state and fork naming.
//! - [`sink`] -- The [`JournalSink`] durability seam and its implementations.
//! - [`replay`] -- Rebuilding a journal from a sink and replay fingerprints.
//!
//! # Append discipline
//!
//! For every branch B, each appended coordinate is strictly greater than B's
//! frontier, and strictly greater than B's fork coordinate. Reads below the
//! frontier are therefore stable forever. A branch's history up to its fork
//! coordinate is read through its parent.
//!
//! # Durability
//!
//! `append` writes to the sink before touching the in-memory index. A sink
//! failure leaves the journal exactly at the last durably appended
//! coordinate and surfaces as [`JournalError::Durability`].

pub mod branch;
pub mod journal;
pub mod replay;
pub mod sink;

pub use branch::BranchState;
pub use journal::{Journal, NewEntry};
pub use replay::digest;
pub use sink::{FileSink, JournalSink, MemorySink, Persisted, SinkError};

use almanac_types::{BranchId, Coord, ErrorKind};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the journal and the branch fork tree.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The branch named by a read or fork does not exist.
    #[error("unknown branch: {branch}")]
    UnknownBranch {
        /// The missing branch.
        branch: BranchId,
    },

    /// An append targeted a branch that does not exist.
    #[error("cannot append to missing branch {branch}")]
    AppendToMissingBranch {
        /// The missing branch.
        branch: BranchId,
    },

    /// An append did not strictly advance the branch frontier.
    #[error("coordinate {coord} on {branch} does not advance frontier {frontier}")]
    NotAfterFrontier {
        /// Target branch.
        branch: BranchId,
        /// Rejected coordinate.
        coord: Coord,
        /// Current frontier.
        frontier: Coord,
    },

    /// A fork or read named a coordinate the branch has not reached.
    #[error("coordinate {coord} is beyond the frontier {frontier} of {branch}")]
    BeyondFrontier {
        /// Branch queried.
        branch: BranchId,
        /// Requested coordinate.
        coord: Coord,
        /// Current frontier.
        frontier: Coord,
    },

    /// A fork requested a name that is already taken.
    #[error("branch {branch} already exists")]
    BranchExists {
        /// The taken name.
        branch: BranchId,
    },

    /// A fork requested a coordinate that predates the parent's own fork.
    #[error("cannot fork {parent} at {coord}: it was forked at {fork}")]
    BeforeParentFork {
        /// Parent branch.
        parent: BranchId,
        /// Requested coordinate.
        coord: Coord,
        /// The parent's own fork coordinate.
        fork: Coord,
    },

    /// A new turn was requested while the previous one never finished.
    #[error("turn {turn} on {branch} never finished; restart it instead of advancing")]
    TurnInProgress {
        /// Branch holding the open turn.
        branch: BranchId,
        /// The unfinished turn.
        turn: u64,
    },

    /// The turn or tick counter would overflow.
    #[error("coordinate overflow on {branch} after {coord}")]
    Overflow {
        /// Branch whose clock overflowed.
        branch: BranchId,
        /// Last valid coordinate.
        coord: Coord,
    },

    /// Persisted history violates the append discipline.
    #[error("corrupt journal at seq {seq}: {reason}")]
    Corrupt {
        /// Sequence number of the offending entry.
        seq: u64,
        /// What was wrong.
        reason: String,
    },

    /// The sink failed to persist an append.
    #[error("durability failure: {source}")]
    Durability {
        /// Underlying sink error.
        #[from]
        source: SinkError,
    },
}

impl JournalError {
    /// Classify this error into the workspace taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownBranch { .. }
            | Self::BeyondFrontier { .. }
            | Self::TurnInProgress { .. }
            | Self::Overflow { .. } => ErrorKind::Validation,
            Self::AppendToMissingBranch { .. } | Self::NotAfterFrontier { .. } => {
                ErrorKind::Concurrency
            }
            Self::BranchExists { .. } | Self::BeforeParentFork { .. } => {
                ErrorKind::BranchConflict
            }
            Self::Corrupt { .. } | Self::Durability { .. } => ErrorKind::Durability,
        }
    }
}

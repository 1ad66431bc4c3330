//! Error types for the `almanac-core` crate.

use almanac_graph::GraphError;
use almanac_types::{BranchId, DefinitionError, ErrorKind, RuleId, SessionId};

/// Errors returned by [`Engine`](crate::engine::Engine) operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The graph store or journal rejected the operation.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A definition could not be converted to its journaled form.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Another mutation holds the branch.
    #[error("branch {branch} is busy")]
    BranchBusy {
        /// The contended branch.
        branch: BranchId,
    },

    /// A durability failure halted the engine; restart from the journal.
    #[error("engine halted after a durability failure")]
    Halted,

    /// The session handle is not open.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// `restart_turn` was called on a branch without an incomplete turn.
    #[error("branch {branch} has no incomplete turn")]
    NoIncompleteTurn {
        /// The branch.
        branch: BranchId,
    },

    /// A new rule was defined without a trigger.
    #[error("rule {rule} needs a trigger")]
    IncompleteRule {
        /// The rule.
        rule: RuleId,
    },

    /// A read or fork named a coordinate the branch has not reached.
    #[error("turn {turn} is beyond the frontier of {branch}")]
    UnknownCoordinate {
        /// Branch queried.
        branch: BranchId,
        /// Requested turn.
        turn: u64,
    },
}

impl EngineError {
    /// Classify this error into the workspace taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Graph(e) => e.kind(),
            Self::BranchBusy { .. } => ErrorKind::Concurrency,
            Self::Halted => ErrorKind::Durability,
            Self::Definition(_)
            | Self::UnknownSession(_)
            | Self::NoIncompleteTurn { .. }
            | Self::IncompleteRule { .. }
            | Self::UnknownCoordinate { .. } => ErrorKind::Validation,
        }
    }

    /// Whether the error names something that does not exist.
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::Graph(e) => e.is_not_found(),
            Self::UnknownSession(_) => true,
            _ => false,
        }
    }
}

//! Error types for the `almanac-graph` crate.
//!
//! All fallible operations in this crate return [`GraphError`]. Everything
//! except a wrapped journal error is a validation failure raised before any
//! entry is appended.

use almanac_journal::JournalError;
use almanac_types::{EntityId, EntityKind, ErrorKind};

/// Errors that can occur during graph-store operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The underlying journal rejected the operation.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// The entity does not exist at the coordinate used.
    #[error("entity not found: {0}")]
    UnknownEntity(EntityId),

    /// The entity already exists.
    #[error("entity already exists: {0}")]
    EntityExists(EntityId),

    /// Only characters, nodes and edges can be created or deleted.
    #[error("{0:?} entities cannot be created or deleted")]
    NotGraphKind(EntityKind),

    /// A structural fact required for this kind was not supplied.
    #[error("{entity} requires {key}")]
    MissingStructure {
        /// Entity being created.
        entity: EntityId,
        /// The missing key.
        key: &'static str,
    },

    /// A structural fact has the wrong type.
    #[error("{key} must be a {expected}")]
    BadStructure {
        /// Offending key.
        key: String,
        /// Expected value type.
        expected: &'static str,
    },

    /// The key is reserved and cannot be written this way.
    #[error("key {key} is reserved on {entity}")]
    ReservedKey {
        /// Target entity.
        entity: EntityId,
        /// Offending key.
        key: String,
    },

    /// A node's owner does not exist.
    #[error("node {node} names missing owner character {character}")]
    MissingOwner {
        /// The node.
        node: String,
        /// The character named as owner.
        character: String,
    },

    /// An edge endpoint does not reference an existing node.
    #[error("edge {edge} endpoint {node} does not exist")]
    DanglingEndpoint {
        /// The edge.
        edge: String,
        /// The missing node.
        node: String,
    },

    /// A thing's location does not reference an existing node.
    #[error("thing {thing} location {node} does not exist")]
    DanglingLocation {
        /// The thing.
        thing: String,
        /// The missing node.
        node: String,
    },

    /// A thing's location belongs to a different character.
    #[error("thing {thing} location {node} is not owned by {character}")]
    ForeignLocation {
        /// The thing.
        thing: String,
        /// The location node.
        node: String,
        /// The thing's owner.
        character: String,
    },

    /// A thing would end up inside itself.
    #[error("thing {thing} cannot be located in {node}: {node} is inside it")]
    LocationCycle {
        /// The thing.
        thing: String,
        /// The requested location.
        node: String,
    },

    /// An edge endpoint belongs to a different character.
    #[error("edge {edge} endpoint {node} is not owned by {character}")]
    ForeignEndpoint {
        /// The edge.
        edge: String,
        /// The endpoint node.
        node: String,
        /// The edge's character.
        character: String,
    },
}

impl GraphError {
    /// Classify this error into the workspace taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Journal(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }

    /// Whether the error names something that does not exist.
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownEntity(_) | Self::Journal(JournalError::UnknownBranch { .. })
        )
    }
}

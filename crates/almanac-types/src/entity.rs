//! Entity identifiers and reserved structural keys.
//!
//! Everything that can carry facts is an [`EntityId`]: the graph entities
//! (characters, nodes, edges), the rule definitions, and the single
//! [`EntityId::Universal`] holder of world-global facts. The text form
//! (`node:home`, `rule:grow`, `universal`) is what the boundary and the
//! persisted journal use.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;

use crate::ids::{ActionId, RuleId, RulebookId, TriggerId};

// ---------------------------------------------------------------------------
// Structural keys
// ---------------------------------------------------------------------------

/// Reserved attribute keys with structural meaning.
pub mod keys {
    /// Existence flag of a character, node or edge (bool).
    pub const EXISTS: &str = "_exists";
    /// Owning character of a node (str).
    pub const OWNER: &str = "_owner";
    /// Character an edge belongs to (str).
    pub const CHARACTER: &str = "_character";
    /// Origin node of an edge (str).
    pub const ORIG: &str = "_orig";
    /// Destination node of an edge (str).
    pub const DEST: &str = "_dest";
    /// Node holding a thing (str). A node without it is a place.
    pub const LOCATION: &str = "_location";
    /// Rulebook attached to an entity (str).
    pub const RULEBOOK: &str = "_rulebook";
    /// Fault records written by the rule engine.
    pub const FAULT: &str = "_fault";
    /// Turn start/end markers on the universal entity.
    pub const TURN: &str = "_turn";
    /// Universal random seed (int).
    pub const SEED: &str = "seed";
    /// Rulebook membership of a rulebook definition.
    pub const RULES: &str = "rules";
    /// Trigger reference of a rule definition.
    pub const TRIGGER: &str = "trigger";
    /// Action references of a rule definition.
    pub const ACTIONS: &str = "actions";
    /// Expression body of a trigger definition.
    pub const EXPR: &str = "expr";
    /// Step list of an action definition.
    pub const STEPS: &str = "steps";

    /// Prefix of a rulebook's per-rule activity flags (bool).
    pub const ACTIVE_PREFIX: &str = "active.";

    /// Whether `key` is reserved for structure and validated on write.
    pub fn is_structural(key: &str) -> bool {
        key.starts_with('_')
    }

    /// Rulebook key holding whether `rule` runs in that rulebook.
    pub fn active(rule: &str) -> String {
        format!("{ACTIVE_PREFIX}{rule}")
    }
}

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// The kind of an [`EntityId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EntityKind {
    /// A named graph.
    Character,
    /// A place or thing owned by a character; a thing has a `_location`.
    Node,
    /// A directed portal between two nodes of one character.
    Edge,
    /// A rule definition.
    Rule,
    /// A rulebook definition.
    Rulebook,
    /// A trigger definition.
    Trigger,
    /// An action definition.
    Action,
    /// The world-global fact holder.
    Universal,
}

impl EntityKind {
    /// Graph kinds in rule-evaluation order.
    pub const GRAPH_ORDER: [Self; 3] = [Self::Character, Self::Node, Self::Edge];

    /// Text prefix used in the entity text form.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Node => "node",
            Self::Edge => "edge",
            Self::Rule => "rule",
            Self::Rulebook => "rulebook",
            Self::Trigger => "trigger",
            Self::Action => "action",
            Self::Universal => "universal",
        }
    }

    /// Whether entities of this kind live in the world graph.
    pub const fn is_graph(self) -> bool {
        matches!(self, Self::Character | Self::Node | Self::Edge)
    }

    /// Universal key naming the default rulebook for this kind, if any.
    pub const fn default_rulebook_key(self) -> Option<&'static str> {
        match self {
            Self::Character => Some("_rulebook.character"),
            Self::Node => Some("_rulebook.node"),
            Self::Edge => Some("_rulebook.edge"),
            _ => None,
        }
    }
}

impl FromStr for EntityKind {
    type Err = ParseEntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "character" => Self::Character,
            "node" => Self::Node,
            "edge" => Self::Edge,
            "rule" => Self::Rule,
            "rulebook" => Self::Rulebook,
            "trigger" => Self::Trigger,
            "action" => Self::Action,
            "universal" => Self::Universal,
            other => {
                return Err(ParseEntityError::UnknownKind {
                    kind: other.to_owned(),
                });
            }
        })
    }
}

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Error parsing an entity from its text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseEntityError {
    /// The prefix before `:` is not a known kind.
    #[error("unknown entity kind: {kind}")]
    UnknownKind {
        /// The offending prefix.
        kind: String,
    },
    /// The name after `:` is missing or empty.
    #[error("entity name missing in {text:?}")]
    MissingName {
        /// The full text that failed to parse.
        text: String,
    },
}

/// Identifier of anything that carries facts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityId {
    /// A character (named graph).
    Character(String),
    /// A node (place or thing).
    Node(String),
    /// An edge (portal).
    Edge(String),
    /// A rule definition.
    Rule(RuleId),
    /// A rulebook definition.
    Rulebook(RulebookId),
    /// A trigger definition.
    Trigger(TriggerId),
    /// An action definition.
    Action(ActionId),
    /// The world-global fact holder.
    Universal,
}

impl EntityId {
    /// Build a graph or definition entity from a kind and a name.
    ///
    /// The name is ignored for [`EntityKind::Universal`].
    pub fn from_parts(kind: EntityKind, name: impl Into<String>) -> Self {
        let name = name.into();
        match kind {
            EntityKind::Character => Self::Character(name),
            EntityKind::Node => Self::Node(name),
            EntityKind::Edge => Self::Edge(name),
            EntityKind::Rule => Self::Rule(RuleId(name)),
            EntityKind::Rulebook => Self::Rulebook(RulebookId(name)),
            EntityKind::Trigger => Self::Trigger(TriggerId(name)),
            EntityKind::Action => Self::Action(ActionId(name)),
            EntityKind::Universal => Self::Universal,
        }
    }

    /// Shorthand for a character.
    pub fn character(name: impl Into<String>) -> Self {
        Self::Character(name.into())
    }

    /// Shorthand for a node.
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    /// Shorthand for an edge.
    pub fn edge(name: impl Into<String>) -> Self {
        Self::Edge(name.into())
    }

    /// The kind of this entity.
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Character(_) => EntityKind::Character,
            Self::Node(_) => EntityKind::Node,
            Self::Edge(_) => EntityKind::Edge,
            Self::Rule(_) => EntityKind::Rule,
            Self::Rulebook(_) => EntityKind::Rulebook,
            Self::Trigger(_) => EntityKind::Trigger,
            Self::Action(_) => EntityKind::Action,
            Self::Universal => EntityKind::Universal,
        }
    }

    /// The name part, or `None` for [`EntityId::Universal`].
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Character(n) | Self::Node(n) | Self::Edge(n) => Some(n),
            Self::Rule(id) => Some(id.as_str()),
            Self::Rulebook(id) => Some(id.as_str()),
            Self::Trigger(id) => Some(id.as_str()),
            Self::Action(id) => Some(id.as_str()),
            Self::Universal => None,
        }
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}:{name}", self.kind().prefix()),
            None => f.write_str(self.kind().prefix()),
        }
    }
}

impl FromStr for EntityId {
    type Err = ParseEntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == EntityKind::Universal.prefix() {
            return Ok(Self::Universal);
        }
        let (prefix, name) = s.split_once(':').ok_or_else(|| ParseEntityError::MissingName {
            text: s.to_owned(),
        })?;
        let kind: EntityKind = prefix.parse()?;
        if name.is_empty() || kind == EntityKind::Universal {
            return Err(ParseEntityError::MissingName { text: s.to_owned() });
        }
        Ok(Self::from_parts(kind, name))
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn text_form_round_trips() {
        for text in ["character:alice", "node:home", "rule:grow", "universal"] {
            let id: EntityId = text.parse().unwrap();
            assert_eq!(id.to_string(), text);
        }
    }

    #[test]
    fn names_may_contain_colons() {
        let id: EntityId = "node:alice:home".parse().unwrap();
        assert_eq!(id, EntityId::node("alice:home"));
    }

    #[test]
    fn rejects_bad_text() {
        assert!("planet:x".parse::<EntityId>().is_err());
        assert!("node:".parse::<EntityId>().is_err());
        assert!("node".parse::<EntityId>().is_err());
        assert!("universal:x".parse::<EntityId>().is_err());
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&EntityId::edge("door")).unwrap();
        assert_eq!(json, "\"edge:door\"");
    }
}

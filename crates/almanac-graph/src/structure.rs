//! Structural facts: entity lifecycle, ownership and edge endpoints.
//!
//! Characters are named graphs. A node is owned by exactly one character at
//! a time (`_owner`). A node with a `_location` is a thing sitting in another
//! node of the same character; without one it is a place. An edge belongs to
//! one character (`_character`) and connects two of that character's nodes
//! (`_orig` -> `_dest`). All of these are ordinary versioned facts; this
//! module validates them before they are appended and derives the live
//! entity listings from them.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use almanac_journal::NewEntry;
use almanac_types::{BranchId, Coord, EntityId, EntityKind, JournalEntry, Value, keys};

use crate::error::GraphError;
use crate::store::GraphStore;

/// Structural keys required at creation, per kind, in write order.
const fn required_keys(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Node => &[keys::OWNER],
        EntityKind::Edge => &[keys::CHARACTER, keys::ORIG, keys::DEST],
        _ => &[],
    }
}

/// Structural keys a kind may carry besides `_exists`.
fn allowed_structural(kind: EntityKind, key: &str) -> bool {
    key == keys::RULEBOOK
        || (kind == EntityKind::Node && key == keys::LOCATION)
        || required_keys(kind).contains(&key)
}

fn str_of(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

fn expect_str<'v>(key: &str, value: Option<&'v Value>) -> Result<&'v str, GraphError> {
    value.and_then(Value::as_str).ok_or_else(|| GraphError::BadStructure {
        key: key.to_owned(),
        expected: "str",
    })
}

impl GraphStore {
    // ----- Listings -----

    /// Live entities of `kind` on `branch` at `at`, in creation order.
    pub fn entities(
        &self,
        branch: &BranchId,
        kind: EntityKind,
        at: Coord,
    ) -> Result<Vec<EntityId>, GraphError> {
        let mut live = Vec::new();
        for entity in self.journal().creations(branch, kind, at)? {
            if self.exists(branch, &entity, at)? {
                live.push(entity);
            }
        }
        Ok(live)
    }

    /// Live nodes owned by `character` at `at`, in creation order.
    pub fn nodes_of(
        &self,
        branch: &BranchId,
        character: &str,
        at: Coord,
    ) -> Result<Vec<EntityId>, GraphError> {
        let mut owned = Vec::new();
        for node in self.entities(branch, EntityKind::Node, at)? {
            let owner = self.get(branch, &node, keys::OWNER, at)?;
            if owner.as_ref().and_then(Value::as_str) == Some(character) {
                owned.push(node);
            }
        }
        Ok(owned)
    }

    /// Live things located directly in `node` at `at`, in creation order.
    pub fn contents(
        &self,
        branch: &BranchId,
        node: &str,
        at: Coord,
    ) -> Result<Vec<EntityId>, GraphError> {
        let mut inside = Vec::new();
        for candidate in self.entities(branch, EntityKind::Node, at)? {
            let location = self.get(branch, &candidate, keys::LOCATION, at)?;
            if str_of(location.as_ref()) == Some(node) {
                inside.push(candidate);
            }
        }
        Ok(inside)
    }

    /// Live edges touching `node` (as origin or destination) at `at`.
    pub fn edges_touching(
        &self,
        branch: &BranchId,
        node: &str,
        at: Coord,
    ) -> Result<Vec<EntityId>, GraphError> {
        let mut touching = Vec::new();
        for edge in self.entities(branch, EntityKind::Edge, at)? {
            let orig = self.get(branch, &edge, keys::ORIG, at)?;
            let dest = self.get(branch, &edge, keys::DEST, at)?;
            let hit = |v: &Option<Value>| v.as_ref().and_then(Value::as_str) == Some(node);
            if hit(&orig) || hit(&dest) {
                touching.push(edge);
            }
        }
        Ok(touching)
    }

    // ----- Validation -----

    /// Check a structural write of `key = value` on a graph entity.
    ///
    /// Non-structural keys always pass.
    pub(crate) fn validate_structural(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        value: Option<&Value>,
        at: Coord,
    ) -> Result<(), GraphError> {
        if !keys::is_structural(key) {
            return Ok(());
        }
        let kind = entity.kind();
        if !allowed_structural(kind, key) {
            return Err(GraphError::ReservedKey {
                entity: entity.clone(),
                key: key.to_owned(),
            });
        }
        if key == keys::RULEBOOK {
            // Detaching is allowed; attaching needs a rulebook name.
            return match value {
                None => Ok(()),
                Some(_) => expect_str(key, value).map(|_| ()),
            };
        }
        let name = entity.name().unwrap_or_default();
        if key == keys::LOCATION {
            // Without a location the thing becomes a place.
            let Some(value) = value else {
                return Ok(());
            };
            let location = expect_str(key, Some(value))?;
            let owner = self.get(branch, entity, keys::OWNER, at)?;
            let owner = str_of(owner.as_ref()).unwrap_or_default();
            return self.check_location(branch, name, owner, location, at);
        }
        let target = expect_str(key, value)?;
        match key {
            keys::OWNER => {
                let owner = EntityId::character(target);
                if !self.exists(branch, &owner, at)? {
                    return Err(GraphError::MissingOwner {
                        node: name.to_owned(),
                        character: target.to_owned(),
                    });
                }
                Ok(())
            }
            keys::CHARACTER => {
                if !self.exists(branch, &EntityId::character(target), at)? {
                    return Err(GraphError::UnknownEntity(EntityId::character(target)));
                }
                Ok(())
            }
            _ => {
                // _orig / _dest: check against the edge's character as of `at`.
                let character = self.get(branch, entity, keys::CHARACTER, at)?;
                let character = character
                    .as_ref()
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                self.check_endpoint(branch, name, character, target, at)
            }
        }
    }

    fn check_endpoint(
        &self,
        branch: &BranchId,
        edge: &str,
        character: &str,
        node: &str,
        at: Coord,
    ) -> Result<(), GraphError> {
        let node_id = EntityId::node(node);
        if !self.exists(branch, &node_id, at)? {
            return Err(GraphError::DanglingEndpoint {
                edge: edge.to_owned(),
                node: node.to_owned(),
            });
        }
        let owner = self.get(branch, &node_id, keys::OWNER, at)?;
        if owner.as_ref().and_then(Value::as_str) != Some(character) {
            return Err(GraphError::ForeignEndpoint {
                edge: edge.to_owned(),
                node: node.to_owned(),
                character: character.to_owned(),
            });
        }
        Ok(())
    }

    /// A thing named `thing`, owned by `owner`, may sit in `location` when
    /// that node exists, shares the owner and is not inside the thing.
    fn check_location(
        &self,
        branch: &BranchId,
        thing: &str,
        owner: &str,
        location: &str,
        at: Coord,
    ) -> Result<(), GraphError> {
        let cycle = || GraphError::LocationCycle {
            thing: thing.to_owned(),
            node: location.to_owned(),
        };
        if location == thing {
            return Err(cycle());
        }
        let node_id = EntityId::node(location);
        if !self.exists(branch, &node_id, at)? {
            return Err(GraphError::DanglingLocation {
                thing: thing.to_owned(),
                node: location.to_owned(),
            });
        }
        let location_owner = self.get(branch, &node_id, keys::OWNER, at)?;
        if str_of(location_owner.as_ref()) != Some(owner) {
            return Err(GraphError::ForeignLocation {
                thing: thing.to_owned(),
                node: location.to_owned(),
                character: owner.to_owned(),
            });
        }
        // walk outward from the new location; meeting the thing means a cycle
        let mut seen = HashSet::new();
        let mut current = node_id;
        while seen.insert(current.clone()) {
            let Some(outer) = self.get(branch, &current, keys::LOCATION, at)? else {
                return Ok(());
            };
            let Some(outer) = outer.as_str() else {
                return Ok(());
            };
            if outer == thing {
                return Err(cycle());
            }
            current = EntityId::node(outer);
        }
        Ok(())
    }

    /// Things inside `node` (recursively, innermost first) and the edges
    /// touching any of them or `node`, each listed once.
    fn node_dependents(
        &self,
        branch: &BranchId,
        node: &str,
        at: Coord,
        doomed: &mut Vec<EntityId>,
    ) -> Result<(), GraphError> {
        for thing in self.contents(branch, node, at)? {
            if doomed.contains(&thing) {
                continue;
            }
            if let EntityId::Node(inner) = &thing {
                self.node_dependents(branch, inner, at, doomed)?;
            }
            doomed.push(thing);
        }
        for edge in self.edges_touching(branch, node, at)? {
            if !doomed.contains(&edge) {
                doomed.push(edge);
            }
        }
        Ok(())
    }

    /// Validate a full creation request without writing anything.
    fn validate_creation(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        facts: &BTreeMap<String, Value>,
        at: Coord,
    ) -> Result<(), GraphError> {
        let kind = entity.kind();
        if !kind.is_graph() {
            return Err(GraphError::NotGraphKind(kind));
        }
        if self.exists(branch, entity, at)? {
            return Err(GraphError::EntityExists(entity.clone()));
        }
        for key in required_keys(kind) {
            if !facts.contains_key(*key) {
                return Err(GraphError::MissingStructure {
                    entity: entity.clone(),
                    key,
                });
            }
        }
        for key in facts.keys() {
            if key == keys::EXISTS {
                return Err(GraphError::ReservedKey {
                    entity: entity.clone(),
                    key: key.clone(),
                });
            }
            if !keys::is_structural(key) {
                continue;
            }
            if !allowed_structural(kind, key) {
                return Err(GraphError::ReservedKey {
                    entity: entity.clone(),
                    key: key.clone(),
                });
            }
        }
        let name = entity.name().unwrap_or_default();
        match kind {
            EntityKind::Node => {
                let owner = expect_str(keys::OWNER, facts.get(keys::OWNER))?;
                if !self.exists(branch, &EntityId::character(owner), at)? {
                    return Err(GraphError::MissingOwner {
                        node: name.to_owned(),
                        character: owner.to_owned(),
                    });
                }
                if let Some(location) = facts.get(keys::LOCATION) {
                    let location = expect_str(keys::LOCATION, Some(location))?;
                    self.check_location(branch, name, owner, location, at)?;
                }
            }
            EntityKind::Edge => {
                let character = expect_str(keys::CHARACTER, facts.get(keys::CHARACTER))?;
                if !self.exists(branch, &EntityId::character(character), at)? {
                    return Err(GraphError::UnknownEntity(EntityId::character(character)));
                }
                for key in [keys::ORIG, keys::DEST] {
                    let node = expect_str(key, facts.get(key))?;
                    self.check_endpoint(branch, name, character, node, at)?;
                }
            }
            _ => {}
        }
        if let Some(rulebook) = facts.get(keys::RULEBOOK) {
            expect_str(keys::RULEBOOK, Some(rulebook))?;
        }
        Ok(())
    }

    // ----- Lifecycle -----

    /// Create a graph entity with its initial facts.
    ///
    /// Writes `_exists = true`, then the kind's structural facts, then every
    /// other fact in key order, each at its own tick. The whole request is
    /// validated before the first write.
    pub fn create_entity(
        &mut self,
        branch: &BranchId,
        entity: &EntityId,
        facts: BTreeMap<String, Value>,
    ) -> Result<Vec<JournalEntry>, GraphError> {
        let at = self.frontier(branch)?;
        self.validate_creation(branch, entity, &facts, at)?;

        let mut facts = facts;
        let mut ordered = Vec::with_capacity(facts.len().saturating_add(1));
        ordered.push((keys::EXISTS.to_owned(), Value::Bool(true)));
        for key in required_keys(entity.kind()) {
            if let Some(value) = facts.remove(*key) {
                ordered.push(((*key).to_owned(), value));
            }
        }
        ordered.extend(facts);

        let mut written = Vec::with_capacity(ordered.len());
        for (key, value) in ordered {
            written.push(self.append(branch, NewEntry::fact(entity.clone(), key, Some(value)))?);
        }
        debug!(branch = %branch, entity = %entity, facts = written.len(), "entity created");
        Ok(written)
    }

    /// Delete a graph entity by journaling `_exists = false`.
    ///
    /// Deleting a character also deletes its nodes and edges; deleting a node
    /// also deletes the things inside it and the edges touching any of them.
    /// Dependents are deleted first, in creation order.
    pub fn delete_entity(
        &mut self,
        branch: &BranchId,
        entity: &EntityId,
    ) -> Result<Vec<JournalEntry>, GraphError> {
        let kind = entity.kind();
        if !kind.is_graph() {
            return Err(GraphError::NotGraphKind(kind));
        }
        let at = self.frontier(branch)?;
        if !self.exists(branch, entity, at)? {
            return Err(GraphError::UnknownEntity(entity.clone()));
        }

        let mut doomed: Vec<EntityId> = Vec::new();
        match entity {
            EntityId::Character(name) => {
                for edge in self.entities(branch, EntityKind::Edge, at)? {
                    let owner = self.get(branch, &edge, keys::CHARACTER, at)?;
                    if owner.as_ref().and_then(Value::as_str) == Some(name.as_str()) {
                        doomed.push(edge);
                    }
                }
                doomed.extend(self.nodes_of(branch, name, at)?);
            }
            EntityId::Node(name) => self.node_dependents(branch, name, at, &mut doomed)?,
            _ => {}
        }
        doomed.push(entity.clone());

        let mut written = Vec::with_capacity(doomed.len());
        for target in doomed {
            written.push(self.append(
                branch,
                NewEntry::fact(target, keys::EXISTS, Some(Value::Bool(false))),
            )?);
        }
        debug!(branch = %branch, entity = %entity, deleted = written.len(), "entity deleted");
        Ok(written)
    }
}

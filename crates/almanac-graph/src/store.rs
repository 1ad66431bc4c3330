//! The graph store: typed, cached access to the journal.
//!
//! [`GraphStore`] is the only writer to the [`Journal`]. Every append goes
//! through [`GraphStore::append`], which invalidates the branch cache for the
//! written (entity, key) from the written coordinate on. Reads go through the
//! per-branch [`FactCache`] and fall back to the journal on a miss.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use almanac_journal::{Journal, NewEntry};
use almanac_types::{BranchId, BranchRecord, Coord, EntityId, EntityKind, JournalEntry, Value, keys};

use crate::cache::{CacheStats, FactCache};
use crate::error::GraphError;

/// Default upper bound on cached results per branch.
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Versioned world graph over a [`Journal`].
#[derive(Debug)]
pub struct GraphStore {
    journal: Journal,
    caches: Mutex<HashMap<BranchId, FactCache>>,
    cache_capacity: usize,
}

impl GraphStore {
    /// Wrap a journal.
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            caches: Mutex::new(HashMap::new()),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Set the per-branch cache bound. A branch cache that outgrows it is
    /// cleared and repopulates lazily.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// The underlying journal.
    pub const fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Current frontier of `branch`.
    pub fn frontier(&self, branch: &BranchId) -> Result<Coord, GraphError> {
        Ok(self.journal.frontier(branch)?)
    }

    // ----- Reads -----

    /// Value of (entity, key) on `branch` at `at`, through the cache.
    pub fn get(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        at: Coord,
    ) -> Result<Option<Value>, GraphError> {
        let compute = || self.get_uncached(branch, entity, key, at);
        let Ok(mut caches) = self.caches.lock() else {
            return compute();
        };
        let cache = caches.entry(branch.clone()).or_default();
        if cache.len() >= self.cache_capacity {
            debug!(branch = %branch, entries = cache.len(), "fact cache full, clearing");
            cache.clear();
        }
        cache.get_or_compute(entity, key, at, compute)
    }

    /// Value of (entity, key) on `branch` at `at`, straight from the journal.
    pub fn get_uncached(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        at: Coord,
    ) -> Result<Option<Value>, GraphError> {
        Ok(self.journal.value(branch, entity, key, at)?)
    }

    /// Value of (entity, key) at the branch frontier.
    pub fn get_latest(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
    ) -> Result<Option<Value>, GraphError> {
        let at = self.frontier(branch)?;
        self.get(branch, entity, key, at)
    }

    /// History of (entity, key) on `branch` for turns `from..=to`, ordered by
    /// coordinate. Deletions appear as `None`. A value set before `from` and
    /// still in effect leads at its write coordinate.
    pub fn get_range(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<(Coord, Option<Value>)>, GraphError> {
        Ok(self
            .journal
            .read_range(branch, entity, key, from, to)?
            .into_iter()
            .map(|entry| (entry.coord(), entry.value.clone()))
            .collect())
    }

    /// Whether `entity` exists on `branch` at `at`.
    ///
    /// The universal entity always exists; a definition exists once any of
    /// its definition keys has been written.
    pub fn exists(&self, branch: &BranchId, entity: &EntityId, at: Coord) -> Result<bool, GraphError> {
        let key = match entity.kind() {
            EntityKind::Universal => return Ok(true),
            EntityKind::Character | EntityKind::Node | EntityKind::Edge => keys::EXISTS,
            EntityKind::Rulebook => keys::RULES,
            EntityKind::Rule => keys::TRIGGER,
            EntityKind::Trigger => keys::EXPR,
            EntityKind::Action => keys::STEPS,
        };
        let value = self.get(branch, entity, key, at)?;
        Ok(match entity.kind() {
            EntityKind::Character | EntityKind::Node | EntityKind::Edge => {
                value == Some(Value::Bool(true))
            }
            _ => value.is_some(),
        })
    }

    /// Cache counters for `branch`.
    pub fn cache_stats(&self, branch: &BranchId) -> CacheStats {
        self.caches
            .lock()
            .ok()
            .and_then(|caches| caches.get(branch).map(FactCache::stats))
            .unwrap_or_default()
    }

    // ----- Writes -----

    /// Append `entry` at the next tick on `branch` and invalidate the cache.
    ///
    /// No validation beyond the journal's own; see [`GraphStore::set`] for
    /// the validated write path.
    pub fn append(&mut self, branch: &BranchId, entry: NewEntry) -> Result<JournalEntry, GraphError> {
        let written = self.journal.append_next(branch, entry)?.clone();
        self.invalidate(&written);
        Ok(written)
    }

    /// Start the next turn on `branch`; returns the new frontier.
    pub fn advance_turn(&mut self, branch: &BranchId) -> Result<Coord, GraphError> {
        let at = self.journal.advance_turn(branch)?;
        self.invalidate_marker(branch, at);
        Ok(at)
    }

    /// Close the turn in progress on `branch`.
    pub fn end_turn(&mut self, branch: &BranchId) -> Result<Coord, GraphError> {
        let at = self.journal.end_turn(branch)?;
        self.invalidate_marker(branch, at);
        Ok(at)
    }

    /// Fork `parent` at `at`. The new branch starts with an empty cache.
    pub fn fork(
        &mut self,
        parent: &BranchId,
        at: Coord,
        name: Option<BranchId>,
    ) -> Result<BranchRecord, GraphError> {
        Ok(self.journal.fork(parent, at, name)?)
    }

    /// Check that writing `key = value` on `entity` at the next tick of
    /// `branch` would be accepted by [`GraphStore::set`], without writing.
    ///
    /// Graph entities must exist; structural keys are type- and
    /// reference-checked; `_exists` and engine-owned keys are rejected;
    /// definition keys cannot be deleted; rule activity flags are bools.
    pub fn check_write(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        value: Option<&Value>,
    ) -> Result<(), GraphError> {
        let at = self.frontier(branch)?;
        match entity.kind() {
            EntityKind::Character | EntityKind::Node | EntityKind::Edge => {
                if !self.exists(branch, entity, at)? {
                    return Err(GraphError::UnknownEntity(entity.clone()));
                }
                if key == keys::EXISTS {
                    return Err(GraphError::ReservedKey {
                        entity: entity.clone(),
                        key: key.to_owned(),
                    });
                }
                self.validate_structural(branch, entity, key, value, at)
            }
            EntityKind::Universal => Self::validate_universal(key, value),
            EntityKind::Rulebook
                if key.starts_with(keys::ACTIVE_PREFIX) && !matches!(value, Some(Value::Bool(_))) =>
            {
                Err(GraphError::BadStructure {
                    key: key.to_owned(),
                    expected: "bool",
                })
            }
            _ if value.is_none() => Err(GraphError::BadStructure {
                key: key.to_owned(),
                expected: "definition value",
            }),
            _ => Ok(()),
        }
    }

    /// Validated write of one fact at the next tick on `branch`.
    ///
    /// Nothing is appended when [`GraphStore::check_write`] rejects it.
    pub fn set(
        &mut self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        value: Option<Value>,
    ) -> Result<JournalEntry, GraphError> {
        self.check_write(branch, entity, key, value.as_ref())?;
        let entry = match value {
            Some(value) if !entity.kind().is_graph() && entity.kind() != EntityKind::Universal => {
                NewEntry::definition(entity.clone(), key, value)
            }
            value => NewEntry::fact(entity.clone(), key, value),
        };
        self.append(branch, entry)
    }

    fn validate_universal(key: &str, value: Option<&Value>) -> Result<(), GraphError> {
        if key == keys::TURN || key == keys::FAULT {
            return Err(GraphError::ReservedKey {
                entity: EntityId::Universal,
                key: key.to_owned(),
            });
        }
        let is_default_rulebook = EntityKind::GRAPH_ORDER
            .iter()
            .filter_map(|k| k.default_rulebook_key())
            .any(|k| k == key);
        match value {
            Some(v) if is_default_rulebook && v.as_str().is_none() => {
                Err(GraphError::BadStructure {
                    key: key.to_owned(),
                    expected: "str",
                })
            }
            Some(v) if key == keys::SEED && v.as_int().is_none() => Err(GraphError::BadStructure {
                key: key.to_owned(),
                expected: "int",
            }),
            _ if keys::is_structural(key) && !is_default_rulebook => Err(GraphError::ReservedKey {
                entity: EntityId::Universal,
                key: key.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    fn invalidate(&mut self, entry: &JournalEntry) {
        let caches = self.caches.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(cache) = caches.get_mut(&entry.branch) {
            cache.invalidate_from(&entry.entity, &entry.key, entry.coord());
        }
    }

    fn invalidate_marker(&mut self, branch: &BranchId, at: Coord) {
        let caches = self.caches.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(cache) = caches.get_mut(branch) {
            cache.invalidate_from(&EntityId::Universal, keys::TURN, at);
        }
    }
}

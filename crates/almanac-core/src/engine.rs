//! The engine: shared, lock-disciplined access to the graph store.
//!
//! [`Engine`] is what the boundary, the autoplay runner and the binary hold
//! (behind an [`Arc`]). It enforces the concurrency model:
//!
//! - reads take the shared store lock only;
//! - every mutation of a branch first takes that branch's mutation lock with
//!   `try_lock`, so a second writer gets [`EngineError::BranchBusy`] instead
//!   of waiting;
//! - the exclusive store lock is held only around journal appends, so a turn
//!   pass on one branch neither stalls reads nor a pass on another branch;
//! - a durability failure sets the halted flag, after which every mutation
//!   returns [`EngineError::Halted`].
//!
//! Completed turns are announced to every registered [`TurnListener`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};

use tracing::{error, info};

use almanac_graph::{CacheStats, GraphError, GraphStore};
use almanac_journal::{Journal, digest};
use almanac_types::{
    ActionId, ActionStep, BranchId, BranchRecord, Coord, EntityId, EntityKind, ErrorKind, Expr,
    JournalEntry, RuleEdit, RuleId, RulebookId, TriggerId, TurnReport, Value, keys,
};

use crate::error::EngineError;
use crate::turn;

/// Receives every completed turn.
pub trait TurnListener: Send + Sync {
    /// Called after a turn's pass completes, outside every engine lock.
    fn on_turn(&self, report: &TurnReport);
}

/// The rule engine and its store, shared between callers.
pub struct Engine {
    store: RwLock<GraphStore>,
    branch_locks: Mutex<HashMap<BranchId, Arc<Mutex<()>>>>,
    halted: AtomicBool,
    listeners: RwLock<Vec<Arc<dyn TurnListener>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("halted", &self.is_halted())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Wrap a graph store.
    pub fn new(store: GraphStore) -> Self {
        Self {
            store: RwLock::new(store),
            branch_locks: Mutex::new(HashMap::new()),
            halted: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// An engine over a fresh in-memory journal.
    pub fn in_memory() -> Self {
        Self::new(GraphStore::new(Journal::in_memory()))
    }

    /// Whether a durability failure has halted mutation.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Register a listener for completed turns.
    pub fn subscribe(&self, listener: Arc<dyn TurnListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    fn with_store<T>(&self, f: impl FnOnce(&GraphStore) -> Result<T, GraphError>) -> Result<T, EngineError> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&store)?)
    }

    fn branch_lock(&self, branch: &BranchId) -> Arc<Mutex<()>> {
        let mut locks = self
            .branch_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(branch.clone()).or_default())
    }

    /// Run `f` as the single writer of `branch`, holding the exclusive store
    /// lock throughout.
    fn mutate<T>(
        &self,
        branch: &BranchId,
        f: impl FnOnce(&mut GraphStore) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.own_branch(branch, |store| {
            let mut store = store.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut store)
        })
    }

    /// Run `f` as the single writer of `branch`. `f` takes the store locks
    /// itself, for as long as each step needs them.
    fn own_branch<T>(
        &self,
        branch: &BranchId,
        f: impl FnOnce(&RwLock<GraphStore>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        if self.is_halted() {
            return Err(EngineError::Halted);
        }
        let lock = self.branch_lock(branch);
        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return Err(EngineError::BranchBusy {
                    branch: branch.clone(),
                });
            }
        };
        let result = f(&self.store);
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Durability {
                self.halted.store(true, Ordering::Release);
                error!(branch = %branch, error = %e, "durability failure, engine halted");
            }
        }
        result
    }

    fn notify(&self, report: &TurnReport) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_turn(report);
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Resolve a boundary coordinate. Without a tick, the coordinate is the
    /// last tick written in `turn` (or its start if nothing was written).
    /// Coordinates beyond the frontier are rejected.
    pub fn resolve(&self, branch: &BranchId, turn: u64, tick: Option<u64>) -> Result<Coord, EngineError> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let frontier = store.frontier(branch)?;
        if turn > frontier.turn {
            return Err(EngineError::UnknownCoordinate {
                branch: branch.clone(),
                turn,
            });
        }
        let tick = match tick {
            Some(tick) => tick,
            None => store
                .journal()
                .turn_end(branch, turn)
                .map_err(GraphError::from)?
                .unwrap_or(0),
        };
        Ok(Coord::new(turn, tick).min(frontier))
    }

    /// Value of (entity, key) on `branch` at `at`; `None` when unset.
    pub fn read(&self, branch: &BranchId, entity: &EntityId, key: &str, at: Coord) -> Result<Option<Value>, EngineError> {
        self.with_store(|store| store.get(branch, entity, key, at))
    }

    /// Ordered `(coordinate, value)` history of (entity, key) for turns
    /// `from..=to`, led by the value in effect when the span opens.
    pub fn read_range(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        key: &str,
        from: u64,
        to: u64,
    ) -> Result<Vec<(Coord, Option<Value>)>, EngineError> {
        self.with_store(|store| store.get_range(branch, entity, key, from, to))
    }

    /// Live entities of `kind` at `at`, in creation order.
    pub fn read_entities(&self, branch: &BranchId, kind: EntityKind, at: Coord) -> Result<Vec<EntityId>, EngineError> {
        self.with_store(|store| store.entities(branch, kind, at))
    }

    /// Current frontier of `branch`.
    pub fn frontier(&self, branch: &BranchId) -> Result<Coord, EngineError> {
        self.with_store(|store| store.frontier(branch))
    }

    /// Metadata of `branch`.
    pub fn branch(&self, branch: &BranchId) -> Result<BranchRecord, EngineError> {
        self.with_store(|store| Ok(store.journal().branch(branch).map_err(GraphError::from)?.record.clone()))
    }

    /// Every branch, in creation order.
    pub fn branches(&self) -> Vec<BranchRecord> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.journal().branch_records().into_iter().cloned().collect()
    }

    /// Branches whose last turn started but never finished.
    pub fn incomplete_turns(&self) -> Vec<(BranchId, u64)> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.journal().incomplete_turns()
    }

    /// Journal entries with `seq >= from`, for archiving.
    pub fn entries_since(&self, from: u64) -> Vec<JournalEntry> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.journal().entries_since(from).to_vec()
    }

    /// Replay fingerprint of the entries written on `branch`.
    pub fn digest(&self, branch: &BranchId) -> Result<String, EngineError> {
        self.with_store(|store| Ok(digest(store.journal(), branch)?))
    }

    /// Cache counters for `branch`.
    pub fn cache_stats(&self, branch: &BranchId) -> CacheStats {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.cache_stats(branch)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Write one fact at the next tick; returns its coordinate.
    pub fn write(&self, branch: &BranchId, entity: &EntityId, key: &str, value: Value) -> Result<Coord, EngineError> {
        self.mutate(branch, |store| Ok(store.set(branch, entity, key, Some(value))?.coord()))
    }

    /// Tombstone one fact at the next tick; returns its coordinate.
    pub fn delete_key(&self, branch: &BranchId, entity: &EntityId, key: &str) -> Result<Coord, EngineError> {
        self.mutate(branch, |store| Ok(store.set(branch, entity, key, None)?.coord()))
    }

    /// Create a graph entity; returns the coordinate of its last fact.
    pub fn create_entity(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        facts: BTreeMap<String, Value>,
    ) -> Result<Coord, EngineError> {
        self.mutate(branch, |store| {
            store.create_entity(branch, entity, facts)?;
            Ok(store.frontier(branch)?)
        })
    }

    /// Delete a graph entity and its dependents; returns the frontier after.
    pub fn delete_entity(&self, branch: &BranchId, entity: &EntityId) -> Result<Coord, EngineError> {
        self.mutate(branch, |store| {
            store.delete_entity(branch, entity)?;
            Ok(store.frontier(branch)?)
        })
    }

    /// Fork `parent` at `at`. Does not take the parent's mutation lock.
    pub fn fork_branch(&self, parent: &BranchId, at: Coord, name: Option<BranchId>) -> Result<BranchRecord, EngineError> {
        if self.is_halted() {
            return Err(EngineError::Halted);
        }
        let result = {
            let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
            store.fork(parent, at, name)
        };
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Durability {
                self.halted.store(true, Ordering::Release);
                error!(branch = %parent, error = %e, "durability failure, engine halted");
            }
        }
        Ok(result?)
    }

    /// Advance `branch` one turn and run its rule pass.
    ///
    /// Rule faults are reported in the returned [`TurnReport`]; only journal
    /// failures are errors. A branch whose last turn never finished must be
    /// restarted with [`Engine::restart_turn`] instead.
    pub fn advance_turn(&self, branch: &BranchId) -> Result<TurnReport, EngineError> {
        let report = self.own_branch(branch, |store| Ok(turn::advance(store, branch)?))?;
        self.notify(&report);
        Ok(report)
    }

    /// Re-run the incomplete last turn of `branch` on a fresh fork taken at
    /// that turn's start. The original branch is left as it is.
    pub fn restart_turn(&self, branch: &BranchId) -> Result<TurnReport, EngineError> {
        let report = self.own_branch(branch, |shared| {
            let (fork, start) = {
                let mut store = shared.write().unwrap_or_else(PoisonError::into_inner);
                let open = store
                    .journal()
                    .branch(branch)
                    .map_err(GraphError::from)?
                    .open_turn();
                let Some(turn) = open else {
                    return Err(EngineError::NoIncompleteTurn {
                        branch: branch.clone(),
                    });
                };
                let start = Coord::turn_start(turn);
                (store.fork(branch, start, None)?, start)
            };
            info!(branch = %branch, restart = %fork.id, turn = start.turn, "restarting incomplete turn");
            self.own_branch(&fork.id, |store| Ok(turn::run_pass(store, &fork.id, start)?))
        })?;
        self.notify(&report);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Define or replace a trigger expression.
    pub fn edit_trigger(&self, branch: &BranchId, id: &TriggerId, expr: &Expr) -> Result<Coord, EngineError> {
        let value = expr.to_value()?;
        let entity = EntityId::Trigger(id.clone());
        self.mutate(branch, |store| Ok(store.set(branch, &entity, keys::EXPR, Some(value))?.coord()))
    }

    /// Define or replace an action's steps.
    pub fn edit_action(&self, branch: &BranchId, id: &ActionId, steps: &[ActionStep]) -> Result<Coord, EngineError> {
        let value = ActionStep::list_to_value(steps)?;
        let entity = EntityId::Action(id.clone());
        self.mutate(branch, |store| Ok(store.set(branch, &entity, keys::STEPS, Some(value))?.coord()))
    }

    /// Define or update a rule. A new rule needs a trigger.
    pub fn edit_rule(&self, branch: &BranchId, id: &RuleId, edit: RuleEdit) -> Result<Coord, EngineError> {
        let entity = EntityId::Rule(id.clone());
        self.mutate(branch, |store| {
            let frontier = store.frontier(branch)?;
            if edit.trigger.is_none() && !store.exists(branch, &entity, frontier)? {
                return Err(EngineError::IncompleteRule { rule: id.clone() });
            }
            let mut at = frontier;
            if let Some(trigger) = edit.trigger {
                at = store
                    .set(branch, &entity, keys::TRIGGER, Some(Value::from(trigger.into_inner())))?
                    .coord();
            }
            let actions = match edit.actions {
                Some(actions) => Some(actions),
                // a new rule starts with no actions
                None if !store.exists(branch, &entity, frontier)? => Some(Vec::new()),
                None => None,
            };
            if let Some(actions) = actions {
                let ids: Vec<String> = actions.into_iter().map(ActionId::into_inner).collect();
                at = store.set(branch, &entity, keys::ACTIONS, Some(Value::from(ids)))?.coord();
            }
            Ok(at)
        })
    }

    /// Define or replace a rulebook's ordered rule list.
    pub fn edit_rulebook(&self, branch: &BranchId, id: &RulebookId, rules: Vec<RuleId>) -> Result<Coord, EngineError> {
        let entity = EntityId::Rulebook(id.clone());
        let ids: Vec<String> = rules.into_iter().map(RuleId::into_inner).collect();
        self.mutate(branch, |store| Ok(store.set(branch, &entity, keys::RULES, Some(Value::from(ids)))?.coord()))
    }

    /// Switch `rule` on or off within `rulebook` from the next tick on.
    pub fn set_rule_active(
        &self,
        branch: &BranchId,
        rulebook: &RulebookId,
        rule: &RuleId,
        active: bool,
    ) -> Result<Coord, EngineError> {
        let entity = EntityId::Rulebook(rulebook.clone());
        self.mutate(branch, |store| {
            if !store.exists(branch, &entity, store.frontier(branch)?)? {
                return Err(GraphError::UnknownEntity(entity.clone()).into());
            }
            let key = keys::active(rule.as_str());
            Ok(store.set(branch, &entity, &key, Some(Value::Bool(active)))?.coord())
        })
    }

    /// Attach `rulebook` to a graph entity, or detach with `None`.
    pub fn attach_rulebook(
        &self,
        branch: &BranchId,
        entity: &EntityId,
        rulebook: Option<&RulebookId>,
    ) -> Result<Coord, EngineError> {
        let value = rulebook.map(|id| Value::from(id.as_str()));
        self.mutate(branch, |store| Ok(store.set(branch, entity, keys::RULEBOOK, value)?.coord()))
    }

    /// Set the rulebook every entity of `kind` without its own uses.
    pub fn set_default_rulebook(
        &self,
        branch: &BranchId,
        kind: EntityKind,
        rulebook: Option<&RulebookId>,
    ) -> Result<Coord, EngineError> {
        let Some(key) = kind.default_rulebook_key() else {
            return Err(GraphError::NotGraphKind(kind).into());
        };
        let value = rulebook.map(|id| Value::from(id.as_str()));
        self.mutate(branch, |store| Ok(store.set(branch, &EntityId::Universal, key, value)?.coord()))
    }
}

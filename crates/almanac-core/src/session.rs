//! Session handles: explicit (client, branch) context.
//!
//! There is no process-wide "current branch". A client opens a session on a
//! branch and every call made through the [`Session`] targets that branch
//! until the client checks out another one. The [`SessionRegistry`] keeps the
//! handles for the boundary, keyed by [`SessionId`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use almanac_types::{BranchId, BranchRecord, Coord, EntityId, EntityKind, SessionId, TurnReport, Value};

use crate::engine::Engine;
use crate::error::EngineError;

/// Public description of an open session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Handle id.
    pub id: SessionId,
    /// Branch the session targets.
    pub branch: BranchId,
    /// When the session was opened.
    pub opened_at: DateTime<Utc>,
}

/// A client's handle on one branch of the engine.
#[derive(Debug, Clone)]
pub struct Session {
    info: SessionInfo,
    engine: Arc<Engine>,
}

impl Session {
    /// Open a session on `branch`, which must exist.
    pub fn open(engine: Arc<Engine>, branch: BranchId) -> Result<Self, EngineError> {
        engine.branch(&branch)?;
        Ok(Self {
            info: SessionInfo {
                id: SessionId::new(),
                branch,
                opened_at: Utc::now(),
            },
            engine,
        })
    }

    /// Handle description.
    pub const fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// The branch this session targets.
    pub const fn branch(&self) -> &BranchId {
        &self.info.branch
    }

    /// Switch to another existing branch.
    pub fn checkout(&mut self, branch: BranchId) -> Result<(), EngineError> {
        self.engine.branch(&branch)?;
        self.info.branch = branch;
        Ok(())
    }

    /// Frontier of the session branch.
    pub fn frontier(&self) -> Result<Coord, EngineError> {
        self.engine.frontier(self.branch())
    }

    /// Read (entity, key) at (turn, tick); a missing tick means end of turn.
    pub fn read(&self, entity: &EntityId, key: &str, turn: u64, tick: Option<u64>) -> Result<Option<Value>, EngineError> {
        let at = self.engine.resolve(self.branch(), turn, tick)?;
        self.engine.read(self.branch(), entity, key, at)
    }

    /// History of (entity, key) over turns `from..=to`.
    pub fn read_range(&self, entity: &EntityId, key: &str, from: u64, to: u64) -> Result<Vec<(Coord, Option<Value>)>, EngineError> {
        self.engine.read_range(self.branch(), entity, key, from, to)
    }

    /// Live entities of `kind` at the frontier.
    pub fn entities(&self, kind: EntityKind) -> Result<Vec<EntityId>, EngineError> {
        let at = self.frontier()?;
        self.engine.read_entities(self.branch(), kind, at)
    }

    /// Write one fact at the frontier.
    pub fn write(&self, entity: &EntityId, key: &str, value: Value) -> Result<Coord, EngineError> {
        self.engine.write(self.branch(), entity, key, value)
    }

    /// Create a graph entity.
    pub fn create_entity(&self, entity: &EntityId, facts: BTreeMap<String, Value>) -> Result<Coord, EngineError> {
        self.engine.create_entity(self.branch(), entity, facts)
    }

    /// Fork the session branch at (turn, tick) and switch to the fork.
    pub fn fork(&mut self, turn: u64, tick: Option<u64>, name: Option<BranchId>) -> Result<BranchRecord, EngineError> {
        let at = self.engine.resolve(self.branch(), turn, tick)?;
        let record = self.engine.fork_branch(self.branch(), at, name)?;
        self.info.branch = record.id.clone();
        Ok(record)
    }

    /// Advance the session branch one turn.
    pub fn advance_turn(&self) -> Result<TurnReport, EngineError> {
        self.engine.advance_turn(self.branch())
    }
}

/// Open sessions, by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionInfo>>,
}

impl SessionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session on `branch`.
    pub fn open(&self, engine: &Engine, branch: BranchId) -> Result<SessionInfo, EngineError> {
        engine.branch(&branch)?;
        let info = SessionInfo {
            id: SessionId::new(),
            branch,
            opened_at: Utc::now(),
        };
        debug!(session = %info.id, branch = %info.branch, "session opened");
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(info.id, info.clone());
        Ok(info)
    }

    /// Look up a session.
    pub fn get(&self, id: SessionId) -> Result<SessionInfo, EngineError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(EngineError::UnknownSession(id))
    }

    /// Point a session at another existing branch.
    pub fn checkout(&self, engine: &Engine, id: SessionId, branch: BranchId) -> Result<SessionInfo, EngineError> {
        engine.branch(&branch)?;
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let info = sessions.get_mut(&id).ok_or(EngineError::UnknownSession(id))?;
        info.branch = branch;
        Ok(info.clone())
    }

    /// Close a session. Closing an unknown id is not an error.
    pub fn close(&self, id: SessionId) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_independent() {
        let engine = Arc::new(Engine::in_memory());
        let mut a = Session::open(Arc::clone(&engine), BranchId::trunk()).unwrap();
        let b = Session::open(Arc::clone(&engine), BranchId::trunk()).unwrap();
        a.advance_turn().unwrap();
        a.fork(1, Some(0), Some(BranchId::new("alt"))).unwrap();
        assert_eq!(a.branch().as_str(), "alt");
        assert_eq!(b.branch().as_str(), "trunk");

        a.write(&EntityId::Universal, "seed", Value::Int(9)).unwrap();
        let at_a = a.frontier().unwrap();
        assert_eq!(a.read(&EntityId::Universal, "seed", at_a.turn, None).unwrap(), Some(Value::Int(9)));
        let at_b = b.frontier().unwrap();
        assert_eq!(b.read(&EntityId::Universal, "seed", at_b.turn, None).unwrap(), None);
    }

    #[test]
    fn open_rejects_unknown_branch() {
        let engine = Arc::new(Engine::in_memory());
        let err = Session::open(engine, BranchId::new("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn registry_round_trip() {
        let engine = Engine::in_memory();
        engine.fork_branch(&BranchId::trunk(), Coord::ZERO, None).unwrap();
        let registry = SessionRegistry::new();
        let info = registry.open(&engine, BranchId::trunk()).unwrap();
        assert_eq!(registry.get(info.id).unwrap().branch, BranchId::trunk());

        let moved = registry.checkout(&engine, info.id, BranchId::new("trunk.1")).unwrap();
        assert_eq!(moved.branch.as_str(), "trunk.1");
        assert!(registry.checkout(&engine, info.id, BranchId::new("missing")).is_err());

        registry.close(info.id);
        assert!(registry.is_empty());
        assert!(matches!(registry.get(info.id), Err(EngineError::UnknownSession(_))));
    }
}

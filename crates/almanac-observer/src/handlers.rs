//! REST API endpoint handlers for the boundary server.
//!
//! Every engine call runs on the blocking pool through
//! [`AppState::blocking`], so a long rule pass never stalls the runtime. A
//! client that disconnects only drops its response; a turn that has started
//! always runs to completion.
//!
//! Requests that act on a branch name it directly (`branch`) or through an
//! open session handle (`session`).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Liveness and halt state |
//! | `GET` | `/api/branches` | List branches with frontiers |
//! | `GET` | `/api/branches/{branch}` | One branch |
//! | `POST` | `/api/branches` | Fork a branch |
//! | `POST` | `/api/branches/{branch}/advance` | Advance one turn |
//! | `POST` | `/api/branches/{branch}/restart` | Re-run an interrupted turn |
//! | `GET` | `/api/read` | Read one fact at a coordinate |
//! | `GET` | `/api/history` | History of one fact over turns |
//! | `GET` | `/api/entities` | Live entities of a kind |
//! | `POST` | `/api/write` | Write or delete one fact |
//! | `POST` | `/api/entities` | Create a graph entity |
//! | `DELETE` | `/api/entities` | Delete a graph entity and its dependents |
//! | `PUT` | `/api/rules/{id}` | Define or update a rule |
//! | `PUT` | `/api/rulebooks/{id}` | Define a rulebook |
//! | `PUT` | `/api/rulebooks/{id}/rules/{rule}/active` | Switch a rule on or off |
//! | `PUT` | `/api/triggers/{id}` | Define a trigger |
//! | `PUT` | `/api/actions/{id}` | Define an action |
//! | `PUT` | `/api/attachments` | Attach a rulebook to an entity |
//! | `PUT` | `/api/defaults/{kind}` | Set a kind's default rulebook |
//! | `POST` | `/api/sessions` | Open a session |
//! | `GET` | `/api/sessions/{id}` | Describe a session |
//! | `PUT` | `/api/sessions/{id}/branch` | Point a session at a branch |
//! | `DELETE` | `/api/sessions/{id}` | Close a session |

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use almanac_core::{Engine, EngineError};
use almanac_types::{
    ActionId, ActionStep, BranchId, BranchRecord, Coord, Coordinate, EntityId, EntityKind, Expr,
    RuleEdit, RuleId, RulebookId, SessionId, TriggerId, Value,
};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_entity(text: &str) -> Result<EntityId, ObserverError> {
    EntityId::from_str(text).map_err(|e| ObserverError::InvalidQuery(e.to_string()))
}

fn parse_kind(text: &str) -> Result<EntityKind, ObserverError> {
    EntityKind::from_str(text).map_err(|e| ObserverError::InvalidQuery(e.to_string()))
}

fn parse_session(text: &str) -> Result<SessionId, ObserverError> {
    Uuid::parse_str(text)
        .map(SessionId::from)
        .map_err(|e| ObserverError::InvalidQuery(format!("invalid session id {text}: {e}")))
}

/// Resolve the branch a request targets.
fn target(state: &AppState, branch: Option<BranchId>, session: Option<&str>) -> Result<BranchId, ObserverError> {
    let session = session.map(parse_session).transpose()?;
    state.target(branch, session)
}

/// `turn` or, when absent, the frontier turn; then the boundary coordinate.
fn resolve_at(engine: &Engine, branch: &BranchId, turn: Option<u64>, tick: Option<u64>) -> Result<Coord, EngineError> {
    let turn = match turn {
        Some(turn) => turn,
        None => engine.frontier(branch)?.turn,
    };
    engine.resolve(branch, turn, tick)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A branch with its current position.
#[derive(Debug, Clone, Serialize)]
pub struct BranchView {
    /// Branch metadata.
    #[serde(flatten)]
    pub record: BranchRecord,
    /// Current frontier.
    pub frontier: Coord,
    /// Turn that started but never finished, if any.
    pub incomplete_turn: Option<u64>,
}

fn branch_view(engine: &Engine, record: BranchRecord) -> Result<BranchView, EngineError> {
    let frontier = engine.frontier(&record.id)?;
    let incomplete_turn = engine
        .incomplete_turns()
        .into_iter()
        .find(|(id, _)| *id == record.id)
        .map(|(_, turn)| turn);
    Ok(BranchView {
        record,
        frontier,
        incomplete_turn,
    })
}

/// Result of a point read.
#[derive(Debug, Clone, Serialize)]
pub struct ReadResponse {
    /// Coordinate the read resolved to.
    pub coordinate: Coordinate,
    /// The value.
    pub value: Value,
}

/// One change in a fact's history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPoint {
    /// Where the change was written.
    pub coordinate: Coord,
    /// The new value; `null` for a deletion.
    pub value: Option<Value>,
}

/// Where a mutation landed.
#[derive(Debug, Clone, Serialize)]
pub struct MutationResponse {
    /// Coordinate of the last entry written.
    pub coordinate: Coordinate,
}

impl MutationResponse {
    const fn new(branch: BranchId, at: Coord) -> Self {
        Self {
            coordinate: Coordinate::new(branch, at),
        }
    }
}

// ---------------------------------------------------------------------------
// Query and request types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/read`.
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Entity in text form (`node:home`).
    pub entity: String,
    /// Attribute key.
    pub key: String,
    /// Turn; defaults to the frontier turn.
    pub turn: Option<u64>,
    /// Tick; defaults to the end of the turn.
    pub tick: Option<u64>,
}

/// Query parameters for `GET /api/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Entity in text form.
    pub entity: String,
    /// Attribute key.
    pub key: String,
    /// First turn (default 0).
    #[serde(default)]
    pub from: u64,
    /// Last turn, inclusive; defaults to the frontier turn.
    pub to: Option<u64>,
}

/// Query parameters for `GET /api/entities`.
#[derive(Debug, Deserialize)]
pub struct EntitiesQuery {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// `character`, `node` or `edge`.
    pub kind: String,
    /// Turn; defaults to the frontier turn.
    pub turn: Option<u64>,
    /// Tick; defaults to the end of the turn.
    pub tick: Option<u64>,
}

/// Body of `POST /api/write`.
#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Entity in text form.
    pub entity: String,
    /// Attribute key.
    pub key: String,
    /// New value; `null` or absent deletes the key.
    #[serde(default)]
    pub value: Option<Value>,
}

/// Body of `POST /api/entities`.
#[derive(Debug, Deserialize)]
pub struct CreateEntityRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// `character`, `node` or `edge`.
    pub kind: String,
    /// Entity name.
    pub name: String,
    /// Initial facts, including the structural keys the kind requires.
    #[serde(default)]
    pub facts: BTreeMap<String, Value>,
}

/// Body of `DELETE /api/entities`.
#[derive(Debug, Deserialize)]
pub struct DeleteEntityRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Entity in text form.
    pub entity: String,
}

/// Body of `POST /api/branches`.
#[derive(Debug, Deserialize)]
pub struct ForkRequest {
    /// Branch to fork.
    pub parent: BranchId,
    /// Fork turn.
    pub turn: u64,
    /// Fork tick; defaults to the end of the turn.
    pub tick: Option<u64>,
    /// Name for the new branch; generated when absent.
    pub name: Option<BranchId>,
}

/// Body of `PUT /api/rules/{id}`.
#[derive(Debug, Deserialize)]
pub struct RuleRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// New trigger reference.
    pub trigger: Option<TriggerId>,
    /// New ordered action references.
    pub actions: Option<Vec<ActionId>>,
}

/// Body of `PUT /api/rulebooks/{id}`.
#[derive(Debug, Deserialize)]
pub struct RulebookRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Rule ids in evaluation order.
    pub rules: Vec<RuleId>,
}

/// Body of `PUT /api/rulebooks/{id}/rules/{rule}/active`.
#[derive(Debug, Deserialize)]
pub struct RuleActiveRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Whether the rule runs.
    pub active: bool,
}

/// Body of `PUT /api/triggers/{id}`.
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Trigger expression.
    pub expr: Expr,
}

/// Body of `PUT /api/actions/{id}`.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Steps in execution order.
    pub steps: Vec<ActionStep>,
}

/// Body of `PUT /api/attachments`.
#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Graph entity in text form.
    pub entity: String,
    /// Rulebook to attach; `null` detaches.
    pub rulebook: Option<RulebookId>,
}

/// Body of `PUT /api/defaults/{kind}`.
#[derive(Debug, Deserialize)]
pub struct DefaultRulebookRequest {
    /// Target branch.
    pub branch: Option<BranchId>,
    /// Target session (instead of `branch`).
    pub session: Option<String>,
    /// Default rulebook; `null` clears it.
    pub rulebook: Option<RulebookId>,
}

/// Body of `POST /api/sessions` and `PUT /api/sessions/{id}/branch`.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    /// Branch the session targets.
    pub branch: BranchId,
}

// ---------------------------------------------------------------------------
// Health and branches
// ---------------------------------------------------------------------------

/// Liveness, halt state and open session count.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let halted = state.engine.is_halted();
    Json(serde_json::json!({
        "status": if halted { "halted" } else { "ok" },
        "halted": halted,
        "sessions": state.sessions.len(),
    }))
}

/// List every branch in creation order.
pub async fn list_branches(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    let branches = state
        .blocking(|engine, _| {
            engine
                .branches()
                .into_iter()
                .map(|record| branch_view(engine, record))
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;
    Ok(Json(serde_json::json!({
        "count": branches.len(),
        "branches": branches,
    })))
}

/// One branch.
pub async fn get_branch(
    State(state): State<Arc<AppState>>,
    Path(branch): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = BranchId::new(branch);
    let view = state
        .blocking(move |engine, _| {
            let record = engine.branch(&branch)?;
            branch_view(engine, record)
        })
        .await?;
    Ok(Json(view))
}

/// Fork a branch at (turn, tick).
pub async fn fork_branch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ForkRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let record = state
        .blocking(move |engine, _| {
            let at = engine.resolve(&body.parent, body.turn, body.tick)?;
            engine.fork_branch(&body.parent, at, body.name)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Advance a branch one turn and return the turn report.
pub async fn advance_turn(
    State(state): State<Arc<AppState>>,
    Path(branch): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = BranchId::new(branch);
    let report = state
        .blocking(move |engine, _| engine.advance_turn(&branch))
        .await?;
    Ok(Json(report))
}

/// Re-run a branch's interrupted turn on a fresh fork.
pub async fn restart_turn(
    State(state): State<Arc<AppState>>,
    Path(branch): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = BranchId::new(branch);
    let report = state
        .blocking(move |engine, _| engine.restart_turn(&branch))
        .await?;
    Ok(Json(report))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Read one fact. An unset fact is `404`.
pub async fn read(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReadQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, q.branch, q.session.as_deref())?;
    let entity = parse_entity(&q.entity)?;
    let key = q.key.clone();
    let (coordinate, value) = state
        .blocking(move |engine, _| {
            let at = resolve_at(engine, &branch, q.turn, q.tick)?;
            let value = engine.read(&branch, &entity, &key, at)?;
            Ok((Coordinate::new(branch, at), value))
        })
        .await?;
    let Some(value) = value else {
        return Err(ObserverError::NotFound(format!(
            "{}.{} is unset at {coordinate}",
            q.entity, q.key
        )));
    };
    Ok(Json(ReadResponse { coordinate, value }))
}

/// Every change of one fact over a turn range.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, q.branch, q.session.as_deref())?;
    let entity = parse_entity(&q.entity)?;
    let key = q.key;
    let from = q.from;
    let to = q.to;
    let (branch, points) = state
        .blocking(move |engine, _| {
            let to = match to {
                Some(to) => to,
                None => engine.frontier(&branch)?.turn,
            };
            let points = engine.read_range(&branch, &entity, &key, from, to)?;
            Ok((branch, points))
        })
        .await?;
    let points: Vec<HistoryPoint> = points
        .into_iter()
        .map(|(coordinate, value)| HistoryPoint { coordinate, value })
        .collect();
    Ok(Json(serde_json::json!({
        "branch": branch,
        "entity": q.entity,
        "points": points,
    })))
}

/// Live entities of one graph kind.
pub async fn list_entities(
    State(state): State<Arc<AppState>>,
    Query(q): Query<EntitiesQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, q.branch, q.session.as_deref())?;
    let kind = parse_kind(&q.kind)?;
    let (coordinate, entities) = state
        .blocking(move |engine, _| {
            let at = resolve_at(engine, &branch, q.turn, q.tick)?;
            let entities = engine.read_entities(&branch, kind, at)?;
            Ok((Coordinate::new(branch, at), entities))
        })
        .await?;
    let entities: Vec<String> = entities.iter().map(ToString::to_string).collect();
    Ok(Json(serde_json::json!({
        "coordinate": coordinate,
        "count": entities.len(),
        "entities": entities,
    })))
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// Write one fact, or delete it when `value` is `null`.
pub async fn write(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WriteRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let entity = parse_entity(&body.entity)?;
    let key = body.key;
    let value = body.value;
    let response = state
        .blocking(move |engine, _| {
            let at = match value {
                Some(value) => engine.write(&branch, &entity, &key, value)?,
                None => engine.delete_key(&branch, &entity, &key)?,
            };
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok(Json(response))
}

/// Create a character, node or edge.
pub async fn create_entity(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateEntityRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let kind = parse_kind(&body.kind)?;
    if !kind.is_graph() {
        return Err(ObserverError::InvalidQuery(format!(
            "{} entities are not created directly",
            kind.prefix()
        )));
    }
    let entity = EntityId::from_parts(kind, body.name);
    let facts = body.facts;
    let label = entity.to_string();
    let response = state
        .blocking(move |engine, _| {
            let at = engine.create_entity(&branch, &entity, facts)?;
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "entity": label,
            "coordinate": response.coordinate,
        })),
    ))
}

/// Delete a graph entity and everything that depends on it.
pub async fn delete_entity(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeleteEntityRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let entity = parse_entity(&body.entity)?;
    let response = state
        .blocking(move |engine, _| {
            let at = engine.delete_entity(&branch, &entity)?;
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Define or update a rule.
pub async fn put_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RuleRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let rule = RuleId::new(id);
    let edit = RuleEdit {
        trigger: body.trigger,
        actions: body.actions,
    };
    let response = state
        .blocking(move |engine, _| {
            let at = engine.edit_rule(&branch, &rule, edit)?;
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok(Json(response))
}

/// Define or replace a rulebook.
pub async fn put_rulebook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RulebookRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let rulebook = RulebookId::new(id);
    let rules = body.rules;
    let response = state
        .blocking(move |engine, _| {
            let at = engine.edit_rulebook(&branch, &rulebook, rules)?;
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok(Json(response))
}

/// Switch one rule of a rulebook on or off.
pub async fn put_rule_active(
    State(state): State<Arc<AppState>>,
    Path((id, rule)): Path<(String, String)>,
    Json(body): Json<RuleActiveRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let rulebook = RulebookId::new(id);
    let rule = RuleId::new(rule);
    let active = body.active;
    let response = state
        .blocking(move |engine, _| {
            let at = engine.set_rule_active(&branch, &rulebook, &rule, active)?;
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok(Json(response))
}

/// Define or replace a trigger.
pub async fn put_trigger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TriggerRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let trigger = TriggerId::new(id);
    let expr = body.expr;
    let response = state
        .blocking(move |engine, _| {
            let at = engine.edit_trigger(&branch, &trigger, &expr)?;
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok(Json(response))
}

/// Define or replace an action.
pub async fn put_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ActionRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let action = ActionId::new(id);
    let steps = body.steps;
    let response = state
        .blocking(move |engine, _| {
            let at = engine.edit_action(&branch, &action, &steps)?;
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok(Json(response))
}

/// Attach a rulebook to a graph entity, or detach it.
pub async fn put_attachment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AttachRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let entity = parse_entity(&body.entity)?;
    let rulebook = body.rulebook;
    let response = state
        .blocking(move |engine, _| {
            let at = engine.attach_rulebook(&branch, &entity, rulebook.as_ref())?;
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok(Json(response))
}

/// Set or clear the default rulebook of a graph kind.
pub async fn put_default_rulebook(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(body): Json<DefaultRulebookRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let branch = target(&state, body.branch, body.session.as_deref())?;
    let kind = parse_kind(&kind)?;
    let rulebook = body.rulebook;
    let response = state
        .blocking(move |engine, _| {
            let at = engine.set_default_rulebook(&branch, kind, rulebook.as_ref())?;
            Ok(MutationResponse::new(branch, at))
        })
        .await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Open a session on a branch.
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SessionRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let info = state
        .blocking(move |engine, sessions| sessions.open(engine, body.branch))
        .await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// Describe a session.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = parse_session(&id)?;
    Ok(Json(state.sessions.get(id)?))
}

/// Point a session at another branch.
pub async fn checkout_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SessionRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = parse_session(&id)?;
    let info = state
        .blocking(move |engine, sessions| sessions.checkout(engine, id, body.branch))
        .await?;
    Ok(Json(info))
}

/// Close a session.
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = parse_session(&id)?;
    state.sessions.close(id);
    Ok(StatusCode::NO_CONTENT)
}

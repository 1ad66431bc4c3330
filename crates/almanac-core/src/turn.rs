//! The turn cycle: one rule pass over the world graph.
//!
//! Each turn runs through these phases:
//!
//! 1. **Advance** -- the branch moves to `(turn + 1, 0)` and journals the
//!    turn-start marker.
//!
//! 2. **Plan** -- every live character, node and edge (in that kind order,
//!    then creation order) is matched to its rulebook, and every rule still
//!    active in those rulebooks is resolved, all as of the turn-start
//!    coordinate.
//!
//! 3. **Evaluate** -- for each subject and each rule in list order, the
//!    trigger is evaluated against the turn-start snapshot. When it holds,
//!    the rule's actions run in order. Each action evaluates all its steps
//!    against live state, validates the staged writes, then commits them one
//!    tick apart.
//!
//! 4. **Close** -- the turn-end marker is journaled.
//!
//! A faulting trigger skips its rule. A faulting action commits nothing and
//! skips the rest of its rule. Either way a fault entry is journaled on the
//! subject and the pass continues. Only journal failures end a pass early.
//!
//! # Locking
//!
//! The pass shares the store. Planning, trigger evaluation and staging run
//! under the shared lock; the exclusive lock is held only while journaling
//! (the turn markers, one action's writes, one fault record). The caller
//! must hold the branch's mutation lock for the whole pass, so the branch
//! frontier only moves when the pass itself writes.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use almanac_graph::{GraphError, GraphStore};
use almanac_journal::NewEntry;
use almanac_types::{
    ActionId, ActionStep, BranchId, Coord, EntityId, EntityKind, ErrorKind, FaultPhase,
    FaultRecord, RuleId, RulebookId, TurnReport, Value, keys,
};

use crate::definitions::{DefinitionFault, Definitions, ResolvedRule};
use crate::eval::{Evaluator, Facts, rule_rng};

// ---------------------------------------------------------------------------
// Fact sources
// ---------------------------------------------------------------------------

/// Reads as of a fixed coordinate.
struct Snapshot<'a> {
    store: &'a GraphStore,
    branch: &'a BranchId,
    at: Coord,
}

impl Facts for Snapshot<'_> {
    fn fact(&self, entity: &EntityId, key: &str) -> Result<Option<Value>, GraphError> {
        self.store.get(self.branch, entity, key, self.at)
    }
}

/// Reads at the frontier, overlaid with the current action's staged writes.
struct Live<'a> {
    store: &'a GraphStore,
    branch: &'a BranchId,
    at: Coord,
    staged: &'a [Staged],
}

impl Facts for Live<'_> {
    fn fact(&self, entity: &EntityId, key: &str) -> Result<Option<Value>, GraphError> {
        if let Some(write) = self
            .staged
            .iter()
            .rev()
            .find(|w| &w.entity == entity && w.key == key)
        {
            return Ok(write.value.clone());
        }
        self.store.get(self.branch, entity, key, self.at)
    }
}

struct Staged {
    entity: EntityId,
    key: String,
    value: Option<Value>,
}

fn shared(store: &RwLock<GraphStore>) -> RwLockReadGuard<'_, GraphStore> {
    store.read().unwrap_or_else(PoisonError::into_inner)
}

fn exclusive(store: &RwLock<GraphStore>) -> RwLockWriteGuard<'_, GraphStore> {
    store.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

enum Planned {
    Rule(ResolvedRule),
    Fault {
        rule: Option<RuleId>,
        fault: DefinitionFault,
    },
}

struct SubjectPlan {
    subject: EntityId,
    rulebook: RulebookId,
    rules: Vec<Planned>,
}

fn plan(store: &GraphStore, branch: &BranchId, start: Coord) -> Result<Vec<SubjectPlan>, GraphError> {
    let mut defs = Definitions::new(store, branch, start);
    let mut plans = Vec::new();
    for kind in EntityKind::GRAPH_ORDER {
        for subject in store.entities(branch, kind, start)? {
            let Some(rulebook) = defs.rulebook_for(&subject)? else {
                continue;
            };
            let rules = match defs.rulebook(&rulebook)? {
                Err(fault) => vec![Planned::Fault { rule: None, fault }],
                Ok(ids) => {
                    let mut rules = Vec::with_capacity(ids.len());
                    for id in ids {
                        if !defs.rule_active(&rulebook, &id)? {
                            debug!(branch = %branch, entity = %subject, rule = %id, "rule inactive, skipped");
                            continue;
                        }
                        rules.push(match defs.rule(&id)? {
                            Ok(rule) => Planned::Rule(rule),
                            Err(fault) => Planned::Fault {
                                rule: Some(id),
                                fault,
                            },
                        });
                    }
                    rules
                }
            };
            plans.push(SubjectPlan {
                subject,
                rulebook,
                rules,
            });
        }
    }
    Ok(plans)
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

enum ActionFailure {
    Fault(String),
    Fatal(GraphError),
}

impl From<GraphError> for ActionFailure {
    fn from(e: GraphError) -> Self {
        Self::Fatal(e)
    }
}

/// Where in a rulebook a fault was raised.
struct FaultSite<'a> {
    subject: &'a EntityId,
    rulebook: &'a RulebookId,
    rule: Option<&'a RuleId>,
    action: Option<&'a ActionId>,
}

struct Pass<'s> {
    store: &'s RwLock<GraphStore>,
    branch: &'s BranchId,
    start: Coord,
    seed: i64,
    report: TurnReport,
}

impl Pass<'_> {
    fn run_rule(&mut self, subject: &EntityId, rulebook: &RulebookId, rule: &ResolvedRule) -> Result<(), GraphError> {
        self.report.rules_evaluated = self.report.rules_evaluated.saturating_add(1);
        let mut rng = rule_rng(self.seed, self.start.turn, subject, &rule.id);
        let site = FaultSite {
            subject,
            rulebook,
            rule: Some(&rule.id),
            action: None,
        };

        let fired = {
            let store = shared(self.store);
            let snapshot = Snapshot {
                store: &store,
                branch: self.branch,
                at: self.start,
            };
            Evaluator::new(&snapshot, subject, self.start.turn, &mut rng).eval_bool(&rule.trigger)
        };
        match fired {
            Err(e) => return self.fault(&site, FaultPhase::Trigger, e.to_string()),
            Ok(false) => return Ok(()),
            Ok(true) => {}
        }
        self.report.rules_fired = self.report.rules_fired.saturating_add(1);
        debug!(branch = %self.branch, turn = self.start.turn, entity = %subject, rule = %rule.id, "rule fired");

        for (action, steps) in &rule.actions {
            match self.run_action(subject, steps, &mut rng) {
                Ok(()) => {}
                Err(ActionFailure::Fatal(e)) => return Err(e),
                Err(ActionFailure::Fault(message)) => {
                    let site = FaultSite {
                        action: Some(action),
                        ..site
                    };
                    return self.fault(&site, FaultPhase::Action, message);
                }
            }
        }
        Ok(())
    }

    fn run_action(&mut self, subject: &EntityId, steps: &[ActionStep], rng: &mut ChaCha8Rng) -> Result<(), ActionFailure> {
        let staged = self.stage(subject, steps, rng)?;
        let mut store = exclusive(self.store);
        for write in staged {
            match store.set(self.branch, &write.entity, &write.key, write.value) {
                Ok(entry) => self.report.facts_written.push(entry),
                Err(e) if e.kind() == ErrorKind::Durability => return Err(ActionFailure::Fatal(e)),
                Err(e) => return Err(ActionFailure::Fault(e.to_string())),
            }
        }
        Ok(())
    }

    /// Evaluate every step and validate the resulting writes, without
    /// journaling anything.
    fn stage(&self, subject: &EntityId, steps: &[ActionStep], rng: &mut ChaCha8Rng) -> Result<Vec<Staged>, ActionFailure> {
        let store = shared(self.store);
        let at = store.frontier(self.branch)?;
        let mut staged: Vec<Staged> = Vec::with_capacity(steps.len());
        for step in steps {
            let (entity, key, expr) = match step {
                ActionStep::Set { key, value } => (subject, key, Some(value)),
                ActionStep::SetOn { entity, key, value } => (entity, key, Some(value)),
                ActionStep::Delete { key } => (subject, key, None),
            };
            let value = match expr {
                None => None,
                Some(expr) => {
                    let live = Live {
                        store: &store,
                        branch: self.branch,
                        at,
                        staged: &staged,
                    };
                    let value = Evaluator::new(&live, subject, self.start.turn, rng)
                        .eval(expr)
                        .map_err(|e| ActionFailure::Fault(e.to_string()))?;
                    if value.is_none() {
                        return Err(ActionFailure::Fault(format!("set {key}: value is unset")));
                    }
                    value
                }
            };
            staged.push(Staged {
                entity: entity.clone(),
                key: key.clone(),
                value,
            });
        }

        for write in &staged {
            store
                .check_write(self.branch, &write.entity, &write.key, write.value.as_ref())
                .map_err(|e| ActionFailure::Fault(e.to_string()))?;
        }
        Ok(staged)
    }

    fn fault(&mut self, site: &FaultSite<'_>, phase: FaultPhase, message: String) -> Result<(), GraphError> {
        let mut record = BTreeMap::new();
        record.insert("phase".to_owned(), Value::from(phase.as_str()));
        record.insert("rulebook".to_owned(), Value::from(site.rulebook.as_str()));
        if let Some(rule) = site.rule {
            record.insert("rule".to_owned(), Value::from(rule.as_str()));
        }
        if let Some(action) = site.action {
            record.insert("action".to_owned(), Value::from(action.as_str()));
        }
        record.insert("message".to_owned(), Value::from(message.as_str()));
        let entry = exclusive(self.store)
            .append(self.branch, NewEntry::fault(site.subject.clone(), Value::Map(record)))?;

        warn!(
            branch = %self.branch,
            turn = self.start.turn,
            tick = entry.tick,
            entity = %site.subject,
            rule = site.rule.map(RuleId::as_str),
            phase = phase.as_str(),
            %message,
            "rule fault"
        );
        self.report.faults.push(FaultRecord {
            entity: site.subject.clone(),
            rulebook: Some(site.rulebook.clone()),
            rule: site.rule.cloned(),
            phase,
            action: site.action.cloned(),
            message,
            coord: entry.coord(),
        });
        Ok(())
    }
}

/// Run the rule pass for the turn starting at `start` on `branch`, then
/// journal the turn-end marker.
///
/// `start` must be the branch frontier and a turn start, as left by
/// [`GraphStore::advance_turn`] or by forking at a turn start.
pub fn run_pass(store: &RwLock<GraphStore>, branch: &BranchId, start: Coord) -> Result<TurnReport, GraphError> {
    let (plans, seed) = {
        let snapshot = shared(store);
        let plans = plan(&snapshot, branch, start)?;
        let seed = snapshot
            .get(branch, &EntityId::Universal, keys::SEED, start)?
            .as_ref()
            .and_then(Value::as_int)
            .unwrap_or(0);
        (plans, seed)
    };

    let mut pass = Pass {
        store,
        branch,
        start,
        seed,
        report: TurnReport {
            branch: branch.clone(),
            start,
            end: start,
            facts_written: Vec::new(),
            faults: Vec::new(),
            rules_evaluated: 0,
            rules_fired: 0,
        },
    };

    for subject_plan in &plans {
        for planned in &subject_plan.rules {
            match planned {
                Planned::Rule(rule) => pass.run_rule(&subject_plan.subject, &subject_plan.rulebook, rule)?,
                Planned::Fault { rule, fault } => {
                    let site = FaultSite {
                        subject: &subject_plan.subject,
                        rulebook: &subject_plan.rulebook,
                        rule: rule.as_ref(),
                        action: None,
                    };
                    pass.fault(&site, FaultPhase::Definition, fault.to_string())?;
                }
            }
        }
    }

    pass.report.end = exclusive(store).end_turn(branch)?;
    let report = pass.report;
    info!(
        branch = %branch,
        turn = start.turn,
        facts = report.facts_written.len(),
        faults = report.faults.len(),
        rules_fired = report.rules_fired,
        "turn complete"
    );
    Ok(report)
}

/// Advance `branch` to its next turn and run that turn's rule pass.
pub fn advance(store: &RwLock<GraphStore>, branch: &BranchId) -> Result<TurnReport, GraphError> {
    let start = exclusive(store).advance_turn(branch)?;
    run_pass(store, branch, start)
}

//! Turn-start resolution of rulebooks, rules, triggers and actions.
//!
//! Definitions are journaled facts like any other, so "the rule as of this
//! turn" is a read at the turn-start coordinate. [`Definitions`] memoizes
//! those reads for one pass: every subject sharing a rulebook sees the same
//! resolved rules, and edits journaled during the pass are invisible until
//! the next turn.

use std::collections::HashMap;

use almanac_graph::{GraphError, GraphStore};
use almanac_types::{
    ActionId, ActionStep, BranchId, Coord, EntityId, Expr, RuleId, RulebookId, TriggerId, Value,
    keys,
};

/// A definition that failed to resolve. Reported as a rule fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DefinitionFault(pub String);

/// A rule with its trigger and actions resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRule {
    /// The rule.
    pub id: RuleId,
    /// Trigger expression.
    pub trigger: Expr,
    /// Actions in execution order.
    pub actions: Vec<(ActionId, Vec<ActionStep>)>,
}

/// Memoized definition lookups for one pass at a fixed coordinate.
#[derive(Debug)]
pub struct Definitions<'a> {
    store: &'a GraphStore,
    branch: &'a BranchId,
    at: Coord,
    rulebooks: HashMap<RulebookId, Result<Vec<RuleId>, DefinitionFault>>,
    rules: HashMap<RuleId, Result<ResolvedRule, DefinitionFault>>,
}

impl<'a> Definitions<'a> {
    /// Resolve definitions on `branch` as of `at`.
    pub fn new(store: &'a GraphStore, branch: &'a BranchId, at: Coord) -> Self {
        Self {
            store,
            branch,
            at,
            rulebooks: HashMap::new(),
            rules: HashMap::new(),
        }
    }

    fn read(&self, entity: &EntityId, key: &str) -> Result<Option<Value>, GraphError> {
        self.store.get(self.branch, entity, key, self.at)
    }

    /// The rulebook governing `subject`: its own `_rulebook` fact, else the
    /// universal default for its kind. `None` when neither is set.
    pub fn rulebook_for(&self, subject: &EntityId) -> Result<Option<RulebookId>, GraphError> {
        if let Some(own) = self.read(subject, keys::RULEBOOK)? {
            return Ok(own.as_str().map(RulebookId::new));
        }
        let Some(default_key) = subject.kind().default_rulebook_key() else {
            return Ok(None);
        };
        Ok(self
            .read(&EntityId::Universal, default_key)?
            .as_ref()
            .and_then(Value::as_str)
            .map(RulebookId::new))
    }

    /// Rule ids of `rulebook`, in evaluation order.
    pub fn rulebook(&mut self, rulebook: &RulebookId) -> Result<Result<Vec<RuleId>, DefinitionFault>, GraphError> {
        if let Some(cached) = self.rulebooks.get(rulebook) {
            return Ok(cached.clone());
        }
        let entity = EntityId::Rulebook(rulebook.clone());
        let resolved = match self.read(&entity, keys::RULES)? {
            None => Err(DefinitionFault(format!("rulebook {rulebook} is not defined"))),
            Some(value) => value
                .as_str_list()
                .map(|ids| ids.into_iter().map(RuleId::new).collect())
                .ok_or_else(|| DefinitionFault(format!("rulebook {rulebook} rules must be a list of ids"))),
        };
        self.rulebooks.insert(rulebook.clone(), resolved.clone());
        Ok(resolved)
    }

    /// Whether `rule` runs in `rulebook`. Rules are active until switched
    /// off.
    pub fn rule_active(&self, rulebook: &RulebookId, rule: &RuleId) -> Result<bool, GraphError> {
        let flag = self.read(&EntityId::Rulebook(rulebook.clone()), &keys::active(rule.as_str()))?;
        Ok(flag.as_ref().and_then(Value::as_bool).unwrap_or(true))
    }

    /// The resolved rule `id`.
    pub fn rule(&mut self, id: &RuleId) -> Result<Result<ResolvedRule, DefinitionFault>, GraphError> {
        if let Some(cached) = self.rules.get(id) {
            return Ok(cached.clone());
        }
        let resolved = self.resolve_rule(id)?;
        self.rules.insert(id.clone(), resolved.clone());
        Ok(resolved)
    }

    fn resolve_rule(&self, id: &RuleId) -> Result<Result<ResolvedRule, DefinitionFault>, GraphError> {
        let entity = EntityId::Rule(id.clone());
        let Some(trigger_ref) = self.read(&entity, keys::TRIGGER)? else {
            return Ok(Err(DefinitionFault(format!("rule {id} is not defined"))));
        };
        let Some(trigger_id) = trigger_ref.as_str().map(TriggerId::new) else {
            return Ok(Err(DefinitionFault(format!("rule {id} trigger must be an id"))));
        };
        let action_ids: Vec<ActionId> = match self.read(&entity, keys::ACTIONS)? {
            None => Vec::new(),
            Some(value) => match value.as_str_list() {
                Some(ids) => ids.into_iter().map(ActionId::new).collect(),
                None => {
                    return Ok(Err(DefinitionFault(format!(
                        "rule {id} actions must be a list of ids"
                    ))));
                }
            },
        };

        let trigger = match self.read(&EntityId::Trigger(trigger_id.clone()), keys::EXPR)? {
            None => {
                return Ok(Err(DefinitionFault(format!(
                    "rule {id} references missing trigger {trigger_id}"
                ))));
            }
            Some(value) => match Expr::from_value(&value) {
                Ok(expr) => expr,
                Err(e) => return Ok(Err(DefinitionFault(format!("trigger {trigger_id}: {e}")))),
            },
        };

        let mut actions = Vec::with_capacity(action_ids.len());
        for action in action_ids {
            let steps = match self.read(&EntityId::Action(action.clone()), keys::STEPS)? {
                None => {
                    return Ok(Err(DefinitionFault(format!(
                        "rule {id} references missing action {action}"
                    ))));
                }
                Some(value) => match ActionStep::list_from_value(&value) {
                    Ok(steps) => steps,
                    Err(e) => return Ok(Err(DefinitionFault(format!("action {action}: {e}")))),
                },
            };
            actions.push((action, steps));
        }

        Ok(Ok(ResolvedRule {
            id: id.clone(),
            trigger,
            actions,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use almanac_journal::Journal;

    fn store_with_rule() -> (GraphStore, BranchId) {
        let mut store = GraphStore::new(Journal::in_memory());
        let trunk = BranchId::trunk();
        store
            .set(&trunk, &EntityId::Trigger(TriggerId::new("always")), keys::EXPR, Some(Expr::lit(true).to_value().unwrap()))
            .unwrap();
        store
            .set(
                &trunk,
                &EntityId::Action(ActionId::new("cheer")),
                keys::STEPS,
                Some(ActionStep::list_to_value(&[ActionStep::set("mood", Expr::lit("happy"))]).unwrap()),
            )
            .unwrap();
        let rule = EntityId::Rule(RuleId::new("grow"));
        store.set(&trunk, &rule, keys::TRIGGER, Some(Value::from("always"))).unwrap();
        store
            .set(&trunk, &rule, keys::ACTIONS, Some(Value::from(vec!["cheer"])))
            .unwrap();
        store
            .set(&trunk, &EntityId::Rulebook(RulebookId::new("home")), keys::RULES, Some(Value::from(vec!["grow", "ghost"])))
            .unwrap();
        store
            .create_entity(&trunk, &EntityId::character("alice"), BTreeMap::new())
            .unwrap();
        (store, trunk)
    }

    #[test]
    fn resolves_rule_chain() {
        let (store, trunk) = store_with_rule();
        let at = store.frontier(&trunk).unwrap();
        let mut defs = Definitions::new(&store, &trunk, at);
        let rules = defs.rulebook(&RulebookId::new("home")).unwrap().unwrap();
        assert_eq!(rules, vec![RuleId::new("grow"), RuleId::new("ghost")]);
        let grow = defs.rule(&RuleId::new("grow")).unwrap().unwrap();
        assert_eq!(grow.trigger, Expr::lit(true));
        assert_eq!(grow.actions.len(), 1);
        let ghost = defs.rule(&RuleId::new("ghost")).unwrap();
        assert!(ghost.is_err());
    }

    #[test]
    fn kind_default_applies_without_own_rulebook() {
        let (mut store, trunk) = store_with_rule();
        let alice = EntityId::character("alice");
        store
            .set(&trunk, &EntityId::Universal, "_rulebook.character", Some(Value::from("home")))
            .unwrap();
        let at = store.frontier(&trunk).unwrap();
        let defs = Definitions::new(&store, &trunk, at);
        assert_eq!(defs.rulebook_for(&alice).unwrap(), Some(RulebookId::new("home")));

        store
            .set(&trunk, &alice, keys::RULEBOOK, Some(Value::from("own")))
            .unwrap();
        let at = store.frontier(&trunk).unwrap();
        let defs = Definitions::new(&store, &trunk, at);
        assert_eq!(defs.rulebook_for(&alice).unwrap(), Some(RulebookId::new("own")));
    }

    #[test]
    fn rules_are_active_until_switched_off() {
        let (mut store, trunk) = store_with_rule();
        let home = RulebookId::new("home");
        let grow = RuleId::new("grow");
        let before = store.frontier(&trunk).unwrap();
        store
            .set(&trunk, &EntityId::Rulebook(home.clone()), &keys::active("grow"), Some(Value::Bool(false)))
            .unwrap();
        let after = store.frontier(&trunk).unwrap();
        assert!(Definitions::new(&store, &trunk, before).rule_active(&home, &grow).unwrap());
        assert!(!Definitions::new(&store, &trunk, after).rule_active(&home, &grow).unwrap());

        let err = store
            .set(&trunk, &EntityId::Rulebook(home), &keys::active("grow"), Some(Value::Int(0)))
            .unwrap_err();
        assert!(matches!(err, GraphError::BadStructure { .. }));
    }

    #[test]
    fn edits_after_the_snapshot_are_invisible() {
        let (mut store, trunk) = store_with_rule();
        let at = store.frontier(&trunk).unwrap();
        store
            .set(&trunk, &EntityId::Rulebook(RulebookId::new("home")), keys::RULES, Some(Value::from(vec!["grow"])))
            .unwrap();
        let mut defs = Definitions::new(&store, &trunk, at);
        assert_eq!(defs.rulebook(&RulebookId::new("home")).unwrap().unwrap().len(), 2);
    }
}

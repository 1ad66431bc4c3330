//! Restart and replay: a file-backed journal reopened from disk, interrupted
//! turns, and run-to-run determinism of seeded rules.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::path::Path;

use almanac_core::Engine;
use almanac_graph::GraphStore;
use almanac_journal::{FileSink, Journal};
use almanac_types::{
    ActionId, ActionStep, BranchId, Coord, EntityId, Expr, RuleEdit, RuleId, RulebookId,
    TriggerId, Value, keys,
};

fn trunk() -> BranchId {
    BranchId::trunk()
}

fn pond() -> EntityId {
    EntityId::node("pond")
}

fn open_engine(dir: &Path) -> Engine {
    let sink = FileSink::open(dir, false).unwrap();
    let journal = Journal::open(trunk(), Box::new(sink)).unwrap();
    Engine::new(GraphStore::new(journal))
}

/// A pond whose `fish` count grows by a die roll while a coin lands heads.
fn seed_world(engine: &Engine, seed: i64) {
    let branch = trunk();
    engine
        .write(&branch, &EntityId::Universal, keys::SEED, Value::Int(seed))
        .unwrap();
    engine
        .create_entity(&branch, &EntityId::character("nature"), BTreeMap::new())
        .unwrap();
    let mut facts = BTreeMap::new();
    facts.insert(keys::OWNER.to_owned(), Value::from("nature"));
    facts.insert("fish".to_owned(), Value::Int(0));
    engine.create_entity(&branch, &pond(), facts).unwrap();

    let trigger = TriggerId::new("spawn.when");
    let action = ActionId::new("spawn.do");
    engine
        .edit_trigger(&branch, &trigger, &Expr::chance(Expr::lit(0.5)))
        .unwrap();
    engine
        .edit_action(
            &branch,
            &action,
            &[ActionStep::set("fish", Expr::add(Expr::get("fish"), Expr::roll(Expr::lit(6_i64))))],
        )
        .unwrap();
    engine
        .edit_rule(
            &branch,
            &RuleId::new("spawn"),
            RuleEdit {
                trigger: Some(trigger),
                actions: Some(vec![action]),
            },
        )
        .unwrap();
    engine
        .edit_rulebook(&branch, &RulebookId::new("pond"), vec![RuleId::new("spawn")])
        .unwrap();
    engine
        .set_default_rulebook(&branch, almanac_types::EntityKind::Node, Some(&RulebookId::new("pond")))
        .unwrap();
}

fn fish_history(engine: &Engine, branch: &BranchId, turns: u64) -> Vec<(Coord, Option<Value>)> {
    engine.read_range(branch, &pond(), "fish", 0, turns).unwrap()
}

#[test]
fn reopened_journal_reads_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let (history, digest, frontier) = {
        let engine = open_engine(dir.path());
        seed_world(&engine, 7);
        for _ in 0..8 {
            engine.advance_turn(&trunk()).unwrap();
        }
        let at = engine.frontier(&trunk()).unwrap();
        let fork = engine.fork_branch(&trunk(), Coord::turn_start(4), Some(BranchId::new("dry"))).unwrap();
        engine.write(&fork.id, &pond(), "fish", Value::Int(0)).unwrap();
        (fish_history(&engine, &trunk(), 8), engine.digest(&trunk()).unwrap(), at)
    };

    let engine = open_engine(dir.path());
    assert_eq!(engine.frontier(&trunk()).unwrap(), frontier);
    assert_eq!(fish_history(&engine, &trunk(), 8), history);
    assert_eq!(engine.digest(&trunk()).unwrap(), digest);
    for (at, value) in &history {
        assert_eq!(&engine.read(&trunk(), &pond(), "fish", *at).unwrap(), value);
    }

    let names: Vec<_> = engine.branches().into_iter().map(|b| b.id).collect();
    assert_eq!(names, vec![trunk(), BranchId::new("dry")]);
    let dry_at = engine.frontier(&BranchId::new("dry")).unwrap();
    assert_eq!(
        engine.read(&BranchId::new("dry"), &pond(), "fish", dry_at).unwrap(),
        Some(Value::Int(0))
    );
    assert!(engine.incomplete_turns().is_empty());
}

#[test]
fn independent_runs_are_identical() {
    let run = || {
        let engine = Engine::in_memory();
        seed_world(&engine, 42);
        for _ in 0..12 {
            engine.advance_turn(&trunk()).unwrap();
        }
        (engine.digest(&trunk()).unwrap(), fish_history(&engine, &trunk(), 12))
    };
    let (digest_a, history_a) = run();
    let (digest_b, history_b) = run();
    assert_eq!(digest_a, digest_b);
    assert_eq!(history_a, history_b);
}

#[test]
fn interrupted_turn_is_detected_and_restarted() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = open_engine(dir.path());
        seed_world(&engine, 3);
        engine.advance_turn(&trunk()).unwrap();
    }
    {
        // a turn that started but never closed, as after a crash mid-pass
        let sink = FileSink::open(dir.path(), false).unwrap();
        let mut store = GraphStore::new(Journal::open(trunk(), Box::new(sink)).unwrap());
        assert_eq!(store.advance_turn(&trunk()).unwrap(), Coord::turn_start(2));
    }

    let engine = open_engine(dir.path());
    assert_eq!(engine.incomplete_turns(), vec![(trunk(), 2)]);

    let report = engine.restart_turn(&trunk()).unwrap();
    assert_ne!(report.branch, trunk());
    assert_eq!(report.start, Coord::turn_start(2));
    assert_eq!(engine.branch(&report.branch).unwrap().parent, Some(trunk()));

    // the restarted pass matches what an uninterrupted run computes
    let reference = Engine::in_memory();
    seed_world(&reference, 3);
    reference.advance_turn(&trunk()).unwrap();
    let expected = reference.advance_turn(&trunk()).unwrap();
    let values = |r: &almanac_types::TurnReport| -> Vec<_> {
        r.facts_written.iter().map(|e| (e.coord(), e.value.clone())).collect()
    };
    assert_eq!(values(&report), values(&expected));

    // the restart branch is complete and can keep going
    engine.advance_turn(&report.branch).unwrap();
    assert_eq!(engine.incomplete_turns(), vec![(trunk(), 2)]);
}

#[test]
fn crashed_turn_is_never_skipped() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = open_engine(dir.path());
        seed_world(&engine, 5);
    }
    {
        let sink = FileSink::open(dir.path(), false).unwrap();
        let mut journal = Journal::open(trunk(), Box::new(sink)).unwrap();
        journal.advance_turn(&trunk()).unwrap();
    }

    let engine = open_engine(dir.path());
    let err = engine.advance_turn(&trunk()).unwrap_err();
    assert_eq!(err.kind(), almanac_types::ErrorKind::Validation);
    assert_eq!(engine.frontier(&trunk()).unwrap(), Coord::turn_start(1));
    assert_eq!(engine.incomplete_turns(), vec![(trunk(), 1)]);

    // the refusal is not journaled, so a reopen still sees the crash
    drop(engine);
    let engine = open_engine(dir.path());
    assert_eq!(engine.incomplete_turns(), vec![(trunk(), 1)]);
    let report = engine.restart_turn(&trunk()).unwrap();
    assert_eq!(report.start, Coord::turn_start(1));
    assert_eq!(engine.incomplete_turns(), vec![(trunk(), 1)]);
}

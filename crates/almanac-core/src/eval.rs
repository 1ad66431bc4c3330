//! Expression evaluation for triggers and action steps.
//!
//! An [`Evaluator`] walks an [`Expr`] tree against a subject entity, reading
//! facts through a [`Facts`] source. Triggers read the turn-start snapshot;
//! actions read live state plus their own staged writes. The evaluator never
//! writes.
//!
//! Arithmetic is checked: integer overflow, division by zero and non-finite
//! float results are faults, never wrapped or saturated values. Integers and
//! floats do not mix implicitly.

use std::cmp::Ordering;
use std::num::FpCategory;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use almanac_graph::GraphError;
use almanac_types::{EntityId, Expr, RuleId, Value};

/// A fault raised while evaluating an expression.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Reading a fact failed.
    #[error("read failed: {0}")]
    Read(#[from] GraphError),

    /// An operand had the wrong type.
    #[error("{op}: unsupported operand types {found}")]
    TypeMismatch {
        /// Operator name.
        op: &'static str,
        /// Operand type names.
        found: String,
    },

    /// An operand read an unset key.
    #[error("{op}: operand is unset")]
    Unset {
        /// Operator name.
        op: &'static str,
    },

    /// The result does not fit.
    #[error("{op}: overflow")]
    Overflow {
        /// Operator name.
        op: &'static str,
    },

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A `chance` probability outside `[0, 1]`.
    #[error("probability {0:?} is outside [0, 1]")]
    Probability(Value),

    /// A `roll` with no sides.
    #[error("die needs a positive number of sides, got {0}")]
    Sides(i64),
}

/// Read access to facts for the evaluator.
pub trait Facts {
    /// Current value of (entity, key) from this source's point of view.
    fn fact(&self, entity: &EntityId, key: &str) -> Result<Option<Value>, GraphError>;
}

/// The per-(subject, rule) random stream for `turn`.
///
/// Derived from the universal `seed` fact through SHA-256, so it depends only
/// on journaled state and replays identically. The branch name is not mixed
/// in: a fork draws the same numbers its parent would have drawn.
pub fn rule_rng(seed: i64, turn: u64, subject: &EntityId, rule: &RuleId) -> ChaCha8Rng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(turn.to_le_bytes());
    hasher.update(subject.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(rule.as_str().as_bytes());
    ChaCha8Rng::from_seed(hasher.finalize().into())
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

impl Arith {
    const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
        }
    }
}

fn mismatch(op: &'static str, a: &Value, b: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op,
        found: format!("{} and {}", a.type_name(), b.type_name()),
    }
}

fn arith(op: Arith, a: Value, b: Value) -> Result<Value, EvalError> {
    let name = op.name();
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            let result = match op {
                Arith::Add => x.checked_add(y),
                Arith::Sub => x.checked_sub(y),
                Arith::Mul => x.checked_mul(y),
                Arith::Div if y == 0 => return Err(EvalError::DivisionByZero),
                Arith::Div => x.checked_div(y),
            };
            result.map(Value::Int).ok_or(EvalError::Overflow { op: name })
        }
        (Value::Float(x), Value::Float(y)) => {
            let result = match op {
                Arith::Add => x + y,
                Arith::Sub => x - y,
                Arith::Mul => x * y,
                Arith::Div if y.classify() == FpCategory::Zero => {
                    return Err(EvalError::DivisionByZero);
                }
                Arith::Div => x / y,
            };
            if result.is_finite() {
                Ok(Value::Float(result))
            } else {
                Err(EvalError::Overflow { op: name })
            }
        }
        (Value::Str(mut x), Value::Str(y)) if matches!(op, Arith::Add) => {
            x.push_str(&y);
            Ok(Value::Str(x))
        }
        (a, b) => Err(mismatch(name, &a, &b)),
    }
}

fn compare(op: &'static str, a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).ok_or_else(|| mismatch(op, a, b)),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(mismatch(op, a, b)),
    }
}

fn need(value: Option<Value>, op: &'static str) -> Result<Value, EvalError> {
    value.ok_or(EvalError::Unset { op })
}

fn need_bool(value: Option<Value>, op: &'static str) -> Result<bool, EvalError> {
    match value {
        Some(Value::Bool(b)) => Ok(b),
        Some(other) => Err(EvalError::TypeMismatch {
            op,
            found: other.type_name().to_owned(),
        }),
        None => Err(EvalError::Unset { op }),
    }
}

/// Evaluates expressions for one subject entity.
pub struct Evaluator<'a, F: Facts + ?Sized> {
    facts: &'a F,
    subject: &'a EntityId,
    turn: u64,
    rng: &'a mut ChaCha8Rng,
}

impl<'a, F: Facts + ?Sized> Evaluator<'a, F> {
    /// An evaluator reading `facts`, with `get` resolving against `subject`.
    pub const fn new(facts: &'a F, subject: &'a EntityId, turn: u64, rng: &'a mut ChaCha8Rng) -> Self {
        Self {
            facts,
            subject,
            turn,
            rng,
        }
    }

    /// Evaluate a trigger: the expression must produce a bool.
    pub fn eval_bool(&mut self, expr: &Expr) -> Result<bool, EvalError> {
        let value = self.eval(expr)?;
        need_bool(value, "trigger")
    }

    /// Evaluate `expr`. `None` means the expression read an unset key.
    pub fn eval(&mut self, expr: &Expr) -> Result<Option<Value>, EvalError> {
        Ok(match expr {
            Expr::Lit { value } => Some(value.clone()),
            Expr::Get { key } => self.facts.fact(self.subject, key)?,
            Expr::GetOf { entity, key } => self.facts.fact(entity, key)?,
            Expr::IsSet { key } => Some(Value::Bool(self.facts.fact(self.subject, key)?.is_some())),
            Expr::Turn => Some(Value::Int(
                i64::try_from(self.turn).map_err(|_overflow| EvalError::Overflow { op: "turn" })?,
            )),
            Expr::Add { a, b } => Some(self.arith(Arith::Add, a, b)?),
            Expr::Sub { a, b } => Some(self.arith(Arith::Sub, a, b)?),
            Expr::Mul { a, b } => Some(self.arith(Arith::Mul, a, b)?),
            Expr::Div { a, b } => Some(self.arith(Arith::Div, a, b)?),
            Expr::Lt { a, b } => Some(Value::Bool(self.compare("lt", a, b)?.is_lt())),
            Expr::Le { a, b } => Some(Value::Bool(self.compare("le", a, b)?.is_le())),
            Expr::Gt { a, b } => Some(Value::Bool(self.compare("gt", a, b)?.is_gt())),
            Expr::Ge { a, b } => Some(Value::Bool(self.compare("ge", a, b)?.is_ge())),
            Expr::Eq { a, b } => Some(Value::Bool(self.eval(a)? == self.eval(b)?)),
            Expr::Ne { a, b } => Some(Value::Bool(self.eval(a)? != self.eval(b)?)),
            Expr::And { all } => {
                for operand in all {
                    if !need_bool(self.eval(operand)?, "and")? {
                        return Ok(Some(Value::Bool(false)));
                    }
                }
                Some(Value::Bool(true))
            }
            Expr::Or { any } => {
                for operand in any {
                    if need_bool(self.eval(operand)?, "or")? {
                        return Ok(Some(Value::Bool(true)));
                    }
                }
                Some(Value::Bool(false))
            }
            Expr::Not { a } => Some(Value::Bool(!need_bool(self.eval(a)?, "not")?)),
            Expr::Chance { probability } => {
                let p = need(self.eval(probability)?, "chance")?;
                Some(Value::Bool(self.chance(p)?))
            }
            Expr::Roll { sides } => match need(self.eval(sides)?, "roll")? {
                Value::Int(n) if n > 0 => Some(Value::Int(self.rng.random_range(1..=n))),
                Value::Int(n) => return Err(EvalError::Sides(n)),
                other => {
                    return Err(EvalError::TypeMismatch {
                        op: "roll",
                        found: other.type_name().to_owned(),
                    });
                }
            },
        })
    }

    fn arith(&mut self, op: Arith, a: &Expr, b: &Expr) -> Result<Value, EvalError> {
        let a = need(self.eval(a)?, op.name())?;
        let b = need(self.eval(b)?, op.name())?;
        arith(op, a, b)
    }

    fn compare(&mut self, op: &'static str, a: &Expr, b: &Expr) -> Result<Ordering, EvalError> {
        let a = need(self.eval(a)?, op)?;
        let b = need(self.eval(b)?, op)?;
        compare(op, &a, &b)
    }

    fn chance(&mut self, p: Value) -> Result<bool, EvalError> {
        match p {
            Value::Float(p) if (0.0..=1.0).contains(&p) => Ok(self.rng.random_bool(p)),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            Value::Float(_) | Value::Int(_) => Err(EvalError::Probability(p)),
            other => Err(EvalError::TypeMismatch {
                op: "chance",
                found: other.type_name().to_owned(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct MapFacts(HashMap<(EntityId, String), Value>);

    impl MapFacts {
        fn with(mut self, entity: &EntityId, key: &str, value: impl Into<Value>) -> Self {
            self.0.insert((entity.clone(), key.to_owned()), value.into());
            self
        }
    }

    impl Facts for MapFacts {
        fn fact(&self, entity: &EntityId, key: &str) -> Result<Option<Value>, GraphError> {
            Ok(self.0.get(&(entity.clone(), key.to_owned())).cloned())
        }
    }

    fn rng() -> ChaCha8Rng {
        rule_rng(0, 1, &EntityId::node("home"), &RuleId::new("r"))
    }

    fn eval(facts: &MapFacts, expr: &Expr) -> Result<Option<Value>, EvalError> {
        let home = EntityId::node("home");
        let mut rng = rng();
        Evaluator::new(facts, &home, 3, &mut rng).eval(expr)
    }

    #[test]
    fn arithmetic_and_comparison() {
        let home = EntityId::node("home");
        let facts = MapFacts::default().with(&home, "mood", 4i64);
        let expr = Expr::gt(Expr::add(Expr::get("mood"), Expr::lit(1i64)), Expr::Turn);
        assert_eq!(eval(&facts, &expr).unwrap(), Some(Value::Bool(true)));
        let halved = Expr::div(Expr::lit(7i64), Expr::lit(2i64));
        assert_eq!(eval(&facts, &halved).unwrap(), Some(Value::Int(3)));
    }

    #[test]
    fn overflow_and_division_faults() {
        let facts = MapFacts::default();
        let overflow = Expr::add(Expr::lit(i64::MAX), Expr::lit(1i64));
        assert!(matches!(eval(&facts, &overflow), Err(EvalError::Overflow { op: "add" })));
        let by_zero = Expr::div(Expr::lit(1i64), Expr::lit(0i64));
        assert!(matches!(eval(&facts, &by_zero), Err(EvalError::DivisionByZero)));
        let min_div = Expr::div(Expr::lit(i64::MIN), Expr::lit(-1i64));
        assert!(matches!(eval(&facts, &min_div), Err(EvalError::Overflow { .. })));
        let float_zero = Expr::div(Expr::lit(1.5), Expr::lit(0.0));
        assert!(matches!(eval(&facts, &float_zero), Err(EvalError::DivisionByZero)));
    }

    #[test]
    fn type_and_unset_faults() {
        let facts = MapFacts::default();
        let mixed = Expr::add(Expr::lit(1i64), Expr::lit(1.0));
        assert!(matches!(eval(&facts, &mixed), Err(EvalError::TypeMismatch { .. })));
        let unset = Expr::sub(Expr::get("hunger"), Expr::lit(1i64));
        assert!(matches!(eval(&facts, &unset), Err(EvalError::Unset { op: "sub" })));
        // equality tolerates unset operands
        let eq = Expr::eq(Expr::get("hunger"), Expr::lit(1i64));
        assert_eq!(eval(&facts, &eq).unwrap(), Some(Value::Bool(false)));
    }

    #[test]
    fn boolean_operators_short_circuit() {
        let facts = MapFacts::default();
        let and = Expr::And {
            all: vec![Expr::lit(false), Expr::div(Expr::lit(1i64), Expr::lit(0i64))],
        };
        assert_eq!(eval(&facts, &and).unwrap(), Some(Value::Bool(false)));
        let or = Expr::Or {
            any: vec![Expr::lit(true), Expr::lit(3i64)],
        };
        assert_eq!(eval(&facts, &or).unwrap(), Some(Value::Bool(true)));
        let bad = Expr::not(Expr::lit("yes"));
        assert!(eval(&facts, &bad).is_err());
    }

    #[test]
    fn get_of_and_is_set() {
        let alice = EntityId::character("alice");
        let facts = MapFacts::default().with(&alice, "name", "Alice");
        let expr = Expr::add(Expr::get_of(alice, "name"), Expr::lit("!"));
        assert_eq!(eval(&facts, &expr).unwrap(), Some(Value::from("Alice!")));
        let is_set = Expr::IsSet { key: "name".into() };
        assert_eq!(eval(&facts, &is_set).unwrap(), Some(Value::Bool(false)));
    }

    #[test]
    fn dice_are_deterministic_and_bounded() {
        let facts = MapFacts::default();
        let roll = Expr::roll(Expr::lit(6i64));
        let home = EntityId::node("home");
        let draws = |seed| {
            let mut rng = rule_rng(seed, 1, &home, &RuleId::new("r"));
            let mut eval = Evaluator::new(&facts, &home, 1, &mut rng);
            (0..20)
                .map(|_| eval.eval(&roll).unwrap().and_then(|v| v.as_int()).unwrap())
                .collect::<Vec<_>>()
        };
        let first = draws(7);
        assert_eq!(first, draws(7));
        assert!(first.iter().all(|n| (1..=6).contains(n)));
        assert_ne!(first, draws(8));
    }

    #[test]
    fn chance_validates_probability() {
        let facts = MapFacts::default();
        assert_eq!(
            eval(&facts, &Expr::chance(Expr::lit(1i64))).unwrap(),
            Some(Value::Bool(true))
        );
        assert!(matches!(
            eval(&facts, &Expr::chance(Expr::lit(1.5))),
            Err(EvalError::Probability(_))
        ));
        assert!(matches!(
            eval(&facts, &Expr::roll(Expr::lit(0i64))),
            Err(EvalError::Sides(0))
        ));
    }

    #[test]
    fn trigger_must_be_bool() {
        let facts = MapFacts::default();
        let home = EntityId::node("home");
        let mut rng = rng();
        let mut eval = Evaluator::new(&facts, &home, 1, &mut rng);
        assert!(eval.eval_bool(&Expr::lit(true)).unwrap());
        assert!(eval.eval_bool(&Expr::lit(1i64)).is_err());
        assert!(eval.eval_bool(&Expr::get("missing")).is_err());
    }
}

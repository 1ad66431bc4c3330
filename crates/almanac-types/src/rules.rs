//! Rule-engine definitions.
//!
//! Triggers and actions are data: an [`Expr`] tree for a trigger, an ordered
//! list of [`ActionStep`]s for an action. They are journaled as [`Value`]s
//! so definition edits are versioned exactly like facts, and converted back
//! with [`Expr::from_value`] / [`ActionStep::list_from_value`] at turn start.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::entity::EntityId;
use crate::ids::{ActionId, TriggerId};
use crate::value::Value;

/// Error converting between a definition and its journaled [`Value`] form.
#[derive(Debug, thiserror::Error)]
#[error("malformed definition: {source}")]
pub struct DefinitionError {
    /// Underlying JSON conversion error.
    #[from]
    pub source: serde_json::Error,
}

fn to_value<T: Serialize>(def: &T) -> Result<Value, DefinitionError> {
    Ok(serde_json::from_value(serde_json::to_value(def)?)?)
}

fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, DefinitionError> {
    Ok(serde_json::from_value(serde_json::to_value(value)?)?)
}

// ---------------------------------------------------------------------------
// Expr
// ---------------------------------------------------------------------------

/// An expression evaluated against a subject entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "op", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Expr {
    /// A literal value.
    Lit {
        /// The value.
        value: Value,
    },
    /// An attribute of the subject entity.
    Get {
        /// Attribute key.
        key: String,
    },
    /// An attribute of another entity.
    GetOf {
        /// Entity to read.
        #[ts(as = "String")]
        entity: EntityId,
        /// Attribute key.
        key: String,
    },
    /// Whether the subject has a value for `key`.
    IsSet {
        /// Attribute key.
        key: String,
    },
    /// The current turn number.
    Turn,
    /// Sum.
    Add {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Difference.
    Sub {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Product.
    Mul {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Quotient; integer division truncates.
    Div {
        /// Dividend.
        a: Box<Expr>,
        /// Divisor.
        b: Box<Expr>,
    },
    /// `a < b`.
    Lt {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// `a <= b`.
    Le {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// `a > b`.
    Gt {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// `a >= b`.
    Ge {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// `a == b`.
    Eq {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// `a != b`.
    Ne {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// True when every operand is true (short-circuits).
    And {
        /// Operands.
        all: Vec<Expr>,
    },
    /// True when any operand is true (short-circuits).
    Or {
        /// Operands.
        any: Vec<Expr>,
    },
    /// Boolean negation.
    Not {
        /// Operand.
        a: Box<Expr>,
    },
    /// True with the given probability, drawn from the versioned seed.
    Chance {
        /// Probability in `[0, 1]`.
        probability: Box<Expr>,
    },
    /// A die roll in `1..=sides`, drawn from the versioned seed.
    Roll {
        /// Number of sides, positive.
        sides: Box<Expr>,
    },
}

macro_rules! binary_ctor {
    ($($(#[$meta:meta])* $fn_name:ident => $variant:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            pub fn $fn_name(a: Self, b: Self) -> Self {
                Self::$variant {
                    a: Box::new(a),
                    b: Box::new(b),
                }
            }
        )*
    };
}

impl Expr {
    /// A literal.
    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Lit {
            value: value.into(),
        }
    }

    /// An attribute of the subject.
    pub fn get(key: impl Into<String>) -> Self {
        Self::Get { key: key.into() }
    }

    /// An attribute of another entity.
    pub fn get_of(entity: EntityId, key: impl Into<String>) -> Self {
        Self::GetOf {
            entity,
            key: key.into(),
        }
    }

    /// Boolean negation.
    pub fn not(a: Self) -> Self {
        Self::Not { a: Box::new(a) }
    }

    /// Seeded coin with the given probability.
    pub fn chance(probability: Self) -> Self {
        Self::Chance {
            probability: Box::new(probability),
        }
    }

    /// Seeded die roll.
    pub fn roll(sides: Self) -> Self {
        Self::Roll {
            sides: Box::new(sides),
        }
    }

    binary_ctor! {
        /// `a + b`.
        add => Add,
        /// `a - b`.
        sub => Sub,
        /// `a * b`.
        mul => Mul,
        /// `a / b`.
        div => Div,
        /// `a < b`.
        lt => Lt,
        /// `a <= b`.
        le => Le,
        /// `a > b`.
        gt => Gt,
        /// `a >= b`.
        ge => Ge,
        /// `a == b`.
        eq => Eq,
        /// `a != b`.
        ne => Ne,
    }

    /// Journaled form of the expression.
    pub fn to_value(&self) -> Result<Value, DefinitionError> {
        to_value(self)
    }

    /// Parse a journaled expression.
    pub fn from_value(value: &Value) -> Result<Self, DefinitionError> {
        from_value(value)
    }
}

// ---------------------------------------------------------------------------
// ActionStep
// ---------------------------------------------------------------------------

/// One mutation performed by an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "op", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ActionStep {
    /// Set an attribute of the subject entity.
    Set {
        /// Attribute key.
        key: String,
        /// New value.
        value: Expr,
    },
    /// Set an attribute of another entity.
    SetOn {
        /// Target entity.
        #[ts(as = "String")]
        entity: EntityId,
        /// Attribute key.
        key: String,
        /// New value.
        value: Expr,
    },
    /// Delete an attribute of the subject entity.
    Delete {
        /// Attribute key.
        key: String,
    },
}

impl ActionStep {
    /// Set `key` on the subject.
    pub fn set(key: impl Into<String>, value: Expr) -> Self {
        Self::Set {
            key: key.into(),
            value,
        }
    }

    /// Journaled form of a step list.
    pub fn list_to_value(steps: &[Self]) -> Result<Value, DefinitionError> {
        to_value(&steps)
    }

    /// Parse a journaled step list.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, DefinitionError> {
        from_value(value)
    }
}

// ---------------------------------------------------------------------------
// Rule edits
// ---------------------------------------------------------------------------

/// An edit to a rule definition.
///
/// Unset fields keep their current definition. A new rule needs a trigger;
/// its action list defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RuleEdit {
    /// New trigger reference.
    #[serde(default)]
    pub trigger: Option<TriggerId>,
    /// New ordered action references.
    #[serde(default)]
    pub actions: Option<Vec<ActionId>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn expr_survives_journal_form() {
        let expr = Expr::lt(Expr::get("mood"), Expr::lit(5_i64));
        let value = expr.to_value().unwrap();
        assert!(matches!(value, Value::Map(_)));
        assert_eq!(Expr::from_value(&value).unwrap(), expr);
    }

    #[test]
    fn float_literals_stay_floats() {
        let expr = Expr::chance(Expr::lit(0.5));
        let back = Expr::from_value(&expr.to_value().unwrap()).unwrap();
        assert_eq!(back, expr);
    }

    #[test]
    fn malformed_steps_are_rejected() {
        let bogus = Value::List(vec![Value::from("nope")]);
        assert!(ActionStep::list_from_value(&bogus).is_err());
    }
}

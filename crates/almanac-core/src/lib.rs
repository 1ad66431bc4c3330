//! Rule engine, turn cycle and orchestration for the Almanac world engine.
//!
//! This crate owns the turn cycle that drives a branch forward: advance the
//! clock, plan each live entity's rulebook, evaluate triggers against the
//! turn-start snapshot, run the actions of the rules that fire, and close the
//! turn.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `almanac-config.yaml` into
//!   strongly-typed structs, with environment overrides.
//! - [`definitions`] -- Resolving rulebooks, rules, triggers and actions as
//!   of a coordinate.
//! - [`engine`] -- [`Engine`]: shared store access, branch locks, the halt
//!   flag and turn listeners.
//! - [`error`] -- [`EngineError`].
//! - [`eval`] -- Expression evaluation with seeded randomness.
//! - [`operator`] -- Autoplay control state.
//! - [`runner`] -- The autoplay loop.
//! - [`session`] -- Session handles pairing a client with a branch.
//! - [`turn`] -- The rule pass itself.

pub mod config;
pub mod definitions;
pub mod engine;
pub mod error;
pub mod eval;
pub mod operator;
pub mod runner;
pub mod session;
pub mod turn;

pub use engine::{Engine, TurnListener};
pub use error::EngineError;
pub use session::{Session, SessionInfo, SessionRegistry};

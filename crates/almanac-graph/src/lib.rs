//! Versioned world graph for the Almanac temporal world engine.
//!
//! The graph store reconstructs typed state from the journal: characters,
//! their nodes and edges, and arbitrary attribute facts on any entity, all
//! read as of a (branch, turn, tick) coordinate. It owns the write path to
//! the journal and keeps a per-branch [`FactCache`] coherent with it.
//!
//! # Modules
//!
//! - [`store`] -- The [`GraphStore`]: cached reads, validated writes
//! - [`structure`] -- Entity lifecycle and structural fact validation
//! - [`cache`] -- Per-branch memoization of fact reads
//! - [`error`] -- [`GraphError`]

pub mod cache;
pub mod error;
pub mod store;
pub mod structure;

pub use cache::{CacheStats, FactCache};
pub use error::GraphError;
pub use store::{DEFAULT_CACHE_CAPACITY, GraphStore};

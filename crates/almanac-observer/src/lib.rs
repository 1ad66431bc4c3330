//! Boundary API server for the Almanac engine.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **REST endpoints** for reading facts at any coordinate, writing and
//!   deleting facts, creating and deleting graph entities, defining rules,
//!   forking branches and advancing turns
//! - **Session endpoints** that hand out explicit (client, branch) handles
//! - **`WebSocket` endpoint** (`/ws/turns`) streaming every completed turn
//!   via [`tokio::sync::broadcast`]
//! - **Autoplay endpoints** for pausing, resuming, pacing and stopping the
//!   autoplay runner
//!
//! # Errors at the boundary
//!
//! Every engine error carries a kind (`validation`, `concurrency`,
//! `branch_conflict`, `durability`) that maps to an HTTP status; see
//! [`error`]. A durability failure also raises the shutdown signal in
//! [`AppState`], which stops the server gracefully.

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::spawn_observer;
pub use state::AppState;

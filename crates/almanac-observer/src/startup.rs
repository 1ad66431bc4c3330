//! Spawning the boundary server next to the engine.
//!
//! The engine binary calls [`spawn_observer`] during startup so the API runs
//! concurrently with autoplay.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Bind the listener, then serve on a background task.
///
/// Binding happens before the task is spawned, so a port already in use is
/// reported here rather than logged later.
pub async fn spawn_observer(config: &ServerConfig, state: Arc<AppState>) -> Result<JoinHandle<()>, ServerError> {
    let listener = server::bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            tracing::error!(error = %e, "Boundary server exited with error");
        }
    });

    tracing::info!(port = config.port, "Boundary server spawned on background task");

    Ok(handle)
}

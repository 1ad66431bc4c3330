//! Shared application state for the boundary API server.
//!
//! [`AppState`] holds the engine handle, the session table, the broadcast
//! channel for turn reports, optional autoplay controls, and the shutdown
//! signal raised on a durability failure.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::error;

use almanac_core::operator::AutoplayOperator;
use almanac_core::{Engine, EngineError, SessionRegistry, TurnListener};
use almanac_types::{BranchId, ErrorKind, SessionId, TurnReport};

use crate::error::ObserverError;

/// Capacity of the broadcast channel for turn reports.
///
/// A subscriber that falls behind by more than this many messages receives
/// [`broadcast::error::RecvError::Lagged`] and skips to the newest one.
const BROADCAST_CAPACITY: usize = 256;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The engine every handler calls into.
    pub engine: Arc<Engine>,
    /// Open session handles.
    pub sessions: Arc<SessionRegistry>,
    /// Broadcast sender for completed turn reports.
    pub tx: broadcast::Sender<TurnReport>,
    /// Autoplay controls (present when autoplay is running).
    pub autoplay: Option<Arc<AutoplayOperator>>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Forwards engine turn reports into the broadcast channel.
#[derive(Debug)]
struct TurnFeed {
    tx: broadcast::Sender<TurnReport>,
}

impl TurnListener for TurnFeed {
    fn on_turn(&self, report: &TurnReport) {
        // send only fails when no client is connected
        let _ = self.tx.send(report.clone());
    }
}

impl AppState {
    /// Create state around `engine` and subscribe the turn feed to it.
    pub fn new(engine: Arc<Engine>) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        engine.subscribe(Arc::new(TurnFeed { tx: tx.clone() }));
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            sessions: Arc::new(SessionRegistry::new()),
            tx,
            autoplay: None,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Attach autoplay controls.
    #[must_use]
    pub fn with_autoplay(mut self, operator: Arc<AutoplayOperator>) -> Self {
        self.autoplay = Some(operator);
        self
    }

    /// Subscribe to the turn report channel.
    pub fn subscribe(&self) -> broadcast::Receiver<TurnReport> {
        self.tx.subscribe()
    }

    /// Ask the process to shut down.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Receiver that flips to `true` once shutdown is requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Autoplay controls, or [`ObserverError::NoAutoplay`].
    pub fn autoplay(&self) -> Result<&Arc<AutoplayOperator>, ObserverError> {
        self.autoplay.as_ref().ok_or(ObserverError::NoAutoplay)
    }

    /// Run an engine call on the blocking pool.
    ///
    /// A durability failure requests process shutdown before the error is
    /// returned to the client.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, ObserverError>
    where
        F: FnOnce(&Engine, &SessionRegistry) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let sessions = Arc::clone(&self.sessions);
        let result = tokio::task::spawn_blocking(move || f(&engine, &sessions))
            .await
            .map_err(|e| ObserverError::Internal(format!("engine task failed: {e}")))?;
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Durability {
                error!(error = %e, "durability failure at the boundary, requesting shutdown");
                self.request_shutdown();
            }
        }
        Ok(result?)
    }

    /// The branch a request targets: an explicit branch wins, otherwise the
    /// session's branch.
    pub fn target(&self, branch: Option<BranchId>, session: Option<SessionId>) -> Result<BranchId, ObserverError> {
        match (branch, session) {
            (Some(branch), _) => Ok(branch),
            (None, Some(id)) => Ok(self.sessions.get(id)?.branch),
            (None, None) => Err(ObserverError::InvalidQuery(
                "either branch or session is required".to_owned(),
            )),
        }
    }
}

//! Operator endpoints for the autoplay runner.
//!
//! Present only when the process runs autoplay; otherwise every handler
//! answers `409` with kind `no_autoplay`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/autoplay/pause` | Pause after the turn in progress |
//! | `POST` | `/api/autoplay/resume` | Resume |
//! | `POST` | `/api/autoplay/speed` | Set the interval between turns (ms) |
//! | `GET` | `/api/autoplay/status` | Current autoplay status |
//! | `POST` | `/api/autoplay/stop` | Stop autoplay cleanly |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use almanac_core::operator::MIN_INTERVAL_MS;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/autoplay/speed`.
#[derive(Debug, serde::Deserialize)]
pub struct SetSpeedRequest {
    /// New interval between turns in milliseconds.
    pub interval_ms: u64,
}

#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    ok: bool,
    message: String,
}

impl OperatorResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            ok: true,
            message: message.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Pause autoplay. The turn in progress finishes first.
pub async fn pause(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    state.autoplay()?.pause();
    Ok(OperatorResponse::ok("Autoplay paused"))
}

/// Resume autoplay after a pause.
pub async fn resume(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    state.autoplay()?.resume();
    Ok(OperatorResponse::ok("Autoplay resumed"))
}

/// Change the interval between autoplay turns.
pub async fn set_speed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetSpeedRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let previous = state
        .autoplay()?
        .set_interval_ms(body.interval_ms)
        .ok_or_else(|| {
            ObserverError::InvalidQuery(format!("interval_ms must be at least {MIN_INTERVAL_MS}"))
        })?;
    Ok(OperatorResponse::ok(format!(
        "Interval changed from {previous}ms to {}ms",
        body.interval_ms
    )))
}

/// Current autoplay status.
pub async fn status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    Ok(Json(state.autoplay()?.status()))
}

/// Stop autoplay after the turn in progress.
pub async fn stop(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    state.autoplay()?.request_stop();
    Ok(OperatorResponse::ok("Autoplay stop requested"))
}

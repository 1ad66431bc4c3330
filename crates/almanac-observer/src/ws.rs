//! `WebSocket` stream of completed turns.
//!
//! Clients connect to `GET /ws/turns` and receive a JSON-encoded
//! [`TurnReport`](almanac_types::TurnReport) each time any branch finishes a
//! turn. A client that falls behind skips ahead to the newest report.
//! Clients never write through this socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade to a `WebSocket` and stream turn reports.
///
/// # Route
///
/// `GET /ws/turns`
pub async fn ws_turns(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    let mut rx = state.subscribe();
    let mut shutdown = state.shutdown_signal();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(report) => {
                        let json = match serde_json::to_string(&report) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize turn report: {e}");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Turn feed closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
            _ = shutdown.changed() => {
                let _ = sender.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

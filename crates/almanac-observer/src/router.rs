//! Axum router construction for the boundary API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin tools.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// See [`handlers`] and [`operator`] for the endpoint tables. CORS allows any
/// origin; the server is meant to sit behind whatever the deployment puts in
/// front of it.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        // WebSocket
        .route("/ws/turns", get(ws::ws_turns))
        // Branches and turns
        .route(
            "/api/branches",
            get(handlers::list_branches).post(handlers::fork_branch),
        )
        .route("/api/branches/{branch}", get(handlers::get_branch))
        .route("/api/branches/{branch}/advance", post(handlers::advance_turn))
        .route("/api/branches/{branch}/restart", post(handlers::restart_turn))
        // Facts and entities
        .route("/api/read", get(handlers::read))
        .route("/api/history", get(handlers::history))
        .route("/api/write", post(handlers::write))
        .route(
            "/api/entities",
            get(handlers::list_entities)
                .post(handlers::create_entity)
                .delete(handlers::delete_entity),
        )
        // Definitions
        .route("/api/rules/{id}", put(handlers::put_rule))
        .route("/api/rulebooks/{id}", put(handlers::put_rulebook))
        .route(
            "/api/rulebooks/{id}/rules/{rule}/active",
            put(handlers::put_rule_active),
        )
        .route("/api/triggers/{id}", put(handlers::put_trigger))
        .route("/api/actions/{id}", put(handlers::put_action))
        .route("/api/attachments", put(handlers::put_attachment))
        .route("/api/defaults/{kind}", put(handlers::put_default_rulebook))
        // Sessions
        .route("/api/sessions", post(handlers::open_session))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session).delete(handlers::close_session),
        )
        .route("/api/sessions/{id}/branch", put(handlers::checkout_session))
        // Autoplay
        .route("/api/autoplay/pause", post(operator::pause))
        .route("/api/autoplay/resume", post(operator::resume))
        .route("/api/autoplay/speed", post(operator::set_speed))
        .route("/api/autoplay/status", get(operator::status))
        .route("/api/autoplay/stop", post(operator::stop))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

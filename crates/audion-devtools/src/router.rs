//! Router assembly for the audion devtools server.
//!
//! [`build_router`] wires the panel socket and the HTTP handlers to their
//! routes with CORS and tracing middleware layers.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the complete axum router.
///
/// Routes use axum 0.8 `/{param}` path syntax. CORS is permissive so a
/// render surface can be served from any origin.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Render surfaces
        .route("/panel/ws", get(handlers::panels::panel_socket))
        .route("/panels", get(handlers::panels::list_panels))
        // Graph snapshots
        .route("/graphs", get(handlers::graphs::all_graphs))
        .route("/graphs/{id}", get(handlers::graphs::get_graph))
        // Debugger
        .route("/debugger/status", get(handlers::debugger::status))
        .route("/debugger/attach", post(handlers::debugger::grant_attach))
        .route(
            "/debugger/collect-garbage",
            post(handlers::debugger::collect_garbage),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! Debugger attachment handlers.

use axum::extract::State;
use axum::Json;
use tracing::info;

use crate::error::ApiError;
use crate::panel::collect_garbage as request_collection;
use crate::schema::debugger::{DebuggerStatusResponse, GrantResponse};
use crate::state::AppState;

/// `GET /debugger/status`
pub async fn status(State(state): State<AppState>) -> Json<DebuggerStatusResponse> {
    Json(DebuggerStatusResponse {
        attach: state.controller.status(),
        pipeline_running: state.hub.is_running(),
        subscribers: state.hub.subscriber_count(),
        missed_updates: state.hub.missed_updates(),
        contexts: state.hub.all_graphs().len(),
    })
}

/// `POST /debugger/attach`
///
/// Grants temporary attach permission, also after the user canceled a
/// previous session. Attaching itself still waits for interest.
pub async fn grant_attach(State(state): State<AppState>) -> Json<GrantResponse> {
    let granted = state.controller.grant_temporary();
    if granted {
        info!("temporary attach permission granted over HTTP");
    }
    Json(GrantResponse {
        granted,
        permission: state.controller.permission(),
    })
}

/// `POST /debugger/collect-garbage`
pub async fn collect_garbage(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    request_collection(&state.controller).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

//! Graph snapshot handlers.

use axum::extract::{Path, State};
use axum::Json;

use audion_transfer::{DevtoolsMessage, SerializedGraphContext};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /graphs`
///
/// Answers with the same `{"allGraphs": {...}}` message a panel receives.
/// Empty unless a panel keeps the pipeline running.
pub async fn all_graphs(State(state): State<AppState>) -> Json<DevtoolsMessage> {
    Json(DevtoolsMessage::AllGraphs(state.hub.all_graphs()))
}

/// `GET /graphs/{id}`
pub async fn get_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SerializedGraphContext>, ApiError> {
    state
        .hub
        .graph(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("graph context {} not found", id)))
}

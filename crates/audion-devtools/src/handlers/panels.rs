//! Render surface handlers.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;

use crate::panel::run_panel;
use crate::schema::panels::{ListPanelsResponse, PanelQuery, PanelView};
use crate::state::AppState;

/// `GET /panel/ws`
pub async fn panel_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<PanelQuery>,
) -> Response {
    ws.on_upgrade(move |socket| run_panel(socket, state, query.layout))
}

/// `GET /panels`
pub async fn list_panels(State(state): State<AppState>) -> Json<ListPanelsResponse> {
    let mut panels = state
        .panels
        .list()
        .into_iter()
        .map(|info| PanelView {
            panel_id: info.id.0,
            visible: info.visible,
            layout: info.layout,
            connected_secs: info.connected_at.elapsed().as_secs(),
        })
        .collect::<Vec<_>>();
    panels.sort_by_key(|p| p.panel_id);

    Json(ListPanelsResponse {
        visible: state.panels.visible_count(),
        panels,
    })
}

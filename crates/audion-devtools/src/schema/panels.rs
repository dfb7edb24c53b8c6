//! Schema types for render surface endpoints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query string of `GET /panel/ws`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PanelQuery {
    /// Route updates through a per-panel layout worker.
    #[serde(default)]
    pub layout: bool,
}

/// View of a connected panel for listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    pub panel_id: Uuid,
    pub visible: bool,
    pub layout: bool,
    /// Seconds since the panel connected.
    pub connected_secs: u64,
}

/// Response for `GET /panels`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPanelsResponse {
    pub panels: Vec<PanelView>,
    pub visible: usize,
}

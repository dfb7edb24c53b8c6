//! Schema types for the debugger endpoints.

use serde::Serialize;

use crate::attach::{AttachStatus, Permission};

/// Response for `GET /debugger/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebuggerStatusResponse {
    /// Attach permission, session state and interest counts.
    pub attach: AttachStatus,
    /// Whether the graph pipeline is running.
    pub pipeline_running: bool,
    /// Hub subscribers (one per connected panel).
    pub subscribers: usize,
    /// Whether the running pipeline has reported missed updates.
    pub missed_updates: bool,
    /// Number of graph contexts currently known.
    pub contexts: usize,
}

/// Response for `POST /debugger/attach`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResponse {
    /// False when permission was already granted.
    pub granted: bool,
    pub permission: Permission,
}

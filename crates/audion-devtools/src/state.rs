//! Application state shared by the HTTP handlers and panel sessions.
//!
//! Everything inside [`AppState`] is already synchronized on its own
//! (`parking_lot` locks and `DashMap`, never held across `.await`), so the
//! state is a plain bundle of `Arc`s that clones cheaply into every handler.

use std::sync::Arc;

use audion_core::{LayeredLayout, LayoutEngine};

use crate::attach::AttachController;
use crate::config::{DevtoolsConfig, PipelineConfig};
use crate::debugger::{CdpDebugger, Debugger, InMemoryDebugger};
use crate::hub::GraphHub;
use crate::panel::PanelRegistry;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// Sole owner of the debugger attachment.
    pub controller: Arc<AttachController>,
    /// Pipeline runner and all-graphs cache.
    pub hub: Arc<GraphHub>,
    /// Connected render surfaces.
    pub panels: Arc<PanelRegistry>,
    /// Engine used by the per-panel layout workers.
    pub layout_engine: Arc<dyn LayoutEngine>,
}

impl AppState {
    /// Creates the state around an existing debugger connection.
    pub fn new(debugger: Arc<dyn Debugger>, pipeline: PipelineConfig) -> Self {
        let controller = AttachController::new(debugger);
        let hub = GraphHub::new(Arc::clone(&controller), pipeline);
        AppState {
            controller,
            hub,
            panels: Arc::new(PanelRegistry::new()),
            layout_engine: Arc::new(LayeredLayout),
        }
    }

    /// Creates the state for a page target reachable over CDP.
    pub fn connect(config: &DevtoolsConfig) -> Self {
        let debugger = CdpDebugger::new(config.debugger_url.clone());
        AppState::new(Arc::new(debugger), config.pipeline)
    }

    /// Creates the state around an [`InMemoryDebugger`] (for testing).
    pub fn in_memory() -> (Self, Arc<InMemoryDebugger>) {
        let debugger = Arc::new(InMemoryDebugger::new());
        let state = AppState::new(debugger.clone(), PipelineConfig::default());
        (state, debugger)
    }
}

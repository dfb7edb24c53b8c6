//! Render surface sessions.
//!
//! A panel connects over `/panel/ws` and receives [`DevtoolsMessage`]s.
//! Delivery is gated on visibility: a panel starts hidden, nothing is sent
//! while it is hidden, and every `panelShown` re-sends the full snapshot.
//! The first `panelShown` seen by the server grants temporary attach
//! permission. Panels opened with `?layout=true` get their graph updates
//! through a private [`LayoutWorker`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use audion_core::LayoutOptions;
use audion_transfer::{
    DevtoolsMessage, PanelCommand, PanelRequest, SerializedGraphContext, WorkerRequest,
};

use crate::attach::AttachController;
use crate::error::DevtoolsError;
use crate::hub::{AllGraphs, HubSubscription};
use crate::layout::LayoutWorker;
use crate::state::AppState;

/// Asks the page to run a garbage collection.
pub const COLLECT_GARBAGE: &str = "HeapProfiler.collectGarbage";

/// Unique panel identifier (UUID v4 newtype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PanelId(pub Uuid);

impl std::fmt::Display for PanelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected panel.
#[derive(Debug, Clone)]
pub struct PanelInfo {
    pub id: PanelId,
    pub visible: bool,
    /// Whether updates go through a layout worker.
    pub layout: bool,
    pub connected_at: Instant,
}

/// Registry of connected panels.
pub struct PanelRegistry {
    panels: DashMap<PanelId, PanelInfo>,
    shown: AtomicBool,
}

impl PanelRegistry {
    pub fn new() -> Self {
        PanelRegistry {
            panels: DashMap::new(),
            shown: AtomicBool::new(false),
        }
    }

    /// Registers a new, hidden panel.
    pub fn register(&self, layout: bool) -> PanelId {
        let id = PanelId(Uuid::new_v4());
        self.panels.insert(
            id,
            PanelInfo {
                id,
                visible: false,
                layout,
                connected_at: Instant::now(),
            },
        );
        id
    }

    pub fn deregister(&self, id: &PanelId) -> bool {
        self.panels.remove(id).is_some()
    }

    pub fn get(&self, id: &PanelId) -> Option<PanelInfo> {
        self.panels.get(id).map(|entry| entry.clone())
    }

    pub fn list(&self) -> Vec<PanelInfo> {
        self.panels.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn set_visible(&self, id: &PanelId, visible: bool) {
        if let Some(mut entry) = self.panels.get_mut(id) {
            entry.visible = visible;
        }
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn visible_count(&self) -> usize {
        self.panels.iter().filter(|entry| entry.visible).count()
    }

    /// Records that some panel was shown. Returns true the first time only.
    pub fn mark_shown(&self) -> bool {
        !self.shown.swap(true, Ordering::SeqCst)
    }
}

impl Default for PanelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends `HeapProfiler.collectGarbage` to the attached page.
pub async fn collect_garbage(controller: &AttachController) -> Result<(), DevtoolsError> {
    controller.send_command(COLLECT_GARBAGE, json!({})).await?;
    Ok(())
}

struct PanelLayout {
    worker: LayoutWorker,
    laid_out: mpsc::UnboundedReceiver<SerializedGraphContext>,
    options: LayoutOptions,
}

impl PanelLayout {
    fn spawn(state: &AppState, options: LayoutOptions) -> Self {
        let (worker, laid_out) = LayoutWorker::spawn(Arc::clone(&state.layout_engine), options);
        PanelLayout {
            worker,
            laid_out,
            options,
        }
    }
}

/// One connected panel: its hub subscription, visibility and layout worker.
pub struct PanelSession {
    id: PanelId,
    state: AppState,
    visible: bool,
    subscription: HubSubscription,
    layout: Option<PanelLayout>,
}

impl PanelSession {
    /// Registers a panel and subscribes it to the hub.
    pub fn open(state: &AppState, layout: bool) -> Self {
        let id = state.panels.register(layout);
        info!(panel = %id, layout, "panel connected");
        PanelSession {
            id,
            state: state.clone(),
            visible: false,
            subscription: state.hub.subscribe(),
            layout: layout.then(|| PanelLayout::spawn(state, LayoutOptions::default())),
        }
    }

    pub fn id(&self) -> PanelId {
        self.id
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Applies a request from the panel and returns the messages to send.
    pub fn handle_request(&mut self, request: PanelRequest) -> Vec<DevtoolsMessage> {
        match request {
            PanelRequest::Command(PanelCommand::PanelShown) => {
                if self.visible {
                    return Vec::new();
                }
                self.visible = true;
                self.state.panels.set_visible(&self.id, true);
                if self.state.panels.mark_shown() {
                    info!(panel = %self.id, "first panel shown; granting temporary attach permission");
                    self.state.controller.grant_temporary();
                }
                self.snapshot_messages()
            }
            PanelRequest::Command(PanelCommand::PanelHidden) => {
                self.visible = false;
                self.state.panels.set_visible(&self.id, false);
                Vec::new()
            }
            PanelRequest::Command(PanelCommand::CollectGarbage) => {
                let controller = Arc::clone(&self.state.controller);
                let panel = self.id;
                tokio::spawn(async move {
                    if let Err(error) = collect_garbage(&controller).await {
                        warn!(%panel, %error, "garbage collection request failed");
                    }
                });
                Vec::new()
            }
            PanelRequest::LayoutOptions { layout_options } => {
                match self.layout.as_mut() {
                    Some(layout) => {
                        layout.options = layout_options;
                        layout.worker.send(WorkerRequest::LayoutOptions(layout_options));
                    }
                    None => debug!(panel = %self.id, "layout options ignored without a layout worker"),
                }
                Vec::new()
            }
        }
    }

    /// Filters one hub broadcast for this panel.
    pub fn handle_update(&mut self, message: DevtoolsMessage) -> Vec<DevtoolsMessage> {
        if !self.visible {
            return Vec::new();
        }
        match message {
            DevtoolsMessage::GraphContext(serialized) => match self.layout.as_ref() {
                Some(layout) => {
                    layout.worker.send(WorkerRequest::GraphContext(serialized));
                    Vec::new()
                }
                None => vec![DevtoolsMessage::GraphContext(serialized)],
            },
            DevtoolsMessage::AllGraphs(all_graphs) => {
                self.restart_layout(&all_graphs);
                vec![DevtoolsMessage::AllGraphs(all_graphs)]
            }
            missed @ DevtoolsMessage::MissedUpdates(_) => vec![missed],
        }
    }

    /// The panel's receiver fell behind the hub by `skipped` messages.
    pub fn handle_lagged(&mut self, skipped: u64) -> Vec<DevtoolsMessage> {
        warn!(panel = %self.id, skipped, "panel fell behind; resending all graphs");
        if self.visible {
            self.snapshot_messages()
        } else {
            Vec::new()
        }
    }

    pub fn handle_laid_out(&mut self, serialized: SerializedGraphContext) -> Vec<DevtoolsMessage> {
        if self.visible {
            vec![DevtoolsMessage::GraphContext(serialized)]
        } else {
            Vec::new()
        }
    }

    /// Waits for the next batch of messages bound for the panel. `None`
    /// means the hub went away.
    pub async fn next_outgoing(&mut self) -> Option<Vec<DevtoolsMessage>> {
        tokio::select! {
            update = self.subscription.recv() => match update {
                Ok(message) => Some(self.handle_update(message)),
                Err(RecvError::Lagged(skipped)) => Some(self.handle_lagged(skipped)),
                Err(RecvError::Closed) => None,
            },
            Some(serialized) = next_laid_out(&mut self.layout) => {
                Some(self.handle_laid_out(serialized))
            }
        }
    }

    fn snapshot_messages(&mut self) -> Vec<DevtoolsMessage> {
        let all_graphs = self.subscription.resync().clone();
        self.restart_layout(&all_graphs);
        let mut messages = vec![DevtoolsMessage::AllGraphs(all_graphs)];
        if self.subscription.missed() {
            messages.push(DevtoolsMessage::MissedUpdates(true));
        }
        messages
    }

    /// Replaces the layout worker and feeds it `all_graphs`, so contexts that
    /// no longer exist are not laid out again.
    fn restart_layout(&mut self, all_graphs: &AllGraphs) {
        let Some(previous) = self.layout.take() else {
            return;
        };
        let layout = PanelLayout::spawn(&self.state, previous.options);
        for serialized in all_graphs.values() {
            layout
                .worker
                .send(WorkerRequest::GraphContext(serialized.clone()));
        }
        self.layout = Some(layout);
    }
}

impl Drop for PanelSession {
    fn drop(&mut self) {
        self.state.panels.deregister(&self.id);
        info!(panel = %self.id, "panel disconnected");
    }
}

async fn next_laid_out(layout: &mut Option<PanelLayout>) -> Option<SerializedGraphContext> {
    match layout {
        Some(layout) => layout.laid_out.recv().await,
        None => std::future::pending().await,
    }
}

/// Drives one panel WebSocket until either side goes away.
pub async fn run_panel(mut socket: WebSocket, state: AppState, layout: bool) {
    let mut session = PanelSession::open(&state, layout);

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let outgoing = match serde_json::from_str::<PanelRequest>(text.as_str()) {
                        Ok(request) => session.handle_request(request),
                        Err(error) => {
                            warn!(panel = %session.id(), %error, "unreadable panel request");
                            Vec::new()
                        }
                    };
                    if send_all(&mut socket, outgoing).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(panel = %session.id(), %error, "panel socket failed");
                    break;
                }
            },
            outgoing = session.next_outgoing() => match outgoing {
                Some(outgoing) => {
                    if send_all(&mut socket, outgoing).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

async fn send_all(socket: &mut WebSocket, messages: Vec<DevtoolsMessage>) -> Result<(), axum::Error> {
    for message in messages {
        match serde_json::to_string(&message) {
            Ok(json) => socket.send(Message::Text(json.into())).await?,
            Err(error) => warn!(%error, "failed to encode panel message"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::Permission;
    use audion_core::ContextUpdate;
    use audion_transfer::serialize;

    fn shown() -> PanelRequest {
        PanelRequest::Command(PanelCommand::PanelShown)
    }

    fn hidden() -> PanelRequest {
        PanelRequest::Command(PanelCommand::PanelHidden)
    }

    fn sentinel(id: &str) -> DevtoolsMessage {
        DevtoolsMessage::GraphContext(SerializedGraphContext::destroyed(id.into()))
    }

    #[test]
    fn registry_tracks_panels() {
        let registry = PanelRegistry::new();
        let a = registry.register(false);
        let b = registry.register(true);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&b).unwrap().layout);

        registry.set_visible(&a, true);
        assert_eq!(registry.visible_count(), 1);

        assert!(registry.mark_shown());
        assert!(!registry.mark_shown());

        assert!(registry.deregister(&a));
        assert!(!registry.deregister(&a));
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn hidden_panels_receive_nothing() {
        let (state, _debugger) = AppState::in_memory();
        let mut session = PanelSession::open(&state, false);
        assert!(!session.is_visible());
        assert!(session.handle_update(sentinel("c0")).is_empty());
        assert!(session
            .handle_update(DevtoolsMessage::MissedUpdates(true))
            .is_empty());
    }

    #[tokio::test]
    async fn showing_a_panel_sends_the_snapshot_and_grants_permission() {
        let (state, _debugger) = AppState::in_memory();
        assert_eq!(state.controller.permission(), Permission::Unknown);

        let mut session = PanelSession::open(&state, false);
        let sent = session.handle_request(shown());
        assert!(matches!(sent.as_slice(), [DevtoolsMessage::AllGraphs(all)] if all.is_empty()));
        assert_eq!(state.controller.permission(), Permission::Temporary);
        assert_eq!(state.panels.visible_count(), 1);

        // Already visible: nothing to resend.
        assert!(session.handle_request(shown()).is_empty());
        assert_eq!(session.handle_update(sentinel("c0")), vec![sentinel("c0")]);

        session.handle_request(hidden());
        assert!(session.handle_update(sentinel("c0")).is_empty());
        assert_eq!(state.panels.visible_count(), 0);
    }

    #[tokio::test]
    async fn dropping_a_session_deregisters_it() {
        let (state, _debugger) = AppState::in_memory();
        let session = PanelSession::open(&state, false);
        assert_eq!(state.panels.len(), 1);
        assert_eq!(state.hub.subscriber_count(), 1);
        drop(session);
        assert!(state.panels.is_empty());
        assert_eq!(state.hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn layout_panels_get_laid_out_contexts() {
        let (state, _debugger) = AppState::in_memory();
        let mut session = PanelSession::open(&state, true);
        session.handle_request(shown());

        let base = serde_json::from_value(json!({"contextId": "c0"})).unwrap();
        let ctx = audion_core::GraphContext::new(base);
        let update = serialize(ContextUpdate::Changed(&ctx));
        assert!(session
            .handle_update(DevtoolsMessage::GraphContext(update.clone()))
            .is_empty());

        let sent = session.next_outgoing().await.unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            DevtoolsMessage::GraphContext(laid_out) => {
                assert_eq!(laid_out.id.as_str(), "c0");
                assert!(laid_out.graph.as_ref().unwrap().value.rankdir.is_some());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}

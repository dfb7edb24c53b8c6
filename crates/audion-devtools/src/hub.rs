//! GraphHub: the all-graphs scan shared by every render surface.
//!
//! The hub runs the graph pipeline while at least one [`HubSubscription`]
//! exists. It keeps the latest serialized form of every live context
//! (removing a context when its destruction sentinel arrives) and broadcasts
//! each update. Taking a subscription returns the current snapshot and a
//! receiver positioned right after it, so a subscriber sees every context
//! exactly once: either in the snapshot or as a later update.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use audion_core::GraphObjectId;
use audion_transfer::{DevtoolsMessage, SerializedGraphContext};

use crate::attach::AttachController;
use crate::config::PipelineConfig;
use crate::pipeline::{graph_updates, MissedUpdates};

/// Pause between a pipeline failure and its restart.
const RESTART_DELAY: Duration = Duration::from_secs(1);
const BROADCAST_CAPACITY: usize = 256;

pub type AllGraphs = IndexMap<GraphObjectId, SerializedGraphContext>;

#[derive(Default)]
struct HubInner {
    all_graphs: AllGraphs,
    missed: bool,
    subscribers: usize,
    task: Option<JoinHandle<()>>,
}

/// Shared pipeline runner and all-graphs cache.
pub struct GraphHub {
    controller: Arc<AttachController>,
    config: PipelineConfig,
    inner: Mutex<HubInner>,
    updates: broadcast::Sender<DevtoolsMessage>,
}

impl GraphHub {
    pub fn new(controller: Arc<AttachController>, config: PipelineConfig) -> Arc<Self> {
        let (updates, _) = broadcast::channel(BROADCAST_CAPACITY);
        Arc::new(GraphHub {
            controller,
            config,
            inner: Mutex::new(HubInner::default()),
            updates,
        })
    }

    pub fn controller(&self) -> &Arc<AttachController> {
        &self.controller
    }

    /// Registers a subscriber, starting the pipeline for the first one.
    pub fn subscribe(self: &Arc<Self>) -> HubSubscription {
        let mut inner = self.inner.lock();
        inner.subscribers += 1;
        if inner.task.is_none() {
            info!("starting graph pipeline");
            inner.task = Some(tokio::spawn(run(Arc::clone(self))));
        }
        HubSubscription {
            hub: Arc::clone(self),
            snapshot: inner.all_graphs.clone(),
            missed: inner.missed,
            updates: self.updates.subscribe(),
        }
    }

    /// Every live context, in creation order.
    pub fn all_graphs(&self) -> AllGraphs {
        self.inner.lock().all_graphs.clone()
    }

    pub fn graph(&self, id: &str) -> Option<SerializedGraphContext> {
        self.inner.lock().all_graphs.get(id).cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().task.is_some()
    }

    /// Whether the running pipeline has seen events it could not apply.
    pub fn missed_updates(&self) -> bool {
        self.inner.lock().missed
    }

    fn publish(&self, serialized: SerializedGraphContext) {
        let mut inner = self.inner.lock();
        if serialized.is_destroyed() {
            inner.all_graphs.shift_remove(&serialized.id);
        } else {
            inner
                .all_graphs
                .insert(serialized.id.clone(), serialized.clone());
        }
        let _ = self.updates.send(DevtoolsMessage::GraphContext(serialized));
    }

    fn report_missed(&self) {
        let mut inner = self.inner.lock();
        if !inner.missed {
            inner.missed = true;
            let _ = self.updates.send(DevtoolsMessage::MissedUpdates(true));
        }
    }

    /// Forgets every context after the pipeline stopped.
    fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.all_graphs.clear();
        inner.missed = false;
        let _ = self.updates.send(DevtoolsMessage::AllGraphs(IndexMap::new()));
    }

    fn release(&self) {
        let mut inner = self.inner.lock();
        inner.subscribers -= 1;
        if inner.subscribers == 0 {
            if let Some(task) = inner.task.take() {
                info!("stopping graph pipeline");
                task.abort();
            }
            inner.all_graphs.clear();
            inner.missed = false;
        }
    }
}

async fn run(hub: Arc<GraphHub>) {
    loop {
        let (missed, mut missed_rx) = MissedUpdates::channel();
        let mut updates = graph_updates(&hub.controller, hub.config, missed);

        let failure = loop {
            tokio::select! {
                item = updates.next() => match item {
                    Some(Ok(serialized)) => hub.publish(serialized),
                    Some(Err(e)) => break Some(e),
                    None => break None,
                },
                Ok(()) = missed_rx.changed() => hub.report_missed(),
            }
        };
        drop(updates);

        match failure {
            Some(error) => warn!(%error, "graph pipeline failed; restarting"),
            None => warn!("graph pipeline ended; restarting"),
        }
        hub.reset();
        tokio::time::sleep(RESTART_DELAY).await;
    }
}

/// One subscriber's view of the hub. Dropping it unsubscribes.
pub struct HubSubscription {
    hub: Arc<GraphHub>,
    snapshot: AllGraphs,
    missed: bool,
    updates: broadcast::Receiver<DevtoolsMessage>,
}

impl HubSubscription {
    /// The contexts that existed when the subscription was taken (or last
    /// resynchronized).
    pub fn snapshot(&self) -> &AllGraphs {
        &self.snapshot
    }

    /// Whether missed updates had already been reported at that time.
    pub fn missed(&self) -> bool {
        self.missed
    }

    /// The next update after the snapshot.
    pub async fn recv(&mut self) -> Result<DevtoolsMessage, broadcast::error::RecvError> {
        self.updates.recv().await
    }

    /// Takes a fresh snapshot and skips every update it already covers.
    pub fn resync(&mut self) -> &AllGraphs {
        let inner = self.hub.inner.lock();
        self.snapshot = inner.all_graphs.clone();
        self.missed = inner.missed;
        self.updates = self.hub.updates.subscribe();
        &self.snapshot
    }
}

impl Drop for HubSubscription {
    fn drop(&mut self) {
        self.hub.release();
    }
}

//! Layout worker: positions the vertices of serialized contexts off the
//! pipeline task.
//!
//! The worker keeps one hydrated copy per context. An update is patched into
//! that copy, laid out, and serialized again. Destruction sentinels pass
//! through untouched and forget the copy. New layout options re-lay out every
//! held context.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use audion_core::{GraphObjectId, LayoutEngine, LayoutOptions};
use audion_transfer::{hydrate, serialize, HydratedContext, SerializedGraphContext, WorkerRequest};

/// The worker's state, independent of the thread it runs on.
pub struct LayoutState {
    engine: Arc<dyn LayoutEngine>,
    options: LayoutOptions,
    contexts: IndexMap<GraphObjectId, HydratedContext>,
}

impl LayoutState {
    pub fn new(engine: Arc<dyn LayoutEngine>, options: LayoutOptions) -> Self {
        LayoutState {
            engine,
            options,
            contexts: IndexMap::new(),
        }
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Number of contexts currently held.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Handles one request and returns the laid-out contexts to send back.
    pub fn process(&mut self, request: WorkerRequest) -> Vec<SerializedGraphContext> {
        match request {
            WorkerRequest::GraphContext(update) => self.update(update).into_iter().collect(),
            WorkerRequest::LayoutOptions(options) => {
                self.options = options;
                self.relayout_all()
            }
        }
    }

    fn update(&mut self, update: SerializedGraphContext) -> Option<SerializedGraphContext> {
        if update.is_destroyed() {
            self.contexts.shift_remove(&update.id);
            return Some(update);
        }

        let id = update.id.clone();
        let previous = self.contexts.shift_remove(&id);
        match hydrate(previous, update) {
            Ok((mut hydrated, patch)) => {
                debug!(context = %id, full = patch.full, changed = patch.total(), "hydrated graph context");
                if patch.full || !patch.is_clean() {
                    if let HydratedContext::Live(ctx) = &mut hydrated {
                        self.engine.layout(&mut ctx.graph, &self.options);
                    }
                }
                let laid_out = serialize(hydrated.as_update());
                self.contexts.insert(id, hydrated);
                Some(laid_out)
            }
            Err(error) => {
                warn!(context = %id, %error, "dropping unreadable graph context");
                None
            }
        }
    }

    fn relayout_all(&mut self) -> Vec<SerializedGraphContext> {
        let engine = &self.engine;
        let options = &self.options;
        self.contexts
            .values_mut()
            .map(|hydrated| {
                if let HydratedContext::Live(ctx) = hydrated {
                    engine.layout(&mut ctx.graph, options);
                }
                serialize(hydrated.as_update())
            })
            .collect()
    }
}

/// Handle to a layout worker running on the blocking pool.
///
/// The worker stops once this handle is dropped or its output receiver is.
pub struct LayoutWorker {
    tx: mpsc::UnboundedSender<WorkerRequest>,
}

impl LayoutWorker {
    pub fn spawn(
        engine: Arc<dyn LayoutEngine>,
        options: LayoutOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SerializedGraphContext>) {
        let (tx, mut requests) = mpsc::unbounded_channel::<WorkerRequest>();
        let (out, laid_out) = mpsc::unbounded_channel();

        tokio::task::spawn_blocking(move || {
            let mut state = LayoutState::new(engine, options);
            while let Some(request) = requests.blocking_recv() {
                for serialized in state.process(request) {
                    if out.send(serialized).is_err() {
                        return;
                    }
                }
            }
        });

        (LayoutWorker { tx }, laid_out)
    }

    /// Queues a request. Returns false once the worker has stopped.
    pub fn send(&self, request: WorkerRequest) -> bool {
        self.tx.send(request).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audion_core::{
        AudioEdge, AudioNode, BaseAudioContext, ContextUpdate, EdgeValue, GraphContext,
        LayeredLayout, NodeLabel, RankDir,
    };
    use audion_transfer::deserialize;
    use serde_json::json;

    fn context(id: &str) -> GraphContext {
        let base: BaseAudioContext = serde_json::from_value(json!({
            "contextId": id,
            "contextType": "realtime",
            "contextState": "running",
            "callbackBufferSize": 256,
            "maxOutputChannelCount": 2,
            "sampleRate": 48000.0
        }))
        .unwrap();
        let mut ctx = GraphContext::new(base);
        for (node_id, node_type) in [("n0", "OscillatorNode"), ("n1", "GainNode")] {
            let node: AudioNode = serde_json::from_value(json!({
                "nodeId": node_id,
                "contextId": id,
                "nodeType": node_type,
                "numberOfInputs": 1,
                "numberOfOutputs": 1
            }))
            .unwrap();
            ctx.graph.set_node(NodeLabel::for_node(&node));
        }
        ctx.graph.set_edge(
            &"n0".into(),
            &"n1".into(),
            EdgeValue::new(AudioEdge::Node {
                source_output_index: 0,
                destination_input_index: 0,
            }),
        );
        ctx
    }

    fn state() -> LayoutState {
        LayoutState::new(Arc::new(LayeredLayout), LayoutOptions::default())
    }

    fn positions(serialized: &SerializedGraphContext) -> Vec<(f64, f64)> {
        match deserialize(serialized.clone()).unwrap() {
            HydratedContext::Live(ctx) => ctx
                .graph
                .nodes()
                .map(|label| (label.x.unwrap(), label.y.unwrap()))
                .collect(),
            HydratedContext::Destroyed(id) => panic!("unexpected sentinel for {id}"),
        }
    }

    #[test]
    fn updates_come_back_positioned() {
        let mut state = state();
        let ctx = context("c0");
        let out = state.process(WorkerRequest::GraphContext(serialize(ContextUpdate::Changed(
            &ctx,
        ))));
        assert_eq!(out.len(), 1);
        let placed = positions(&out[0]);
        assert_eq!(placed.len(), 2);
        // Left to right: the source sits left of its destination.
        assert!(placed[0].0 < placed[1].0);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn sentinels_pass_through_and_forget() {
        let mut state = state();
        let ctx = context("c0");
        state.process(WorkerRequest::GraphContext(serialize(ContextUpdate::Changed(&ctx))));

        let sentinel = SerializedGraphContext::destroyed("c0".into());
        let out = state.process(WorkerRequest::GraphContext(sentinel.clone()));
        assert_eq!(out, vec![sentinel]);
        assert!(state.is_empty());
    }

    #[test]
    fn new_options_relayout_every_context() {
        let mut state = state();
        for id in ["c0", "c1"] {
            let ctx = context(id);
            state.process(WorkerRequest::GraphContext(serialize(ContextUpdate::Changed(&ctx))));
        }

        let options = LayoutOptions {
            rankdir: RankDir::TB,
            ..LayoutOptions::default()
        };
        let out = state.process(WorkerRequest::LayoutOptions(options));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id.as_str(), "c0");
        assert_eq!(out[1].id.as_str(), "c1");
        for serialized in &out {
            let placed = positions(serialized);
            // Top to bottom: same column, source above destination.
            assert!((placed[0].0 - placed[1].0).abs() < 1e-9);
            assert!(placed[0].1 < placed[1].1);
        }
        assert_eq!(state.options().rankdir, RankDir::TB);
    }

    #[test]
    fn unreadable_updates_are_dropped() {
        let mut state = state();
        let mut partial = SerializedGraphContext::destroyed("c0".into());
        partial.event_count = 3;
        partial.nodes = Some(IndexMap::new());
        assert!(state.process(WorkerRequest::GraphContext(partial)).is_empty());
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn worker_replies_on_its_channel() {
        let (worker, mut laid_out) =
            LayoutWorker::spawn(Arc::new(LayeredLayout), LayoutOptions::default());
        let ctx = context("c0");
        assert!(worker.send(WorkerRequest::GraphContext(serialize(ContextUpdate::Changed(
            &ctx
        )))));
        let serialized = laid_out.recv().await.unwrap();
        assert_eq!(positions(&serialized).len(), 2);

        drop(worker);
        assert!(laid_out.recv().await.is_none());
    }
}

//! GraphIntegrator: folds `WebAudio` events into per-context graph models.
//!
//! The integrator owns the contexts table outright. [`GraphIntegrator::apply`]
//! dispatches one event, mutates the table, and hands the caller at most one
//! borrowed [`ContextUpdate`] describing the result. Events that reference
//! objects the integrator never saw (the debugger attached after they were
//! created) are not errors: they leave the table untouched and report
//! [`Outcome::Ignored`] so the caller can tell the user the view is partial.

use indexmap::IndexMap;

use crate::context::{ContextUpdate, GraphContext};
use crate::edge::{AudioEdge, EdgeKey, EdgeValue};
use crate::error::CoreError;
use crate::id::GraphObjectId;
use crate::node::{Connection, GraphNode, NodeLabel};
use crate::protocol::{
    AudioNode, AudioParam, BaseAudioContext, ContextRealtimeData, NodeParamConnection,
    NodesConnection, WebAudioEvent,
};

/// Tuning knobs for the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegratorOptions {
    /// Emit a `Changed` update for parameter creation and destruction. Off by
    /// default: parameters alone do not change what a render surface draws.
    pub emit_param_updates: bool,
}

/// A reference to something the integrator has never seen (or has already
/// forgotten).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Miss {
    Context(GraphObjectId),
    Node(GraphObjectId),
    Param(GraphObjectId),
}

/// What [`GraphIntegrator::apply`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The table changed and an update was emitted.
    Emitted,
    /// The table changed but nothing was emitted.
    Silent,
    /// A precondition failed; the table is unchanged.
    Ignored(Miss),
}

impl Outcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Outcome::Ignored(_))
    }
}

/// Result of one handler, before emission.
enum Effect {
    Changed(GraphObjectId),
    ParamChanged(GraphObjectId),
    Destroyed(GraphObjectId),
    Ignored(Miss),
}

/// The per-context reducer.
#[derive(Debug, Clone, Default)]
pub struct GraphIntegrator {
    contexts: IndexMap<GraphObjectId, GraphContext>,
    options: IntegratorOptions,
}

impl GraphIntegrator {
    pub fn new(options: IntegratorOptions) -> Self {
        GraphIntegrator {
            contexts: IndexMap::new(),
            options,
        }
    }

    pub fn options(&self) -> IntegratorOptions {
        self.options
    }

    pub fn context(&self, id: &GraphObjectId) -> Option<&GraphContext> {
        self.contexts.get(id)
    }

    /// Iterates live contexts in creation order.
    pub fn contexts(&self) -> impl Iterator<Item = &GraphContext> + '_ {
        self.contexts.values()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Applies one event and calls `emit` at most once with the result.
    ///
    /// Returns [`CoreError::EdgeNotFound`] when a disconnect names two known
    /// endpoints but no matching connection was ever recorded. The table is
    /// left unchanged in that case.
    pub fn apply<F>(&mut self, event: WebAudioEvent, emit: F) -> Result<Outcome, CoreError>
    where
        F: FnOnce(ContextUpdate<'_>),
    {
        let effect = match event {
            WebAudioEvent::ContextCreated(e) => self.context_created(e.context),
            WebAudioEvent::ContextChanged(e) => self.context_changed(e.context),
            WebAudioEvent::ContextWillBeDestroyed(e) => self.context_destroyed(e.context_id),
            WebAudioEvent::AudioNodeCreated(e) => self.node_created(e.node),
            WebAudioEvent::AudioNodeWillBeDestroyed(e) => {
                self.node_destroyed(&e.context_id, &e.node_id)
            }
            WebAudioEvent::AudioParamCreated(e) => self.param_created(e.param),
            WebAudioEvent::AudioParamWillBeDestroyed(e) => {
                self.param_destroyed(&e.context_id, &e.node_id, &e.param_id)
            }
            WebAudioEvent::NodesConnected(e) => self.nodes_connected(e),
            WebAudioEvent::NodesDisconnected(e) => self.nodes_disconnected(&e)?,
            WebAudioEvent::NodeParamConnected(e) => self.node_param_connected(e),
            WebAudioEvent::NodeParamDisconnected(e) => self.node_param_disconnected(&e)?,
        };

        let outcome = match effect {
            Effect::Changed(id) => self.emit_changed(&id, true, emit),
            Effect::ParamChanged(id) => {
                let emit_params = self.options.emit_param_updates;
                self.emit_changed(&id, emit_params, emit)
            }
            Effect::Destroyed(id) => {
                emit(ContextUpdate::Destroyed(&id));
                Outcome::Emitted
            }
            Effect::Ignored(miss) => return Ok(Outcome::Ignored(miss)),
        };

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(outcome)
    }

    /// Replaces the realtime statistics of a live context and emits it.
    /// Unknown contexts are ignored.
    pub fn apply_realtime_data<F>(
        &mut self,
        id: &GraphObjectId,
        data: ContextRealtimeData,
        emit: F,
    ) -> Outcome
    where
        F: FnOnce(ContextUpdate<'_>),
    {
        match self.contexts.get_mut(id) {
            Some(ctx) => {
                ctx.realtime_data = data;
                emit(ContextUpdate::Changed(&*ctx));
                Outcome::Emitted
            }
            None => Outcome::Ignored(Miss::Context(id.clone())),
        }
    }

    fn emit_changed<F>(&mut self, id: &GraphObjectId, emit_update: bool, emit: F) -> Outcome
    where
        F: FnOnce(ContextUpdate<'_>),
    {
        let Some(ctx) = self.contexts.get_mut(id) else {
            return Outcome::Silent;
        };
        ctx.event_count += 1;
        if emit_update {
            emit(ContextUpdate::Changed(&*ctx));
            Outcome::Emitted
        } else {
            Outcome::Silent
        }
    }

    // -----------------------------------------------------------------------
    // Context handlers
    // -----------------------------------------------------------------------

    fn context_created(&mut self, context: BaseAudioContext) -> Effect {
        let id = context.context_id.clone();
        self.contexts.insert(id.clone(), GraphContext::new(context));
        Effect::Changed(id)
    }

    fn context_changed(&mut self, context: BaseAudioContext) -> Effect {
        let id = context.context_id.clone();
        match self.contexts.get_mut(&id) {
            Some(ctx) => {
                ctx.context = context;
                Effect::Changed(id)
            }
            None => Effect::Ignored(Miss::Context(id)),
        }
    }

    fn context_destroyed(&mut self, id: GraphObjectId) -> Effect {
        match self.contexts.shift_remove(&id) {
            Some(_) => Effect::Destroyed(id),
            None => Effect::Ignored(Miss::Context(id)),
        }
    }

    // -----------------------------------------------------------------------
    // Node and param handlers
    // -----------------------------------------------------------------------

    fn node_created(&mut self, node: AudioNode) -> Effect {
        let Some(ctx) = self.contexts.get_mut(&node.context_id) else {
            return Effect::Ignored(Miss::Context(node.context_id));
        };
        let node_id = node.node_id.clone();
        // A repeated id starts over: drop the old vertex and its edges.
        ctx.graph.remove_node(&node_id);
        ctx.graph.set_node(NodeLabel::for_node(&node));
        ctx.nodes.insert(node_id, GraphNode::new(node));
        Effect::Changed(ctx.id.clone())
    }

    fn node_destroyed(&mut self, context_id: &GraphObjectId, node_id: &GraphObjectId) -> Effect {
        let Some(ctx) = self.contexts.get_mut(context_id) else {
            return Effect::Ignored(Miss::Context(context_id.clone()));
        };
        if ctx.nodes.shift_remove(node_id).is_none() {
            return Effect::Ignored(Miss::Node(node_id.clone()));
        }
        ctx.graph.remove_node(node_id);
        Effect::Changed(ctx.id.clone())
    }

    fn param_created(&mut self, param: AudioParam) -> Effect {
        let Some(ctx) = self.contexts.get_mut(&param.context_id) else {
            return Effect::Ignored(Miss::Context(param.context_id));
        };
        let Some(node) = ctx.nodes.get_mut(&param.node_id) else {
            return Effect::Ignored(Miss::Node(param.node_id));
        };
        node.params.push(param.clone());
        ctx.params.insert(param.param_id.clone(), param);
        Effect::ParamChanged(ctx.id.clone())
    }

    fn param_destroyed(
        &mut self,
        context_id: &GraphObjectId,
        node_id: &GraphObjectId,
        param_id: &GraphObjectId,
    ) -> Effect {
        let Some(ctx) = self.contexts.get_mut(context_id) else {
            return Effect::Ignored(Miss::Context(context_id.clone()));
        };
        let Some(node) = ctx.nodes.get_mut(node_id) else {
            return Effect::Ignored(Miss::Node(node_id.clone()));
        };
        // The reverse-lookup entry stays so late disconnects still resolve.
        if node.remove_param(param_id).is_none() {
            return Effect::Ignored(Miss::Param(param_id.clone()));
        }
        Effect::ParamChanged(ctx.id.clone())
    }

    // -----------------------------------------------------------------------
    // Connection handlers
    // -----------------------------------------------------------------------

    fn nodes_connected(&mut self, conn: NodesConnection) -> Effect {
        let Some(ctx) = self.contexts.get_mut(&conn.context_id) else {
            return Effect::Ignored(Miss::Context(conn.context_id));
        };
        if !ctx.nodes.contains_key(&conn.destination_id) {
            return Effect::Ignored(Miss::Node(conn.destination_id));
        }
        let Some(source) = ctx.nodes.get_mut(&conn.source_id) else {
            return Effect::Ignored(Miss::Node(conn.source_id));
        };
        let value = EdgeValue::new(AudioEdge::Node {
            source_output_index: conn.source_output(),
            destination_input_index: conn.destination_input(),
        });
        ctx.graph
            .set_edge(&conn.source_id, &conn.destination_id, value);
        source.edges.push(Connection::Nodes(conn));
        Effect::Changed(ctx.id.clone())
    }

    fn nodes_disconnected(&mut self, conn: &NodesConnection) -> Result<Effect, CoreError> {
        let Some(ctx) = self.contexts.get_mut(&conn.context_id) else {
            return Ok(Effect::Ignored(Miss::Context(conn.context_id.clone())));
        };
        if !ctx.nodes.contains_key(&conn.destination_id) {
            return Ok(Effect::Ignored(Miss::Node(conn.destination_id.clone())));
        }
        let Some(source) = ctx.nodes.get_mut(&conn.source_id) else {
            return Ok(Effect::Ignored(Miss::Node(conn.source_id.clone())));
        };
        let key = EdgeKey::Channels {
            output: conn.source_output(),
            input: conn.destination_input(),
        };
        let record = source.edges.iter().position(|c| c.matches_nodes(conn));
        let has_edge = ctx.graph.has_edge(&conn.source_id, &conn.destination_id, key);
        if record.is_none() && !has_edge {
            return Err(CoreError::EdgeNotFound {
                context: ctx.id.clone(),
                source_id: conn.source_id.clone(),
                destination_id: conn.destination_id.clone(),
                key,
            });
        }
        if let Some(index) = record {
            source.edges.remove(index);
        }
        ctx.graph
            .remove_edge(&conn.source_id, &conn.destination_id, key);
        Ok(Effect::Changed(ctx.id.clone()))
    }

    fn node_param_connected(&mut self, conn: NodeParamConnection) -> Effect {
        let Some(ctx) = self.contexts.get_mut(&conn.context_id) else {
            return Effect::Ignored(Miss::Context(conn.context_id));
        };
        let Some(owner) = ctx.params.get(&conn.destination_id).map(|p| p.node_id.clone()) else {
            return Effect::Ignored(Miss::Param(conn.destination_id));
        };
        if !ctx.nodes.contains_key(&owner) {
            return Effect::Ignored(Miss::Node(owner));
        }
        let Some(source) = ctx.nodes.get_mut(&conn.source_id) else {
            return Effect::Ignored(Miss::Node(conn.source_id));
        };
        let value = EdgeValue::new(AudioEdge::Param {
            source_output_index: conn.source_output(),
            destination_param_id: conn.destination_id.clone(),
        });
        ctx.graph.set_edge(&conn.source_id, &owner, value);
        source.edges.push(Connection::Param(conn));
        Effect::Changed(ctx.id.clone())
    }

    fn node_param_disconnected(
        &mut self,
        conn: &NodeParamConnection,
    ) -> Result<Effect, CoreError> {
        let Some(ctx) = self.contexts.get_mut(&conn.context_id) else {
            return Ok(Effect::Ignored(Miss::Context(conn.context_id.clone())));
        };
        let Some(owner) = ctx.params.get(&conn.destination_id).map(|p| p.node_id.clone()) else {
            return Ok(Effect::Ignored(Miss::Param(conn.destination_id.clone())));
        };
        let Some(source) = ctx.nodes.get_mut(&conn.source_id) else {
            return Ok(Effect::Ignored(Miss::Node(conn.source_id.clone())));
        };
        let key = EdgeKey::Output(conn.source_output());
        let record = source.edges.iter().position(|c| c.matches_param(conn));
        let has_edge = ctx.graph.has_edge(&conn.source_id, &owner, key);
        if record.is_none() && !has_edge {
            return Err(CoreError::EdgeNotFound {
                context: ctx.id.clone(),
                source_id: conn.source_id.clone(),
                destination_id: conn.destination_id.clone(),
                key,
            });
        }
        if let Some(index) = record {
            source.edges.remove(index);
        }
        ctx.graph.remove_edge(&conn.source_id, &owner, key);
        Ok(Effect::Changed(ctx.id.clone()))
    }

    // -----------------------------------------------------------------------
    // Consistency
    // -----------------------------------------------------------------------

    /// Checks table invariants. Called after every mutation in debug builds.
    #[cfg(debug_assertions)]
    pub fn assert_consistency(&self) {
        for (id, ctx) in &self.contexts {
            assert_eq!(id, &ctx.id, "context keyed under foreign id");
            assert_eq!(
                ctx.nodes.len(),
                ctx.graph.node_count(),
                "context {id}: node table and topology disagree"
            );
            for (node_id, node) in &ctx.nodes {
                assert_eq!(node_id, &node.node.node_id, "node keyed under foreign id");
                assert_eq!(
                    &node.node.context_id, id,
                    "node {node_id} belongs to another context"
                );
                assert!(
                    ctx.graph.has_node(node_id),
                    "node {node_id} has no topology vertex"
                );
            }
            for edge in ctx.graph.edges() {
                assert!(
                    ctx.nodes.contains_key(edge.source) && ctx.nodes.contains_key(edge.target),
                    "edge {} -> {} references a missing node",
                    edge.source,
                    edge.target
                );
                if let AudioEdge::Param {
                    destination_param_id,
                    ..
                } = &edge.value.edge
                {
                    assert!(
                        ctx.params.contains_key(destination_param_id),
                        "param edge targets unknown param {destination_param_id}"
                    );
                }
            }
        }
    }
}

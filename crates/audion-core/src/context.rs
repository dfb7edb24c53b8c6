//! GraphContext: the root aggregate for one audio context.

use indexmap::IndexMap;

use crate::graph::AudioGraph;
use crate::id::GraphObjectId;
use crate::node::GraphNode;
use crate::protocol::{AudioParam, BaseAudioContext, ContextRealtimeData};

/// The live model of one audio context.
///
/// `nodes` and `params` keep insertion order so serialized output is stable
/// across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphContext {
    pub id: GraphObjectId,
    /// Number of events applied to this context since it was created.
    pub event_count: u64,
    pub context: BaseAudioContext,
    pub realtime_data: ContextRealtimeData,
    pub nodes: IndexMap<GraphObjectId, GraphNode>,
    /// Reverse lookup for edges that target a parameter.
    pub params: IndexMap<GraphObjectId, AudioParam>,
    pub graph: AudioGraph,
}

impl GraphContext {
    /// Creates an empty context from its metadata.
    pub fn new(context: BaseAudioContext) -> Self {
        GraphContext {
            id: context.context_id.clone(),
            event_count: 0,
            context,
            realtime_data: ContextRealtimeData::default(),
            nodes: IndexMap::new(),
            params: IndexMap::new(),
            graph: AudioGraph::new(),
        }
    }

    /// The node that owns parameter `param_id`, if both are known.
    pub fn param_owner(&self, param_id: &GraphObjectId) -> Option<&GraphNode> {
        let param = self.params.get(param_id)?;
        self.nodes.get(&param.node_id)
    }
}

/// One emission from the integrator.
///
/// `Changed` borrows the live context; the borrow ends before the next event
/// is applied, so consumers must serialize or clone what they need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContextUpdate<'a> {
    Changed(&'a GraphContext),
    /// The context is gone. Serializes to the all-null deletion sentinel.
    Destroyed(&'a GraphObjectId),
}

impl ContextUpdate<'_> {
    pub fn context_id(&self) -> &GraphObjectId {
        match self {
            ContextUpdate::Changed(ctx) => &ctx.id,
            ContextUpdate::Destroyed(id) => id,
        }
    }

    /// Returns `true` for the deletion sentinel.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, ContextUpdate::Destroyed(_))
    }
}

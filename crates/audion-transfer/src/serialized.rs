//! Wire shapes for contexts crossing a process boundary.
//!
//! The topology travels as a flat graph document: a list of vertices
//! `{v, value}`, a list of edges `{v, w, name, value}`, and the graph-level
//! `value`. Payload fields of [`SerializedGraphContext`] are all `null` for
//! the deletion sentinel and all present otherwise.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use audion_core::{
    AudioParam, BaseAudioContext, ContextRealtimeData, EdgeKey, EdgeValue, GraphLabel,
    GraphNode, GraphObjectId, NodeLabel,
};

/// Graph document options. Context topologies are always directed multigraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphOptions {
    pub directed: bool,
    pub multigraph: bool,
    pub compound: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        GraphOptions {
            directed: true,
            multigraph: true,
            compound: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    pub v: GraphObjectId,
    pub value: NodeLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedEdge {
    pub v: GraphObjectId,
    pub w: GraphObjectId,
    pub name: EdgeKey,
    pub value: EdgeValue,
}

/// A flattened topology.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerializedGraph {
    #[serde(default)]
    pub options: GraphOptions,
    #[serde(default)]
    pub nodes: Vec<SerializedNode>,
    #[serde(default)]
    pub edges: Vec<SerializedEdge>,
    #[serde(default)]
    pub value: GraphLabel,
}

/// A context in transferable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedGraphContext {
    pub id: GraphObjectId,
    #[serde(default)]
    pub event_count: u64,
    pub context: Option<BaseAudioContext>,
    pub realtime_data: Option<ContextRealtimeData>,
    pub nodes: Option<IndexMap<GraphObjectId, GraphNode>>,
    pub params: Option<IndexMap<GraphObjectId, AudioParam>>,
    pub graph: Option<SerializedGraph>,
}

impl SerializedGraphContext {
    /// The deletion sentinel for `id`.
    pub fn destroyed(id: GraphObjectId) -> Self {
        SerializedGraphContext {
            id,
            event_count: 0,
            context: None,
            realtime_data: None,
            nodes: None,
            params: None,
            graph: None,
        }
    }

    /// Returns `true` when this is the deletion sentinel. A value with only
    /// some fields null is not a sentinel; deserializing it fails.
    pub fn is_destroyed(&self) -> bool {
        self.context.is_none()
            && self.realtime_data.is_none()
            && self.nodes.is_none()
            && self.params.is_none()
            && self.graph.is_none()
    }
}

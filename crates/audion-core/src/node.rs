//! Node wrappers for the per-context model.
//!
//! [`GraphNode`] is the model-side record for one audio node: its protocol
//! metadata, the parameters it owns, and the raw connection records whose
//! source is this node. [`NodeLabel`] is the vertex weight in the topology
//! graph, which layout later annotates with coordinates.

use serde::{Deserialize, Serialize};

use crate::id::GraphObjectId;
use crate::protocol::{AudioNode, AudioParam, NodeParamConnection, NodesConnection};

/// Default vertex width handed to layout.
pub const NODE_WIDTH: f64 = 150.0;
/// Default vertex height handed to layout.
pub const NODE_HEIGHT: f64 = 50.0;

/// A raw connection event kept on its source node for disconnect matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Connection {
    Nodes(NodesConnection),
    Param(NodeParamConnection),
}

impl Connection {
    pub fn destination_id(&self) -> &GraphObjectId {
        match self {
            Connection::Nodes(c) => &c.destination_id,
            Connection::Param(c) => &c.destination_id,
        }
    }

    /// Source output index with the protocol default applied.
    pub fn source_output(&self) -> u32 {
        match self {
            Connection::Nodes(c) => c.source_output(),
            Connection::Param(c) => c.source_output(),
        }
    }

    /// Matches a node-to-node disconnect: destination and both channel
    /// indices, defaults applied on both sides.
    pub fn matches_nodes(&self, other: &NodesConnection) -> bool {
        match self {
            Connection::Nodes(c) => {
                c.destination_id == other.destination_id
                    && c.source_output() == other.source_output()
                    && c.destination_input() == other.destination_input()
            }
            Connection::Param(_) => false,
        }
    }

    /// Matches a node-to-param disconnect: destination and source output
    /// only. Two sources feeding the same parameter from the same output
    /// index are not told apart here; see DESIGN.md.
    pub fn matches_param(&self, other: &NodeParamConnection) -> bool {
        match self {
            Connection::Param(c) => {
                c.destination_id == other.destination_id
                    && c.source_output() == other.source_output()
            }
            Connection::Nodes(_) => false,
        }
    }
}

/// One audio node in a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub node: AudioNode,
    pub params: Vec<AudioParam>,
    pub edges: Vec<Connection>,
}

impl GraphNode {
    pub fn new(node: AudioNode) -> Self {
        GraphNode {
            node,
            params: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Removes the parameter with `param_id`. Returns it if it was present.
    pub fn remove_param(&mut self, param_id: &GraphObjectId) -> Option<AudioParam> {
        let index = self.params.iter().position(|p| &p.param_id == param_id)?;
        Some(self.params.remove(index))
    }
}

/// Vertex weight in the topology graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLabel {
    pub id: GraphObjectId,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub color: Option<String>,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl NodeLabel {
    /// Creates an unpositioned label for `node`, labelled with its type.
    pub fn for_node(node: &AudioNode) -> Self {
        NodeLabel {
            id: node.node_id.clone(),
            label: node.node_type.clone(),
            node_type: node.node_type.clone(),
            color: None,
            width: NODE_WIDTH,
            height: NODE_HEIGHT,
            x: None,
            y: None,
        }
    }

    /// Returns `true` once layout has assigned a position.
    pub fn is_positioned(&self) -> bool {
        self.x.is_some() && self.y.is_some()
    }
}

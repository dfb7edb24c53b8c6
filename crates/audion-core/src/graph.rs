//! AudioGraph: the per-context topology multigraph.
//!
//! [`AudioGraph`] wraps a petgraph `StableGraph` whose vertices are audio
//! nodes and whose edges are connections. Vertices are addressed by their
//! protocol [`GraphObjectId`] through a side index, so callers never handle
//! petgraph indices. Parallel edges between the same pair of vertices are
//! told apart by their [`EdgeKey`]; setting an edge whose key already exists
//! replaces its value instead of adding a duplicate.
//!
//! Removing a vertex removes every incident edge with it (StableGraph keeps
//! the remaining indices stable, so the side index stays valid).

use std::collections::HashMap;

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Directed;
use serde::{Deserialize, Serialize};

use crate::edge::{EdgeKey, EdgeValue};
use crate::id::GraphObjectId;
use crate::node::NodeLabel;

/// Layout direction for ranked layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RankDir {
    #[default]
    LR,
    RL,
    TB,
    BT,
}

/// Graph-level value: layout options going in, overall size coming out.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLabel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rankdir: Option<RankDir>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodesep: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranksep: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// A borrowed view of one edge with its endpoint IDs resolved.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub source: &'a GraphObjectId,
    pub target: &'a GraphObjectId,
    pub value: &'a EdgeValue,
}

impl EdgeView<'_> {
    pub fn key(&self) -> EdgeKey {
        self.value.key()
    }
}

/// Directed multigraph of one audio context's nodes and connections.
#[derive(Debug, Clone, Default)]
pub struct AudioGraph {
    topology: StableGraph<NodeLabel, EdgeValue, Directed, u32>,
    index: HashMap<GraphObjectId, NodeIndex<u32>>,
    /// Graph-level layout options and results.
    pub value: GraphLabel,
}

impl AudioGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// Returns a read-only reference to the underlying petgraph.
    pub fn topology(&self) -> &StableGraph<NodeLabel, EdgeValue, Directed, u32> {
        &self.topology
    }

    pub fn node_index(&self, id: &GraphObjectId) -> Option<NodeIndex<u32>> {
        self.index.get(id).copied()
    }

    pub fn has_node(&self, id: &GraphObjectId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &GraphObjectId) -> Option<&NodeLabel> {
        self.node_index(id)
            .and_then(|idx| self.topology.node_weight(idx))
    }

    pub fn node_mut(&mut self, id: &GraphObjectId) -> Option<&mut NodeLabel> {
        let idx = self.node_index(id)?;
        self.topology.node_weight_mut(idx)
    }

    /// Iterates vertex labels in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeLabel> + '_ {
        self.topology
            .node_indices()
            .filter_map(move |idx| self.topology.node_weight(idx))
    }

    /// Iterates every edge with resolved endpoint IDs.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        self.topology.edge_references().map(move |edge| EdgeView {
            source: &self.topology[edge.source()].id,
            target: &self.topology[edge.target()].id,
            value: edge.weight(),
        })
    }

    /// Iterates edges that start or end at `id`.
    pub fn incident_edges<'a>(
        &'a self,
        id: &'a GraphObjectId,
    ) -> impl Iterator<Item = EdgeView<'a>> + 'a {
        self.edges()
            .filter(move |edge| edge.source == id || edge.target == id)
    }

    pub fn node_count(&self) -> usize {
        self.topology.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.topology.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.topology.node_count() == 0
    }

    // -----------------------------------------------------------------------
    // Vertex mutation
    // -----------------------------------------------------------------------

    /// Inserts a vertex, or replaces the label of an existing one.
    pub fn set_node(&mut self, label: NodeLabel) -> NodeIndex<u32> {
        if let Some(idx) = self.node_index(&label.id) {
            self.topology[idx] = label;
            return idx;
        }
        let id = label.id.clone();
        let idx = self.topology.add_node(label);
        self.index.insert(id, idx);
        idx
    }

    /// Removes a vertex and all of its incident edges.
    pub fn remove_node(&mut self, id: &GraphObjectId) -> Option<NodeLabel> {
        let idx = self.index.remove(id)?;
        self.topology.remove_node(idx)
    }

    // -----------------------------------------------------------------------
    // Edge mutation
    // -----------------------------------------------------------------------

    fn find_edge(
        &self,
        source: &GraphObjectId,
        target: &GraphObjectId,
        key: EdgeKey,
    ) -> Option<EdgeIndex<u32>> {
        let from = self.node_index(source)?;
        let to = self.node_index(target)?;
        self.topology
            .edges_connecting(from, to)
            .find(|edge| edge.weight().key() == key)
            .map(|edge| edge.id())
    }

    pub fn has_edge(&self, source: &GraphObjectId, target: &GraphObjectId, key: EdgeKey) -> bool {
        self.find_edge(source, target, key).is_some()
    }

    pub fn edge(
        &self,
        source: &GraphObjectId,
        target: &GraphObjectId,
        key: EdgeKey,
    ) -> Option<&EdgeValue> {
        let idx = self.find_edge(source, target, key)?;
        self.topology.edge_weight(idx)
    }

    pub fn edge_mut(
        &mut self,
        source: &GraphObjectId,
        target: &GraphObjectId,
        key: EdgeKey,
    ) -> Option<&mut EdgeValue> {
        let idx = self.find_edge(source, target, key)?;
        self.topology.edge_weight_mut(idx)
    }

    /// Adds an edge keyed by `value.key()`, replacing the value of an existing
    /// edge with the same key.
    ///
    /// Returns `false` without changing anything when either endpoint is not
    /// a vertex of this graph.
    pub fn set_edge(
        &mut self,
        source: &GraphObjectId,
        target: &GraphObjectId,
        value: EdgeValue,
    ) -> bool {
        let (Some(from), Some(to)) = (self.node_index(source), self.node_index(target)) else {
            return false;
        };
        match self.find_edge(source, target, value.key()) {
            Some(idx) => self.topology[idx] = value,
            None => {
                self.topology.add_edge(from, to, value);
            }
        }
        true
    }

    /// Removes the edge with the given endpoints and key.
    pub fn remove_edge(
        &mut self,
        source: &GraphObjectId,
        target: &GraphObjectId,
        key: EdgeKey,
    ) -> Option<EdgeValue> {
        let idx = self.find_edge(source, target, key)?;
        self.topology.remove_edge(idx)
    }

    /// Mutable access to the underlying petgraph, for in-place annotation.
    /// Callers must not add or remove vertices through it.
    pub(crate) fn topology_mut(&mut self) -> &mut StableGraph<NodeLabel, EdgeValue, Directed, u32> {
        &mut self.topology
    }
}

/// Structural equality: same graph value, same labelled vertices, same keyed
/// edges. petgraph indices are ignored, so a graph rebuilt from a flat list
/// compares equal to the original.
impl PartialEq for AudioGraph {
    fn eq(&self, other: &Self) -> bool {
        if self.value != other.value
            || self.node_count() != other.node_count()
            || self.edge_count() != other.edge_count()
        {
            return false;
        }
        let nodes_equal = self
            .nodes()
            .all(|label| other.node(&label.id) == Some(label));
        nodes_equal
            && self.edges().all(|edge| {
                other.edge(edge.source, edge.target, edge.key()) == Some(edge.value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::AudioEdge;

    fn label(id: &str, node_type: &str) -> NodeLabel {
        NodeLabel {
            id: id.into(),
            label: node_type.into(),
            node_type: node_type.into(),
            color: None,
            width: 150.0,
            height: 50.0,
            x: None,
            y: None,
        }
    }

    fn node_edge(output: u32, input: u32) -> EdgeValue {
        EdgeValue::new(AudioEdge::Node {
            source_output_index: output,
            destination_input_index: input,
        })
    }

    fn two_node_graph() -> AudioGraph {
        let mut graph = AudioGraph::new();
        graph.set_node(label("n0", "gain"));
        graph.set_node(label("n1", "oscillator"));
        graph
    }

    #[test]
    fn set_node_replaces_existing_label() {
        let mut graph = two_node_graph();
        let first = graph.node_index(&"n0".into()).unwrap();
        let again = graph.set_node(label("n0", "delay"));
        assert_eq!(first, again);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.node(&"n0".into()).unwrap().node_type, "delay");
    }

    #[test]
    fn parallel_edges_are_distinct_by_key() {
        let mut graph = two_node_graph();
        let (n1, n0) = ("n1".into(), "n0".into());
        assert!(graph.set_edge(&n1, &n0, node_edge(0, 0)));
        assert!(graph.set_edge(&n1, &n0, node_edge(1, 0)));
        assert!(graph.set_edge(&n1, &n0, node_edge(0, 0)));
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.has_edge(&n1, &n0, EdgeKey::Channels { output: 1, input: 0 }));
    }

    #[test]
    fn edges_resolve_endpoint_ids() {
        let mut graph = two_node_graph();
        let (n1, n0) = ("n1".into(), "n0".into());
        graph.set_edge(&n1, &n0, node_edge(0, 0));
        let edges: Vec<_> = graph.edges().collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, &n1);
        assert_eq!(edges[0].target, &n0);
    }

    #[test]
    fn set_edge_with_missing_endpoint_is_noop() {
        let mut graph = two_node_graph();
        assert!(!graph.set_edge(&"n1".into(), &"ghost".into(), node_edge(0, 0)));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn remove_node_drops_incident_edges() {
        let mut graph = two_node_graph();
        graph.set_node(label("n2", "destination"));
        let (n0, n1, n2) = ("n0".into(), "n1".into(), "n2".into());
        graph.set_edge(&n1, &n0, node_edge(0, 0));
        graph.set_edge(&n0, &n2, node_edge(0, 0));
        graph.set_edge(&n1, &n2, node_edge(0, 0));

        assert!(graph.remove_node(&n0).is_some());
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.incident_edges(&n0).count(), 0);
        assert!(graph.node_index(&n0).is_none());
        // Surviving indices still resolve.
        assert_eq!(graph.node(&n2).unwrap().node_type, "destination");
    }

    #[test]
    fn remove_edge_by_key() {
        let mut graph = two_node_graph();
        let (n1, n0) = ("n1".into(), "n0".into());
        graph.set_edge(&n1, &n0, node_edge(0, 0));
        graph.set_edge(&n1, &n0, node_edge(0, 1));
        let removed = graph.remove_edge(&n1, &n0, EdgeKey::Channels { output: 0, input: 1 });
        assert!(removed.is_some());
        assert!(graph
            .remove_edge(&n1, &n0, EdgeKey::Channels { output: 0, input: 1 })
            .is_none());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn structural_equality_ignores_indices() {
        let mut a = AudioGraph::new();
        a.set_node(label("x", "gain"));
        a.set_node(label("n0", "gain"));
        a.set_node(label("n1", "oscillator"));
        a.remove_node(&"x".into());
        a.set_edge(&"n1".into(), &"n0".into(), node_edge(0, 0));

        let mut b = AudioGraph::new();
        b.set_node(label("n1", "oscillator"));
        b.set_node(label("n0", "gain"));
        b.set_edge(&"n1".into(), &"n0".into(), node_edge(0, 0));

        assert_eq!(a, b);
        b.value.rankdir = Some(RankDir::TB);
        assert_ne!(a, b);
    }
}

//! Patch-based hydration.
//!
//! A receiver that keeps one hydrated copy per context (the layout worker)
//! does not need to rebuild the topology for every update. [`hydrate`]
//! patches the previous copy in place when the update is a later state of the
//! same context, preserving layout geometry the update does not carry, and
//! falls back to a full [`deserialize`] otherwise.

use std::collections::HashSet;

use audion_core::{EdgeKey, GraphContext, GraphObjectId, NodeLabel};

use crate::convert::{check_edge, deserialize, HydratedContext};
use crate::error::TransferError;
use crate::serialized::{SerializedGraph, SerializedGraphContext};

/// What a hydration changed in the topology.
///
/// Tracks three categories per element kind: added (not in the previous
/// copy), updated (present but different), and removed (present before but
/// not in the update).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphPatch {
    /// The previous copy was discarded and rebuilt from scratch.
    pub full: bool,
    pub added_nodes: usize,
    pub updated_nodes: usize,
    pub removed_nodes: usize,
    pub added_edges: usize,
    pub updated_edges: usize,
    pub removed_edges: usize,
}

impl GraphPatch {
    /// Returns true if the topology is unchanged.
    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }

    /// Total count of changed vertices and edges.
    pub fn total(&self) -> usize {
        self.added_nodes
            + self.updated_nodes
            + self.removed_nodes
            + self.added_edges
            + self.updated_edges
            + self.removed_edges
    }

    fn rebuilt(hydrated: &HydratedContext) -> Self {
        let (nodes, edges) = match hydrated {
            HydratedContext::Live(ctx) => (ctx.graph.node_count(), ctx.graph.edge_count()),
            HydratedContext::Destroyed(_) => (0, 0),
        };
        GraphPatch {
            full: true,
            added_nodes: nodes,
            added_edges: edges,
            ..GraphPatch::default()
        }
    }
}

/// Merges `update` into `previous`.
///
/// Patches in place when `previous` is a live copy of the same context and
/// the update's event count is not lower (a lower count means the context
/// was recreated). Every other combination rebuilds from `update`.
pub fn hydrate(
    previous: Option<HydratedContext>,
    update: SerializedGraphContext,
) -> Result<(HydratedContext, GraphPatch), TransferError> {
    match previous {
        Some(HydratedContext::Live(mut ctx))
            if ctx.id == update.id
                && !update.is_destroyed()
                && update.event_count >= ctx.event_count =>
        {
            let patch = patch_context(&mut ctx, update)?;
            Ok((HydratedContext::Live(ctx), patch))
        }
        _ => {
            let hydrated = deserialize(update)?;
            let patch = GraphPatch::rebuilt(&hydrated);
            Ok((hydrated, patch))
        }
    }
}

fn patch_context(
    ctx: &mut GraphContext,
    update: SerializedGraphContext,
) -> Result<GraphPatch, TransferError> {
    let id = update.id;
    let missing = |field: &'static str| TransferError::PartialContext {
        id: id.clone(),
        missing: field,
    };
    let context = update.context.ok_or_else(|| missing("context"))?;
    let realtime_data = update.realtime_data.ok_or_else(|| missing("realtimeData"))?;
    let nodes = update.nodes.ok_or_else(|| missing("nodes"))?;
    let params = update.params.ok_or_else(|| missing("params"))?;
    let graph = update.graph.ok_or_else(|| missing("graph"))?;

    validate(&graph)?;
    let patch = patch_graph(ctx, graph);

    ctx.event_count = update.event_count;
    ctx.context = context;
    ctx.realtime_data = realtime_data;
    ctx.nodes = nodes;
    ctx.params = params;
    Ok(patch)
}

/// Checks the whole update before touching the previous copy, so a bad
/// update leaves it intact.
fn validate(graph: &SerializedGraph) -> Result<(), TransferError> {
    let mut vertices = HashSet::new();
    for node in &graph.nodes {
        if node.v != node.value.id {
            return Err(TransferError::VertexMismatch {
                v: node.v.clone(),
                label: node.value.id.clone(),
            });
        }
        if !vertices.insert(&node.v) {
            return Err(TransferError::DuplicateVertex(node.v.clone()));
        }
    }
    for edge in &graph.edges {
        check_edge(edge)?;
        if !vertices.contains(&edge.v) || !vertices.contains(&edge.w) {
            return Err(TransferError::MissingVertex {
                source_id: edge.v.clone(),
                target_id: edge.w.clone(),
            });
        }
    }
    Ok(())
}

fn patch_graph(ctx: &mut GraphContext, update: SerializedGraph) -> GraphPatch {
    let mut patch = GraphPatch::default();
    let topology = &mut ctx.graph;

    let keep_vertices: HashSet<GraphObjectId> =
        update.nodes.iter().map(|node| node.v.clone()).collect();
    let keep_edges: HashSet<(GraphObjectId, GraphObjectId, EdgeKey)> = update
        .edges
        .iter()
        .map(|edge| (edge.v.clone(), edge.w.clone(), edge.name))
        .collect();

    // Stale edges first, then stale vertices (which would take edges along).
    let stale_edges: Vec<_> = topology
        .edges()
        .map(|edge| (edge.source.clone(), edge.target.clone(), edge.key()))
        .filter(|key| !keep_edges.contains(key))
        .collect();
    for (source, target, key) in stale_edges {
        topology.remove_edge(&source, &target, key);
        patch.removed_edges += 1;
    }
    let stale_vertices: Vec<GraphObjectId> = topology
        .nodes()
        .map(|label| label.id.clone())
        .filter(|id| !keep_vertices.contains(id))
        .collect();
    for id in stale_vertices {
        topology.remove_node(&id);
        patch.removed_nodes += 1;
    }

    for node in update.nodes {
        match topology.node_mut(&node.v) {
            Some(existing) => {
                let merged = merge_label(existing, node.value);
                if *existing != merged {
                    *existing = merged;
                    patch.updated_nodes += 1;
                }
            }
            None => {
                topology.set_node(node.value);
                patch.added_nodes += 1;
            }
        }
    }

    for edge in update.edges {
        match topology.edge_mut(&edge.v, &edge.w, edge.name) {
            Some(existing) => {
                let mut value = edge.value;
                if value.points.is_empty() {
                    value.points = existing.points.clone();
                }
                if *existing != value {
                    *existing = value;
                    patch.updated_edges += 1;
                }
            }
            None => {
                topology.set_edge(&edge.v, &edge.w, edge.value);
                patch.added_edges += 1;
            }
        }
    }

    let mut value = update.value;
    value.width = value.width.or(topology.value.width);
    value.height = value.height.or(topology.value.height);
    topology.value = value;

    patch
}

/// The update's label, with the previous position kept when the update has
/// none.
fn merge_label(existing: &NodeLabel, mut update: NodeLabel) -> NodeLabel {
    if update.x.is_none() && update.y.is_none() {
        update.x = existing.x;
        update.y = existing.y;
    }
    update
}

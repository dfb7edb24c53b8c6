//! Layered layout for context topologies.
//!
//! [`LayoutEngine`] is the seam between the model and whatever positions its
//! vertices. [`LayeredLayout`] is the built-in engine: it ranks vertices by
//! longest path from the sources (ignoring DFS back edges, so feedback loops
//! do not explode the rank count), orders each rank by the barycenter of its
//! predecessors, and places ranks along the configured direction.
//!
//! Positions follow the usual layered-graph convention: a vertex's `x`/`y` is
//! its center; edge `points` run from source center to target center; the
//! graph value receives the overall `width`/`height`.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use petgraph::visit::{depth_first_search, Control, DfsEvent, EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};

use crate::edge::Point;
use crate::graph::{AudioGraph, RankDir};

fn default_sep() -> f64 {
    50.0
}

/// Options a render surface may send to the layout worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOptions {
    #[serde(default)]
    pub rankdir: RankDir,
    /// Gap between vertices in the same rank.
    #[serde(default = "default_sep")]
    pub nodesep: f64,
    /// Gap between ranks.
    #[serde(default = "default_sep")]
    pub ranksep: f64,
    #[serde(default)]
    pub marginx: f64,
    #[serde(default)]
    pub marginy: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        LayoutOptions {
            rankdir: RankDir::LR,
            nodesep: default_sep(),
            ranksep: default_sep(),
            marginx: 0.0,
            marginy: 0.0,
        }
    }
}

/// Assigns coordinates to a topology in place.
pub trait LayoutEngine: Send + Sync {
    fn layout(&self, graph: &mut AudioGraph, options: &LayoutOptions);
}

/// Longest-path layered layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayeredLayout;

impl LayoutEngine for LayeredLayout {
    fn layout(&self, graph: &mut AudioGraph, options: &LayoutOptions) {
        graph.value.rankdir = Some(options.rankdir);
        graph.value.nodesep = Some(options.nodesep);
        graph.value.ranksep = Some(options.ranksep);

        let ranks = order_ranks(graph, assign_ranks(graph));
        let horizontal = matches!(options.rankdir, RankDir::LR | RankDir::RL);
        let topology = graph.topology();

        // Extent of a vertex along the rank axis and across it.
        let extent = |idx: NodeIndex<u32>| {
            let label = &topology[idx];
            if horizontal {
                (label.width, label.height)
            } else {
                (label.height, label.width)
            }
        };

        let thickness: Vec<f64> = ranks
            .iter()
            .map(|rank| rank.iter().map(|&idx| extent(idx).0).fold(0.0, f64::max))
            .collect();
        let breadth: Vec<f64> = ranks
            .iter()
            .map(|rank| {
                let sizes: f64 = rank.iter().map(|&idx| extent(idx).1).sum();
                sizes + options.nodesep * rank.len().saturating_sub(1) as f64
            })
            .collect();
        let total_depth = thickness.iter().sum::<f64>()
            + options.ranksep * ranks.len().saturating_sub(1) as f64;
        let total_breadth = breadth.iter().copied().fold(0.0, f64::max);

        let mut centers: HashMap<NodeIndex<u32>, (f64, f64)> = HashMap::new();
        let mut depth = 0.0;
        for (r, rank) in ranks.iter().enumerate() {
            let along = depth + thickness[r] / 2.0;
            let along = match options.rankdir {
                RankDir::RL | RankDir::BT => total_depth - along,
                RankDir::LR | RankDir::TB => along,
            };
            let mut across = (total_breadth - breadth[r]) / 2.0;
            for &idx in rank {
                let size = extent(idx).1;
                let center = across + size / 2.0;
                let (x, y) = if horizontal {
                    (along, center)
                } else {
                    (center, along)
                };
                centers.insert(idx, (x + options.marginx, y + options.marginy));
                across += size + options.nodesep;
            }
            depth += thickness[r] + options.ranksep;
        }

        let edge_points: Vec<_> = topology
            .edge_references()
            .map(|edge| {
                let (sx, sy) = centers[&edge.source()];
                let (tx, ty) = centers[&edge.target()];
                let points = vec![
                    Point { x: sx, y: sy },
                    Point {
                        x: (sx + tx) / 2.0,
                        y: (sy + ty) / 2.0,
                    },
                    Point { x: tx, y: ty },
                ];
                (edge.id(), points)
            })
            .collect();

        let (width, height) = if horizontal {
            (total_depth, total_breadth)
        } else {
            (total_breadth, total_depth)
        };
        graph.value.width = Some(width + 2.0 * options.marginx);
        graph.value.height = Some(height + 2.0 * options.marginy);

        let topology = graph.topology_mut();
        for (idx, (x, y)) in centers {
            let label = &mut topology[idx];
            label.x = Some(x);
            label.y = Some(y);
        }
        for (idx, points) in edge_points {
            topology[idx].points = points;
        }
    }
}

/// Longest-path rank for every vertex, ignoring back edges.
fn assign_ranks(graph: &AudioGraph) -> HashMap<NodeIndex<u32>, usize> {
    let topology = graph.topology();

    let mut back_edges = HashSet::new();
    depth_first_search(topology, topology.node_indices(), |event| {
        if let DfsEvent::BackEdge(from, to) = event {
            back_edges.insert((from, to));
        }
        Control::<()>::Continue
    });

    let forward: Vec<(NodeIndex<u32>, NodeIndex<u32>)> = topology
        .edge_references()
        .map(|edge| (edge.source(), edge.target()))
        .filter(|pair| !back_edges.contains(pair))
        .collect();

    let mut indegree: HashMap<NodeIndex<u32>, usize> =
        topology.node_indices().map(|idx| (idx, 0)).collect();
    for (_, to) in &forward {
        *indegree.entry(*to).or_default() += 1;
    }

    let mut rank: HashMap<NodeIndex<u32>, usize> = HashMap::new();
    let mut queue: VecDeque<NodeIndex<u32>> = topology
        .node_indices()
        .filter(|idx| indegree[idx] == 0)
        .collect();
    for idx in &queue {
        rank.insert(*idx, 0);
    }
    while let Some(from) = queue.pop_front() {
        let next = rank[&from] + 1;
        for (_, to) in forward.iter().filter(|(src, _)| *src == from) {
            let entry = rank.entry(*to).or_insert(0);
            *entry = (*entry).max(next);
            if let Some(remaining) = indegree.get_mut(to) {
                *remaining -= 1;
                if *remaining == 0 {
                    queue.push_back(*to);
                }
            }
        }
    }
    rank
}

/// Groups vertices by rank and orders each rank by predecessor barycenter.
fn order_ranks(
    graph: &AudioGraph,
    rank: HashMap<NodeIndex<u32>, usize>,
) -> Vec<Vec<NodeIndex<u32>>> {
    let topology = graph.topology();
    let depth = rank.values().copied().max().map_or(1, |max| max + 1);
    let mut ranks: Vec<Vec<NodeIndex<u32>>> = vec![Vec::new(); depth];
    for idx in topology.node_indices() {
        let r = rank.get(&idx).copied().unwrap_or(0);
        ranks[r].push(idx);
    }

    let mut position: HashMap<NodeIndex<u32>, f64> = HashMap::new();
    for layer in ranks.iter_mut() {
        let barycenter = |idx: &NodeIndex<u32>| {
            let placed: Vec<f64> = topology
                .neighbors_directed(*idx, petgraph::Direction::Incoming)
                .filter_map(|pred| position.get(&pred).copied())
                .collect();
            if placed.is_empty() {
                None
            } else {
                Some(placed.iter().sum::<f64>() / placed.len() as f64)
            }
        };
        let mut keyed: Vec<(f64, usize, NodeIndex<u32>)> = layer
            .iter()
            .enumerate()
            .map(|(i, idx)| (barycenter(idx).unwrap_or(i as f64), i, *idx))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        *layer = keyed.into_iter().map(|(_, _, idx)| idx).collect();
        for (i, idx) in layer.iter().enumerate() {
            position.insert(*idx, i as f64);
        }
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{AudioEdge, EdgeValue};
    use crate::id::GraphObjectId;
    use crate::node::{NodeLabel, NODE_HEIGHT, NODE_WIDTH};

    fn label(id: &str) -> NodeLabel {
        NodeLabel {
            id: id.into(),
            label: "gain".into(),
            node_type: "gain".into(),
            color: None,
            width: NODE_WIDTH,
            height: NODE_HEIGHT,
            x: None,
            y: None,
        }
    }

    fn connect(graph: &mut AudioGraph, from: &str, to: &str) {
        graph.set_edge(
            &from.into(),
            &to.into(),
            EdgeValue::new(AudioEdge::Node {
                source_output_index: 0,
                destination_input_index: 0,
            }),
        );
    }

    fn chain() -> AudioGraph {
        let mut graph = AudioGraph::new();
        for id in ["osc", "gain", "out"] {
            graph.set_node(label(id));
        }
        connect(&mut graph, "osc", "gain");
        connect(&mut graph, "gain", "out");
        graph
    }

    fn x_of(graph: &AudioGraph, id: &str) -> f64 {
        graph.node(&GraphObjectId::from(id)).unwrap().x.unwrap()
    }

    fn y_of(graph: &AudioGraph, id: &str) -> f64 {
        graph.node(&GraphObjectId::from(id)).unwrap().y.unwrap()
    }

    #[test]
    fn left_to_right_chain_advances_along_x() {
        let mut graph = chain();
        LayeredLayout.layout(&mut graph, &LayoutOptions::default());

        assert!(graph.nodes().all(NodeLabel::is_positioned));
        assert!(x_of(&graph, "osc") < x_of(&graph, "gain"));
        assert!(x_of(&graph, "gain") < x_of(&graph, "out"));
        assert_eq!(y_of(&graph, "osc"), y_of(&graph, "out"));

        // Three ranks of width 150 separated by 50.
        assert_eq!(graph.value.width, Some(550.0));
        assert_eq!(graph.value.height, Some(NODE_HEIGHT));
        assert_eq!(graph.value.rankdir, Some(RankDir::LR));
    }

    #[test]
    fn reversed_directions_mirror_the_rank_axis() {
        let mut graph = chain();
        let options = LayoutOptions {
            rankdir: RankDir::BT,
            ..LayoutOptions::default()
        };
        LayeredLayout.layout(&mut graph, &options);
        assert!(y_of(&graph, "osc") > y_of(&graph, "gain"));
        assert!(y_of(&graph, "gain") > y_of(&graph, "out"));
    }

    #[test]
    fn edges_receive_points() {
        let mut graph = chain();
        LayeredLayout.layout(&mut graph, &LayoutOptions::default());
        for edge in graph.edges() {
            assert_eq!(edge.value.points.len(), 3);
        }
    }

    #[test]
    fn feedback_loop_still_terminates() {
        let mut graph = chain();
        connect(&mut graph, "out", "osc");
        LayeredLayout.layout(&mut graph, &LayoutOptions::default());
        assert!(graph.nodes().all(NodeLabel::is_positioned));
    }

    #[test]
    fn options_parse_with_defaults() {
        let options: LayoutOptions = serde_json::from_str(r#"{"rankdir":"TB"}"#).unwrap();
        assert_eq!(options.rankdir, RankDir::TB);
        assert_eq!(options.nodesep, 50.0);
    }
}

//! Serialize/deserialize conversions between live contexts and their
//! transferable form.
//!
//! [`serialize`] flattens a [`ContextUpdate`] into a
//! [`SerializedGraphContext`]. [`deserialize`] rebuilds the live shape,
//! re-creating the topology from its vertex and edge lists. For every
//! reachable context `x`, `deserialize(serialize(x))` is structurally equal to
//! `x`; the deletion sentinel round-trips to [`HydratedContext::Destroyed`].

use audion_core::{AudioGraph, ContextUpdate, GraphContext, GraphObjectId};

use crate::error::TransferError;
use crate::serialized::{
    GraphOptions, SerializedEdge, SerializedGraph, SerializedGraphContext, SerializedNode,
};

/// A context reconstructed on the receiving side.
#[derive(Debug, Clone, PartialEq)]
pub enum HydratedContext {
    Live(GraphContext),
    Destroyed(GraphObjectId),
}

impl HydratedContext {
    pub fn id(&self) -> &GraphObjectId {
        match self {
            HydratedContext::Live(ctx) => &ctx.id,
            HydratedContext::Destroyed(id) => id,
        }
    }

    /// Borrows this context as an update, ready to serialize again.
    pub fn as_update(&self) -> ContextUpdate<'_> {
        match self {
            HydratedContext::Live(ctx) => ContextUpdate::Changed(ctx),
            HydratedContext::Destroyed(id) => ContextUpdate::Destroyed(id),
        }
    }
}

/// Flattens one integrator emission.
pub fn serialize(update: ContextUpdate<'_>) -> SerializedGraphContext {
    match update {
        ContextUpdate::Changed(ctx) => SerializedGraphContext {
            id: ctx.id.clone(),
            event_count: ctx.event_count,
            context: Some(ctx.context.clone()),
            realtime_data: Some(ctx.realtime_data),
            nodes: Some(ctx.nodes.clone()),
            params: Some(ctx.params.clone()),
            graph: Some(serialize_graph(&ctx.graph)),
        },
        ContextUpdate::Destroyed(id) => SerializedGraphContext::destroyed(id.clone()),
    }
}

/// Flattens a topology into vertex and edge lists.
pub fn serialize_graph(graph: &AudioGraph) -> SerializedGraph {
    let nodes = graph
        .nodes()
        .map(|label| SerializedNode {
            v: label.id.clone(),
            value: label.clone(),
        })
        .collect();

    let edges = graph
        .edges()
        .map(|edge| SerializedEdge {
            v: edge.source.clone(),
            w: edge.target.clone(),
            name: edge.key(),
            value: edge.value.clone(),
        })
        .collect();

    SerializedGraph {
        options: GraphOptions::default(),
        nodes,
        edges,
        value: graph.value.clone(),
    }
}

/// Rebuilds a live context, or recognizes the deletion sentinel.
pub fn deserialize(serialized: SerializedGraphContext) -> Result<HydratedContext, TransferError> {
    if serialized.is_destroyed() {
        return Ok(HydratedContext::Destroyed(serialized.id));
    }
    let id = serialized.id;
    let missing = |field: &'static str| TransferError::PartialContext {
        id: id.clone(),
        missing: field,
    };

    let context = serialized.context.ok_or_else(|| missing("context"))?;
    let realtime_data = serialized
        .realtime_data
        .ok_or_else(|| missing("realtimeData"))?;
    let nodes = serialized.nodes.ok_or_else(|| missing("nodes"))?;
    let params = serialized.params.ok_or_else(|| missing("params"))?;
    let graph = serialized.graph.ok_or_else(|| missing("graph"))?;

    Ok(HydratedContext::Live(GraphContext {
        id: id.clone(),
        event_count: serialized.event_count,
        context,
        realtime_data,
        nodes,
        params,
        graph: deserialize_graph(graph)?,
    }))
}

/// Rebuilds a topology from vertex and edge lists.
pub fn deserialize_graph(serialized: SerializedGraph) -> Result<AudioGraph, TransferError> {
    let mut graph = AudioGraph::new();
    graph.value = serialized.value;

    for node in serialized.nodes {
        if node.v != node.value.id {
            return Err(TransferError::VertexMismatch {
                v: node.v,
                label: node.value.id,
            });
        }
        if graph.has_node(&node.v) {
            return Err(TransferError::DuplicateVertex(node.v));
        }
        graph.set_node(node.value);
    }

    for edge in serialized.edges {
        check_edge(&edge)?;
        if !graph.set_edge(&edge.v, &edge.w, edge.value) {
            return Err(TransferError::MissingVertex {
                source_id: edge.v,
                target_id: edge.w,
            });
        }
    }

    Ok(graph)
}

/// An edge's name must agree with the key its value implies.
pub(crate) fn check_edge(edge: &SerializedEdge) -> Result<(), TransferError> {
    let key = edge.value.key();
    if edge.name != key {
        return Err(TransferError::EdgeKeyMismatch {
            source_id: edge.v.clone(),
            target_id: edge.w.clone(),
            name: edge.name,
            key,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use audion_core::protocol::*;
    use audion_core::{
        AudioEdge, EdgeKey, GraphIntegrator, LayeredLayout, LayoutEngine, LayoutOptions,
        WebAudioEvent,
    };
    use serde_json::json;

    fn event(method: &str, params: serde_json::Value) -> WebAudioEvent {
        WebAudioEvent::parse(method, params).unwrap().unwrap()
    }

    /// c0 with a gain, an oscillator feeding it, and an LFO on the gain param.
    fn build_integrator() -> GraphIntegrator {
        let mut integrator = GraphIntegrator::default();
        let events = vec![
            event(
                method::CONTEXT_CREATED,
                json!({"context": {"contextId": "c0", "contextType": "realtime",
                    "contextState": "running", "sampleRate": 44100,
                    "callbackBufferSize": 512, "maxOutputChannelCount": 2}}),
            ),
            event(
                method::AUDIO_NODE_CREATED,
                json!({"node": {"nodeId": "n0", "contextId": "c0", "nodeType": "gain",
                    "numberOfInputs": 1, "numberOfOutputs": 1}}),
            ),
            event(
                method::AUDIO_NODE_CREATED,
                json!({"node": {"nodeId": "n1", "contextId": "c0", "nodeType": "oscillator",
                    "numberOfInputs": 0, "numberOfOutputs": 1}}),
            ),
            event(
                method::AUDIO_NODE_CREATED,
                json!({"node": {"nodeId": "n2", "contextId": "c0", "nodeType": "oscillator",
                    "numberOfInputs": 0, "numberOfOutputs": 1}}),
            ),
            event(
                method::AUDIO_PARAM_CREATED,
                json!({"param": {"paramId": "p0", "nodeId": "n0", "contextId": "c0",
                    "paramType": "gain", "rate": "a-rate", "defaultValue": 1,
                    "minValue": -1, "maxValue": 1}}),
            ),
            event(
                method::NODES_CONNECTED,
                json!({"contextId": "c0", "sourceId": "n1", "destinationId": "n0"}),
            ),
            event(
                method::NODE_PARAM_CONNECTED,
                json!({"contextId": "c0", "sourceId": "n2", "destinationId": "p0"}),
            ),
        ];
        for event in events {
            integrator.apply(event, |_| {}).unwrap();
        }
        integrator
    }

    #[test]
    fn live_context_round_trips() {
        let integrator = build_integrator();
        let ctx = integrator.context(&"c0".into()).unwrap();

        let serialized = serialize(ContextUpdate::Changed(ctx));
        let graph = serialized.graph.as_ref().unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);
        assert!(graph.options.multigraph);

        let back = deserialize(serialized).unwrap();
        assert_eq!(back, HydratedContext::Live(ctx.clone()));
    }

    #[test]
    fn round_trip_survives_json_and_layout() {
        let integrator = build_integrator();
        let mut ctx = integrator.context(&"c0".into()).unwrap().clone();
        LayeredLayout.layout(&mut ctx.graph, &LayoutOptions::default());

        let text = serde_json::to_string(&serialize(ContextUpdate::Changed(&ctx))).unwrap();
        let parsed: SerializedGraphContext = serde_json::from_str(&text).unwrap();
        assert_eq!(deserialize(parsed).unwrap(), HydratedContext::Live(ctx));
    }

    #[test]
    fn sentinel_round_trips() {
        let id: GraphObjectId = "c0".into();
        let serialized = serialize(ContextUpdate::Destroyed(&id));
        assert_eq!(
            serde_json::to_value(&serialized).unwrap(),
            json!({"id": "c0", "eventCount": 0, "context": null, "realtimeData": null,
                   "nodes": null, "params": null, "graph": null})
        );
        assert_eq!(
            deserialize(serialized).unwrap(),
            HydratedContext::Destroyed(id)
        );
    }

    #[test]
    fn edge_wire_shape_uses_key_as_name() {
        let integrator = build_integrator();
        let ctx = integrator.context(&"c0".into()).unwrap();
        let graph = serialize_graph(&ctx.graph);
        let json = serde_json::to_value(&graph).unwrap();
        let edges = json["edges"].as_array().unwrap();
        assert!(edges.contains(&json!({
            "v": "n1", "w": "n0", "name": "0,0",
            "value": {"type": "node", "sourceOutputIndex": 0, "destinationInputIndex": 0}
        })));
        assert!(edges.contains(&json!({
            "v": "n2", "w": "n0", "name": "0",
            "value": {"type": "param", "sourceOutputIndex": 0, "destinationParamId": "p0"}
        })));
    }

    #[test]
    fn partially_null_context_is_rejected() {
        let integrator = build_integrator();
        let ctx = integrator.context(&"c0".into()).unwrap();
        let mut serialized = serialize(ContextUpdate::Changed(ctx));
        serialized.graph = None;
        assert!(matches!(
            deserialize(serialized),
            Err(TransferError::PartialContext { missing: "graph", .. })
        ));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let integrator = build_integrator();
        let ctx = integrator.context(&"c0".into()).unwrap();
        let mut graph = serialize_graph(&ctx.graph);
        graph.nodes.retain(|node| node.v.as_str() != "n1");
        assert!(matches!(
            deserialize_graph(graph),
            Err(TransferError::MissingVertex { .. })
        ));
    }

    #[test]
    fn mismatched_edge_name_is_rejected() {
        let integrator = build_integrator();
        let ctx = integrator.context(&"c0".into()).unwrap();
        let mut graph = serialize_graph(&ctx.graph);
        for edge in graph.edges.iter_mut() {
            if matches!(edge.value.edge, AudioEdge::Node { .. }) {
                edge.name = EdgeKey::Channels { output: 3, input: 3 };
            }
        }
        assert!(matches!(
            deserialize_graph(graph),
            Err(TransferError::EdgeKeyMismatch { .. })
        ));
    }
}

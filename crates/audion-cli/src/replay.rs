//! Folding a recorded event log into graph contexts.
//!
//! A log holds one debugger event per line, as `{"method": ..., "params":
//! ...}` (extra CDP fields such as `sessionId` are ignored). Blank lines and
//! methods outside the `WebAudio` event vocabulary are skipped.

use std::fmt::Write as _;
use std::io::BufRead;

use indexmap::IndexMap;

use audion_core::{
    ContextUpdate, CoreError, GraphIntegrator, GraphObjectId, IntegratorOptions, LayeredLayout,
    LayoutEngine, LayoutOptions, Outcome, ProtocolEvent, WebAudioEvent,
};
use audion_transfer::{deserialize, serialize, HydratedContext, SerializedGraphContext, TransferError};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read event log: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: not a protocol event: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },

    #[error("line {line}: {source}")]
    Event { line: usize, source: CoreError },
}

/// The state left behind by a replayed log.
#[derive(Debug, Default)]
pub struct Replay {
    /// Live contexts at the end of the log, in creation order.
    pub all_graphs: IndexMap<GraphObjectId, SerializedGraphContext>,
    /// WebAudio events applied.
    pub events: usize,
    /// Lines that were blank or outside the WebAudio vocabulary.
    pub skipped: usize,
    /// Events that referenced objects the log never created.
    pub missed: usize,
    /// Events the integrator refused, with their line numbers.
    pub rejected: Vec<(usize, CoreError)>,
}

/// Replays every event of `reader` through a fresh integrator.
pub fn replay(reader: impl BufRead, options: IntegratorOptions) -> Result<Replay, ReplayError> {
    let mut integrator = GraphIntegrator::new(options);
    let mut result = Replay::default();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        if line.trim().is_empty() {
            result.skipped += 1;
            continue;
        }

        let raw: ProtocolEvent = serde_json::from_str(&line).map_err(|source| ReplayError::Json {
            line: line_no,
            source,
        })?;
        let event = match WebAudioEvent::from_protocol(raw) {
            Ok(Some(event)) => event,
            Ok(None) => {
                result.skipped += 1;
                continue;
            }
            Err(source) => {
                return Err(ReplayError::Event {
                    line: line_no,
                    source,
                })
            }
        };

        result.events += 1;
        match integrator.apply(event, |_| {}) {
            Ok(Outcome::Ignored(_)) => result.missed += 1,
            Ok(_) => {}
            Err(error) => result.rejected.push((line_no, error)),
        }
    }

    // Taken from the integrator, so changes that emit nothing still count.
    result.all_graphs = integrator
        .contexts()
        .map(|ctx| (ctx.id.clone(), serialize(ContextUpdate::Changed(ctx))))
        .collect();
    Ok(result)
}

/// Positions the vertices of every context with the layered layout.
pub fn lay_out(
    all_graphs: &mut IndexMap<GraphObjectId, SerializedGraphContext>,
    options: &LayoutOptions,
) -> Result<(), TransferError> {
    for serialized in all_graphs.values_mut() {
        if let HydratedContext::Live(mut ctx) = deserialize(serialized.clone())? {
            LayeredLayout.layout(&mut ctx.graph, options);
            *serialized = serialize(ContextUpdate::Changed(&ctx));
        }
    }
    Ok(())
}

/// A human-readable digest of a replay.
pub fn summary(replay: &Replay) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} events applied, {} lines skipped, {} missed, {} rejected",
        replay.events,
        replay.skipped,
        replay.missed,
        replay.rejected.len()
    );
    for (line, error) in &replay.rejected {
        let _ = writeln!(out, "line {line}: {error}");
    }
    for (id, serialized) in &replay.all_graphs {
        let nodes = serialized.nodes.as_ref().map_or(0, |n| n.len());
        let params = serialized.params.as_ref().map_or(0, |p| p.len());
        let edges = serialized.graph.as_ref().map_or(0, |g| g.edges.len());
        let kind = serialized
            .context
            .as_ref()
            .and_then(|c| serde_json::to_value(c.context_type).ok())
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{id} ({kind}): {nodes} nodes, {edges} edges, {params} params after {} events",
            serialized.event_count
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"{"method":"WebAudio.contextCreated","params":{"context":{"contextId":"c0","contextType":"realtime"}}}
{"method":"WebAudio.audioNodeCreated","params":{"node":{"nodeId":"n0","contextId":"c0","nodeType":"GainNode","numberOfInputs":1,"numberOfOutputs":1}}}

{"method":"Page.frameNavigated","params":{}}
{"method":"WebAudio.audioNodeCreated","params":{"node":{"nodeId":"n1","contextId":"c0","nodeType":"AudioBufferSourceNode","numberOfInputs":0,"numberOfOutputs":1}}}
{"method":"WebAudio.nodesConnected","params":{"contextId":"c0","sourceId":"n1","destinationId":"n0"}}
{"method":"WebAudio.contextCreated","params":{"context":{"contextId":"c1","contextType":"offline"}}}
{"method":"WebAudio.contextWillBeDestroyed","params":{"contextId":"c1"}}
{"method":"WebAudio.audioNodeCreated","params":{"node":{"nodeId":"n9","contextId":"c9","nodeType":"GainNode"}}}
"#;

    #[test]
    fn replays_a_log() {
        let replay = replay(LOG.as_bytes(), IntegratorOptions::default()).unwrap();
        assert_eq!(replay.events, 7);
        assert_eq!(replay.skipped, 2);
        assert_eq!(replay.missed, 1);
        assert_eq!(replay.all_graphs.len(), 1);

        let c0 = &replay.all_graphs["c0"];
        assert_eq!(c0.nodes.as_ref().unwrap().len(), 2);
        assert_eq!(c0.graph.as_ref().unwrap().edges.len(), 1);
    }

    #[test]
    fn bad_lines_report_their_number() {
        let log = "{\"method\":\"WebAudio.contextCreated\",\"params\":{\"context\":{\"contextId\":\"c0\"}}}\nnot json\n";
        match replay(log.as_bytes(), IntegratorOptions::default()) {
            Err(ReplayError::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result {other:?}"),
        }

        let log = "{\"method\":\"WebAudio.nodesConnected\",\"params\":{\"contextId\":1}}\n";
        assert!(matches!(
            replay(log.as_bytes(), IntegratorOptions::default()),
            Err(ReplayError::Event { line: 1, .. })
        ));
    }

    #[test]
    fn layout_positions_every_vertex() {
        let mut replay = replay(LOG.as_bytes(), IntegratorOptions::default()).unwrap();
        lay_out(&mut replay.all_graphs, &LayoutOptions::default()).unwrap();
        let graph = replay.all_graphs["c0"].graph.as_ref().unwrap();
        assert!(graph.nodes.iter().all(|node| node.value.is_positioned()));
        assert!(graph.value.width.is_some());
    }

    #[test]
    fn summary_lists_live_contexts() {
        let replay = replay(LOG.as_bytes(), IntegratorOptions::default()).unwrap();
        let text = summary(&replay);
        assert!(text.starts_with("7 events applied, 2 lines skipped, 1 missed, 0 rejected\n"));
        assert!(text.contains("c0 (realtime): 2 nodes, 1 edges, 0 params"));
        assert!(!text.contains("c1"));
    }

    #[test]
    fn silent_param_changes_reach_the_final_state() {
        let log = format!(
            "{LOG}{}\n",
            r#"{"method":"WebAudio.audioParamCreated","params":{"param":{"paramId":"p0","nodeId":"n0","contextId":"c0","paramType":"gain"}}}"#
        );
        let replay = replay(log.as_bytes(), IntegratorOptions::default()).unwrap();
        let c0 = &replay.all_graphs["c0"];
        assert_eq!(c0.params.as_ref().unwrap().len(), 1);
        assert_eq!(c0.event_count, 5);
        assert!(summary(&replay).contains("c0 (realtime): 2 nodes, 1 edges, 1 params"));
    }

    #[test]
    fn rejected_events_are_reported_apart_from_missed_ones() {
        let log = format!(
            "{LOG}{}\n",
            r#"{"method":"WebAudio.nodesDisconnected","params":{"contextId":"c0","sourceId":"n0","destinationId":"n1"}}"#
        );
        let replay = replay(log.as_bytes(), IntegratorOptions::default()).unwrap();
        assert_eq!(replay.missed, 1);
        assert_eq!(replay.rejected.len(), 1);
        assert_eq!(replay.rejected[0].0, 10);
        assert!(matches!(replay.rejected[0].1, CoreError::EdgeNotFound { .. }));
        assert!(summary(&replay).contains("1 missed, 1 rejected\nline 10: "));
    }
}

//! Edge types for the per-context topology graph.
//!
//! A connection runs from a node's output either to another node's input
//! ([`AudioEdge::Node`]) or to one of a node's parameters
//! ([`AudioEdge::Param`]). Several connections may exist between the same two
//! nodes, so every edge carries an [`EdgeKey`] that tells parallel edges
//! apart: `(output, input)` for node edges, `output` alone for param edges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::GraphObjectId;

/// Disambiguates parallel edges between the same source and destination.
///
/// Serialized as the edge name string: `"0,1"` for channel pairs, `"0"` for
/// an output index alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EdgeKey {
    /// Node-to-node edge: source output index, destination input index.
    Channels { output: u32, input: u32 },
    /// Node-to-param edge: source output index.
    Output(u32),
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKey::Channels { output, input } => write!(f, "{},{}", output, input),
            EdgeKey::Output(output) => write!(f, "{}", output),
        }
    }
}

impl FromStr for EdgeKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidEdgeKey(s.to_string());
        match s.split_once(',') {
            Some((output, input)) => Ok(EdgeKey::Channels {
                output: output.trim().parse().map_err(|_| invalid())?,
                input: input.trim().parse().map_err(|_| invalid())?,
            }),
            None => Ok(EdgeKey::Output(s.trim().parse().map_err(|_| invalid())?)),
        }
    }
}

impl From<EdgeKey> for String {
    fn from(key: EdgeKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for EdgeKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What an edge connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AudioEdge {
    #[serde(rename = "node")]
    Node {
        #[serde(rename = "sourceOutputIndex")]
        source_output_index: u32,
        #[serde(rename = "destinationInputIndex")]
        destination_input_index: u32,
    },
    #[serde(rename = "param")]
    Param {
        #[serde(rename = "sourceOutputIndex")]
        source_output_index: u32,
        #[serde(rename = "destinationParamId")]
        destination_param_id: GraphObjectId,
    },
}

impl AudioEdge {
    /// The key this edge is stored under.
    pub fn key(&self) -> EdgeKey {
        match self {
            AudioEdge::Node {
                source_output_index,
                destination_input_index,
            } => EdgeKey::Channels {
                output: *source_output_index,
                input: *destination_input_index,
            },
            AudioEdge::Param {
                source_output_index,
                ..
            } => EdgeKey::Output(*source_output_index),
        }
    }

    /// Returns `true` for node-to-param edges.
    pub fn is_param(&self) -> bool {
        matches!(self, AudioEdge::Param { .. })
    }
}

/// A 2D coordinate assigned by layout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Edge weight in the topology graph: the connection plus layout geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeValue {
    #[serde(flatten)]
    pub edge: AudioEdge,
    /// Polyline assigned by layout; empty until laid out.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
}

impl EdgeValue {
    pub fn new(edge: AudioEdge) -> Self {
        EdgeValue {
            edge,
            points: Vec::new(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        self.edge.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_display_and_parse() {
        let channels = EdgeKey::Channels { output: 0, input: 2 };
        assert_eq!(channels.to_string(), "0,2");
        assert_eq!("0,2".parse::<EdgeKey>().unwrap(), channels);

        let output = EdgeKey::Output(1);
        assert_eq!(output.to_string(), "1");
        assert_eq!("1".parse::<EdgeKey>().unwrap(), output);
    }

    #[test]
    fn bad_key_is_rejected() {
        assert!(matches!(
            "a,b".parse::<EdgeKey>(),
            Err(CoreError::InvalidEdgeKey(_))
        ));
        assert!("".parse::<EdgeKey>().is_err());
    }

    #[test]
    fn node_and_param_keys_differ() {
        let node = AudioEdge::Node {
            source_output_index: 0,
            destination_input_index: 0,
        };
        let param = AudioEdge::Param {
            source_output_index: 0,
            destination_param_id: "p0".into(),
        };
        assert_ne!(node.key(), param.key());
        assert!(param.is_param());
        assert!(!node.is_param());
    }

    #[test]
    fn edge_value_wire_shape() {
        let value = EdgeValue::new(AudioEdge::Param {
            source_output_index: 1,
            destination_param_id: "p9".into(),
        });
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"type": "param", "sourceOutputIndex": 1, "destinationParamId": "p9"})
        );
        let back: EdgeValue = serde_json::from_value(json!({
            "type": "node", "sourceOutputIndex": 0, "destinationInputIndex": 1,
            "points": [{"x": 1.0, "y": 2.0}]
        }))
        .unwrap();
        assert_eq!(back.key(), EdgeKey::Channels { output: 0, input: 1 });
        assert_eq!(back.points, vec![Point { x: 1.0, y: 2.0 }]);
    }
}

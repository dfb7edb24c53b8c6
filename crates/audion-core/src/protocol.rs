//! Wire types for the debugger protocol's `WebAudio` domain.
//!
//! Field names follow the protocol's camelCase JSON. [`WebAudioEvent`] is the
//! closed set of events the integrator understands; anything else coming off
//! the wire (listener events, future additions) parses to `None` and is
//! ignored.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::GraphObjectId;

/// Protocol method names, as they appear in `{method, params}` messages.
pub mod method {
    pub const CONTEXT_CREATED: &str = "WebAudio.contextCreated";
    pub const CONTEXT_CHANGED: &str = "WebAudio.contextChanged";
    pub const CONTEXT_WILL_BE_DESTROYED: &str = "WebAudio.contextWillBeDestroyed";
    pub const AUDIO_NODE_CREATED: &str = "WebAudio.audioNodeCreated";
    pub const AUDIO_NODE_WILL_BE_DESTROYED: &str = "WebAudio.audioNodeWillBeDestroyed";
    pub const AUDIO_PARAM_CREATED: &str = "WebAudio.audioParamCreated";
    pub const AUDIO_PARAM_WILL_BE_DESTROYED: &str = "WebAudio.audioParamWillBeDestroyed";
    pub const NODES_CONNECTED: &str = "WebAudio.nodesConnected";
    pub const NODES_DISCONNECTED: &str = "WebAudio.nodesDisconnected";
    pub const NODE_PARAM_CONNECTED: &str = "WebAudio.nodeParamConnected";
    pub const NODE_PARAM_DISCONNECTED: &str = "WebAudio.nodeParamDisconnected";

    pub const ENABLE: &str = "WebAudio.enable";
    pub const DISABLE: &str = "WebAudio.disable";
    pub const GET_REALTIME_DATA: &str = "WebAudio.getRealtimeData";
}

/// A raw `{method, params}` event as delivered by the debugger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ProtocolEvent {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        ProtocolEvent {
            method: method.into(),
            params,
        }
    }
}

// ---------------------------------------------------------------------------
// Object metadata
// ---------------------------------------------------------------------------

/// Realtime or offline rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    #[default]
    Realtime,
    Offline,
}

/// Audio context lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    #[default]
    Suspended,
    Running,
    Closed,
    Interrupted,
}

/// Realtime rendering statistics, polled with `WebAudio.getRealtimeData`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRealtimeData {
    pub current_time: f64,
    pub render_capacity: f64,
    pub callback_interval_mean: f64,
    pub callback_interval_variance: f64,
}

/// Metadata for one `BaseAudioContext`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseAudioContext {
    pub context_id: GraphObjectId,
    #[serde(default)]
    pub context_type: ContextType,
    #[serde(default)]
    pub context_state: ContextState,
    #[serde(default)]
    pub sample_rate: f64,
    #[serde(default)]
    pub callback_buffer_size: f64,
    #[serde(default)]
    pub max_output_channel_count: f64,
}

/// How a node computes its channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelCountMode {
    ClampedMax,
    Explicit,
    Max,
}

/// How a node up/down-mixes channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelInterpretation {
    Discrete,
    Speakers,
}

/// Metadata for one audio node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioNode {
    pub node_id: GraphObjectId,
    pub context_id: GraphObjectId,
    pub node_type: String,
    #[serde(default)]
    pub number_of_inputs: u32,
    #[serde(default)]
    pub number_of_outputs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_count_mode: Option<ChannelCountMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_interpretation: Option<ChannelInterpretation>,
}

/// Parameter automation rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutomationRate {
    #[default]
    #[serde(rename = "a-rate")]
    ARate,
    #[serde(rename = "k-rate")]
    KRate,
}

/// Metadata for one audio parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParam {
    pub param_id: GraphObjectId,
    pub node_id: GraphObjectId,
    pub context_id: GraphObjectId,
    pub param_type: String,
    #[serde(default)]
    pub rate: AutomationRate,
    #[serde(default)]
    pub default_value: f64,
    #[serde(default)]
    pub min_value: f64,
    #[serde(default)]
    pub max_value: f64,
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEvent {
    pub context: BaseAudioContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWillBeDestroyed {
    pub context_id: GraphObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioNodeCreated {
    pub node: AudioNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioNodeWillBeDestroyed {
    pub context_id: GraphObjectId,
    pub node_id: GraphObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioParamCreated {
    pub param: AudioParam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParamWillBeDestroyed {
    pub context_id: GraphObjectId,
    pub node_id: GraphObjectId,
    pub param_id: GraphObjectId,
}

/// Payload of `nodesConnected` and `nodesDisconnected`.
///
/// The debugger omits both channel indices in the common single-channel case;
/// use [`source_output`](Self::source_output) and
/// [`destination_input`](Self::destination_input) to read them with the
/// default of 0 applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesConnection {
    pub context_id: GraphObjectId,
    pub source_id: GraphObjectId,
    pub destination_id: GraphObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_output_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_input_index: Option<u32>,
}

impl NodesConnection {
    pub fn source_output(&self) -> u32 {
        self.source_output_index.unwrap_or(0)
    }

    pub fn destination_input(&self) -> u32 {
        self.destination_input_index.unwrap_or(0)
    }
}

/// Payload of `nodeParamConnected` and `nodeParamDisconnected`.
/// `destination_id` names a parameter, not a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeParamConnection {
    pub context_id: GraphObjectId,
    pub source_id: GraphObjectId,
    pub destination_id: GraphObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_output_index: Option<u32>,
}

impl NodeParamConnection {
    pub fn source_output(&self) -> u32 {
        self.source_output_index.unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Typed events
// ---------------------------------------------------------------------------

/// Every `WebAudio` event the graph integrator handles.
///
/// Serializes back to the `{method, params}` wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum WebAudioEvent {
    #[serde(rename = "WebAudio.contextCreated")]
    ContextCreated(ContextEvent),
    #[serde(rename = "WebAudio.contextChanged")]
    ContextChanged(ContextEvent),
    #[serde(rename = "WebAudio.contextWillBeDestroyed")]
    ContextWillBeDestroyed(ContextWillBeDestroyed),
    #[serde(rename = "WebAudio.audioNodeCreated")]
    AudioNodeCreated(AudioNodeCreated),
    #[serde(rename = "WebAudio.audioNodeWillBeDestroyed")]
    AudioNodeWillBeDestroyed(AudioNodeWillBeDestroyed),
    #[serde(rename = "WebAudio.audioParamCreated")]
    AudioParamCreated(AudioParamCreated),
    #[serde(rename = "WebAudio.audioParamWillBeDestroyed")]
    AudioParamWillBeDestroyed(AudioParamWillBeDestroyed),
    #[serde(rename = "WebAudio.nodesConnected")]
    NodesConnected(NodesConnection),
    #[serde(rename = "WebAudio.nodesDisconnected")]
    NodesDisconnected(NodesConnection),
    #[serde(rename = "WebAudio.nodeParamConnected")]
    NodeParamConnected(NodeParamConnection),
    #[serde(rename = "WebAudio.nodeParamDisconnected")]
    NodeParamDisconnected(NodeParamConnection),
}

impl WebAudioEvent {
    /// Parses a raw protocol event.
    ///
    /// Returns `Ok(None)` for methods outside the handled vocabulary and an
    /// error only when a known method carries a malformed payload.
    pub fn parse(method: &str, params: serde_json::Value) -> Result<Option<Self>, CoreError> {
        let parsed = match method {
            method::CONTEXT_CREATED => WebAudioEvent::ContextCreated(decode(method, params)?),
            method::CONTEXT_CHANGED => WebAudioEvent::ContextChanged(decode(method, params)?),
            method::CONTEXT_WILL_BE_DESTROYED => {
                WebAudioEvent::ContextWillBeDestroyed(decode(method, params)?)
            }
            method::AUDIO_NODE_CREATED => WebAudioEvent::AudioNodeCreated(decode(method, params)?),
            method::AUDIO_NODE_WILL_BE_DESTROYED => {
                WebAudioEvent::AudioNodeWillBeDestroyed(decode(method, params)?)
            }
            method::AUDIO_PARAM_CREATED => {
                WebAudioEvent::AudioParamCreated(decode(method, params)?)
            }
            method::AUDIO_PARAM_WILL_BE_DESTROYED => {
                WebAudioEvent::AudioParamWillBeDestroyed(decode(method, params)?)
            }
            method::NODES_CONNECTED => WebAudioEvent::NodesConnected(decode(method, params)?),
            method::NODES_DISCONNECTED => WebAudioEvent::NodesDisconnected(decode(method, params)?),
            method::NODE_PARAM_CONNECTED => {
                WebAudioEvent::NodeParamConnected(decode(method, params)?)
            }
            method::NODE_PARAM_DISCONNECTED => {
                WebAudioEvent::NodeParamDisconnected(decode(method, params)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    /// Parses a raw `{method, params}` event, consuming it.
    pub fn from_protocol(event: ProtocolEvent) -> Result<Option<Self>, CoreError> {
        Self::parse(&event.method, event.params)
    }

    /// The protocol method name of this event.
    pub fn method(&self) -> &'static str {
        match self {
            WebAudioEvent::ContextCreated(_) => method::CONTEXT_CREATED,
            WebAudioEvent::ContextChanged(_) => method::CONTEXT_CHANGED,
            WebAudioEvent::ContextWillBeDestroyed(_) => method::CONTEXT_WILL_BE_DESTROYED,
            WebAudioEvent::AudioNodeCreated(_) => method::AUDIO_NODE_CREATED,
            WebAudioEvent::AudioNodeWillBeDestroyed(_) => method::AUDIO_NODE_WILL_BE_DESTROYED,
            WebAudioEvent::AudioParamCreated(_) => method::AUDIO_PARAM_CREATED,
            WebAudioEvent::AudioParamWillBeDestroyed(_) => method::AUDIO_PARAM_WILL_BE_DESTROYED,
            WebAudioEvent::NodesConnected(_) => method::NODES_CONNECTED,
            WebAudioEvent::NodesDisconnected(_) => method::NODES_DISCONNECTED,
            WebAudioEvent::NodeParamConnected(_) => method::NODE_PARAM_CONNECTED,
            WebAudioEvent::NodeParamDisconnected(_) => method::NODE_PARAM_DISCONNECTED,
        }
    }

    /// The context this event belongs to.
    pub fn context_id(&self) -> &GraphObjectId {
        match self {
            WebAudioEvent::ContextCreated(e) | WebAudioEvent::ContextChanged(e) => {
                &e.context.context_id
            }
            WebAudioEvent::ContextWillBeDestroyed(e) => &e.context_id,
            WebAudioEvent::AudioNodeCreated(e) => &e.node.context_id,
            WebAudioEvent::AudioNodeWillBeDestroyed(e) => &e.context_id,
            WebAudioEvent::AudioParamCreated(e) => &e.param.context_id,
            WebAudioEvent::AudioParamWillBeDestroyed(e) => &e.context_id,
            WebAudioEvent::NodesConnected(e) | WebAudioEvent::NodesDisconnected(e) => {
                &e.context_id
            }
            WebAudioEvent::NodeParamConnected(e) | WebAudioEvent::NodeParamDisconnected(e) => {
                &e.context_id
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    method: &str,
    params: serde_json::Value,
) -> Result<T, CoreError> {
    serde_json::from_value(params).map_err(|source| CoreError::MalformedEvent {
        method: method.to_string(),
        source,
    })
}

pub mod id;
pub mod error;
pub mod protocol;
pub mod edge;
pub mod node;
pub mod graph;
pub mod context;
pub mod integrator;
pub mod layout;

// Re-export commonly used types
pub use id::GraphObjectId;
pub use error::CoreError;
pub use protocol::{ProtocolEvent, WebAudioEvent, BaseAudioContext, AudioNode, AudioParam, ContextRealtimeData};
pub use edge::{AudioEdge, EdgeKey, EdgeValue, Point};
pub use node::{Connection, GraphNode, NodeLabel};
pub use graph::{AudioGraph, GraphLabel, RankDir};
pub use context::{ContextUpdate, GraphContext};
pub use integrator::{GraphIntegrator, IntegratorOptions, Miss, Outcome};
pub use layout::{LayeredLayout, LayoutEngine, LayoutOptions};

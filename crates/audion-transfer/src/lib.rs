//! Transfer layer for audion graph contexts.
//!
//! Live contexts never leave the process that integrates them; what crosses a
//! boundary (WebSocket, layout worker, recorded file) is the flat
//! [`SerializedGraphContext`] form.
//!
//! # Modules
//!
//! - [`error`]: TransferError enum with all reconstruction failures
//! - [`serialized`]: wire shapes for contexts and topologies
//! - [`convert`]: serialize/deserialize between live and wire shapes
//! - [`patch`]: in-place hydration of a previously received copy
//! - [`message`]: render surface and layout worker messages

pub mod convert;
pub mod error;
pub mod message;
pub mod patch;
pub mod serialized;

// Re-export key types for ergonomic use.
pub use convert::{deserialize, deserialize_graph, serialize, serialize_graph, HydratedContext};
pub use error::TransferError;
pub use message::{DevtoolsMessage, PanelCommand, PanelRequest, WorkerRequest};
pub use patch::{hydrate, GraphPatch};
pub use serialized::{SerializedGraph, SerializedGraphContext};

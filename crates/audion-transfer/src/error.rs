//! Transfer error types for audion-transfer.
//!
//! [`TransferError`] covers the ways a serialized context can fail to
//! reconstruct: bad JSON, a half-null shape that is neither a live context nor
//! the deletion sentinel, and graph lists that do not describe a consistent
//! topology.

use thiserror::Error;

use audion_core::{EdgeKey, GraphObjectId};

/// Errors produced while moving contexts across a process boundary.
#[derive(Debug, Error)]
pub enum TransferError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Some payload fields were null and some were not.
    #[error("context {id}: partially null payload, missing {missing}")]
    PartialContext {
        id: GraphObjectId,
        missing: &'static str,
    },

    /// A vertex entry's `v` disagrees with its label's `id`.
    #[error("vertex {v} carries label for {label}")]
    VertexMismatch {
        v: GraphObjectId,
        label: GraphObjectId,
    },

    /// The same vertex appears twice in the node list.
    #[error("duplicate vertex: {0}")]
    DuplicateVertex(GraphObjectId),

    /// An edge references a vertex that is not in the node list.
    #[error("edge {source_id} -> {target_id} references a missing vertex")]
    MissingVertex {
        source_id: GraphObjectId,
        target_id: GraphObjectId,
    },

    /// An edge's `name` does not match the key derived from its value.
    #[error("edge {source_id} -> {target_id}: name {name} does not match value key {key}")]
    EdgeKeyMismatch {
        source_id: GraphObjectId,
        target_id: GraphObjectId,
        name: EdgeKey,
        key: EdgeKey,
    },
}

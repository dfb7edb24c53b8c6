//! Core error types for audion-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Missing graph
//! objects are *not* errors here: events referencing objects created before
//! observation began are expected and handled as silent no-ops by the
//! integrator. The variants below cover malformed input and integrator
//! invariant violations.

use thiserror::Error;

use crate::edge::EdgeKey;
use crate::id::GraphObjectId;

/// Errors produced by the audion-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A known protocol method carried a payload that does not match its
    /// wire shape.
    #[error("malformed {method} event: {source}")]
    MalformedEvent {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// A disconnect named two observed nodes but no such edge was ever added.
    #[error("edge not found in context {context}: {source_id} -> {destination_id} [{key}]")]
    EdgeNotFound {
        context: GraphObjectId,
        source_id: GraphObjectId,
        destination_id: GraphObjectId,
        key: EdgeKey,
    },

    /// An edge key string did not match either key form.
    #[error("invalid edge key: '{0}'")]
    InvalidEdgeKey(String),
}

//! Graph object identifiers.
//!
//! The debugger protocol names every context, node, and parameter with an
//! opaque string that is unique within one debugging session. IDs of
//! different categories are never compared to each other; cross references
//! go through explicit fields (`nodeId` on a parameter, `contextId` on a
//! node).

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque protocol identifier for a context, node, or parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphObjectId(pub String);

impl GraphObjectId {
    /// Creates an ID from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        GraphObjectId(id.into())
    }

    /// Returns the raw protocol string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GraphObjectId {
    fn from(id: &str) -> Self {
        GraphObjectId(id.to_string())
    }
}

impl From<String> for GraphObjectId {
    fn from(id: String) -> Self {
        GraphObjectId(id)
    }
}

// Lets maps keyed by `GraphObjectId` be queried with a plain `&str`.
impl Borrow<str> for GraphObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn display_prints_raw_string() {
        assert_eq!(format!("{}", GraphObjectId::new("context0000")), "context0000");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = GraphObjectId::from("node7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"node7\"");
        let back: GraphObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(GraphObjectId::from("p0"), 1);
        assert_eq!(map.get("p0"), Some(&1));
        assert_eq!(map.get("p1"), None);
    }
}

//! Messages exchanged with render surfaces and the layout worker.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use audion_core::{GraphObjectId, LayoutOptions};

use crate::serialized::SerializedGraphContext;

/// Server to render surface.
///
/// Externally tagged, so each message is a single-key object:
/// `{"allGraphs": {...}}`, `{"graphContext": {...}}`, `{"missedUpdates": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DevtoolsMessage {
    /// Every live context, keyed by id. Sent on connect and when a hidden
    /// surface becomes visible again.
    AllGraphs(IndexMap<GraphObjectId, SerializedGraphContext>),
    /// One context changed or was destroyed.
    GraphContext(SerializedGraphContext),
    /// Some events referenced objects created before observation began.
    MissedUpdates(bool),
}

/// Render surface to server commands: `{"type": "panelShown"}` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PanelCommand {
    PanelShown,
    PanelHidden,
    CollectGarbage,
}

/// Anything a render surface may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PanelRequest {
    Command(PanelCommand),
    LayoutOptions {
        #[serde(rename = "layoutOptions")]
        layout_options: LayoutOptions,
    },
}

/// Input to the layout worker: `{"graphContext": {...}}` or
/// `{"layoutOptions": {...}}`. Its output is the laid-out
/// [`SerializedGraphContext`], framed by the caller as
/// [`DevtoolsMessage::GraphContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerRequest {
    GraphContext(SerializedGraphContext),
    LayoutOptions(LayoutOptions),
}

#[cfg(test)]
mod tests {
    use super::*;
    use audion_core::RankDir;
    use serde_json::json;

    #[test]
    fn devtools_messages_are_single_key_objects() {
        let missed = serde_json::to_value(DevtoolsMessage::MissedUpdates(true)).unwrap();
        assert_eq!(missed, json!({"missedUpdates": true}));

        let sentinel = DevtoolsMessage::GraphContext(SerializedGraphContext::destroyed("c0".into()));
        let value = serde_json::to_value(sentinel).unwrap();
        assert_eq!(value["graphContext"]["id"], "c0");
        assert!(value["graphContext"]["graph"].is_null());

        let all = serde_json::to_value(DevtoolsMessage::AllGraphs(IndexMap::new())).unwrap();
        assert_eq!(all, json!({"allGraphs": {}}));
    }

    #[test]
    fn panel_requests_parse() {
        let shown: PanelRequest = serde_json::from_value(json!({"type": "panelShown"})).unwrap();
        assert_eq!(shown, PanelRequest::Command(PanelCommand::PanelShown));

        let gc: PanelRequest = serde_json::from_value(json!({"type": "collectGarbage"})).unwrap();
        assert_eq!(gc, PanelRequest::Command(PanelCommand::CollectGarbage));

        let layout: PanelRequest =
            serde_json::from_value(json!({"layoutOptions": {"rankdir": "TB"}})).unwrap();
        match layout {
            PanelRequest::LayoutOptions { layout_options } => {
                assert_eq!(layout_options.rankdir, RankDir::TB)
            }
            other => panic!("unexpected request {other:?}"),
        }

        assert!(serde_json::from_value::<PanelRequest>(json!({"type": "reload"})).is_err());
    }

    #[test]
    fn worker_request_shape() {
        let request = WorkerRequest::LayoutOptions(LayoutOptions::default());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["layoutOptions"]["rankdir"], "LR");
    }
}

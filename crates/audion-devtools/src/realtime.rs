//! Realtime statistics polling.
//!
//! One task per realtime context asks `WebAudio.getRealtimeData` once per
//! interval and forwards each answer as a [`RealtimeSample`]. Tasks are
//! aborted when their context is destroyed and when the poller is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use audion_core::protocol::method;
use audion_core::{ContextRealtimeData, GraphObjectId};

use crate::attach::AttachController;
use crate::error::DevtoolsError;

/// Returned when the context is already gone.
pub const CANNOT_FIND: &str = "Cannot find BaseAudioContext with such id.";
/// Returned when the context renders offline.
pub const REALTIME_ONLY: &str = "ContextRealtimeData is only avaliable for an AudioContext.";

/// One answer for one context.
pub type RealtimeSample = (GraphObjectId, ContextRealtimeData);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeDataResult {
    realtime_data: ContextRealtimeData,
}

/// Owns the polling tasks of one pipeline.
pub struct RealtimePoller {
    controller: Arc<AttachController>,
    interval: Duration,
    timeout: Duration,
    tasks: HashMap<GraphObjectId, JoinHandle<()>>,
    tx: mpsc::UnboundedSender<RealtimeSample>,
}

impl RealtimePoller {
    /// Creates a poller and the receiving end of its samples.
    pub fn new(
        controller: Arc<AttachController>,
        interval: Duration,
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<RealtimeSample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poller = RealtimePoller {
            controller,
            interval,
            timeout,
            tasks: HashMap::new(),
            tx,
        };
        (poller, rx)
    }

    /// Starts polling `context_id`, restarting any poll already running for it.
    pub fn start(&mut self, context_id: GraphObjectId) {
        self.stop(&context_id);
        let task = tokio::spawn(poll_context(
            Arc::clone(&self.controller),
            context_id.clone(),
            self.interval,
            self.timeout,
            self.tx.clone(),
        ));
        self.tasks.insert(context_id, task);
    }

    pub fn stop(&mut self, context_id: &GraphObjectId) {
        if let Some(task) = self.tasks.remove(context_id) {
            task.abort();
        }
    }

    pub fn is_polling(&self, context_id: &GraphObjectId) -> bool {
        self.tasks
            .get(context_id)
            .is_some_and(|task| !task.is_finished())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for RealtimePoller {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

async fn poll_context(
    controller: Arc<AttachController>,
    context_id: GraphObjectId,
    every: Duration,
    timeout: Duration,
    tx: mpsc::UnboundedSender<RealtimeSample>,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let request = controller.send_command(
            method::GET_REALTIME_DATA,
            json!({"contextId": context_id}),
        );
        let answer = match tokio::time::timeout(timeout, request).await {
            Ok(answer) => answer,
            Err(_elapsed) => {
                debug!(context = %context_id, "realtime data poll timed out");
                continue;
            }
        };

        match answer.and_then(parse_result) {
            Ok(data) => {
                if tx.send((context_id.clone(), data)).is_err() {
                    return;
                }
            }
            Err(DevtoolsError::Command { message, .. })
                if message == CANNOT_FIND || message == REALTIME_ONLY =>
            {
                debug!(context = %context_id, %message, "stopping realtime data poll");
                return;
            }
            Err(error) => debug!(context = %context_id, %error, "realtime data poll failed"),
        }
    }
}

fn parse_result(value: serde_json::Value) -> Result<ContextRealtimeData, DevtoolsError> {
    serde_json::from_value::<RealtimeDataResult>(value)
        .map(|result| result.realtime_data)
        .map_err(|e| DevtoolsError::Protocol(format!("realtime data not returned: {e}")))
}

//! Scripted in-process debugger.
//!
//! Records every attach, detach, and command so tests can assert on the
//! exact traffic, and lets tests inject events, user detaches, canned
//! command responses, and attach failures.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use audion_core::ProtocolEvent;

use super::{Debugger, DebuggerNotification, DetachReason};
use crate::error::DevtoolsError;

#[derive(Debug, Default)]
struct Script {
    attached: bool,
    attach_count: usize,
    detach_count: usize,
    commands: Vec<(String, Value)>,
    responses: HashMap<String, VecDeque<Result<Value, DevtoolsError>>>,
    attach_failures: VecDeque<DevtoolsError>,
}

/// A [`Debugger`] that never leaves the process.
pub struct InMemoryDebugger {
    script: Mutex<Script>,
    notifications: broadcast::Sender<DebuggerNotification>,
}

impl Default for InMemoryDebugger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDebugger {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Creates a debugger whose notification buffer holds `capacity`
    /// undelivered messages per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (notifications, _) = broadcast::channel(capacity);
        InMemoryDebugger {
            script: Mutex::new(Script::default()),
            notifications,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.script.lock().attached
    }

    pub fn attach_count(&self) -> usize {
        self.script.lock().attach_count
    }

    pub fn detach_count(&self) -> usize {
        self.script.lock().detach_count
    }

    /// Every command sent so far, oldest first.
    pub fn commands(&self) -> Vec<(String, Value)> {
        self.script.lock().commands.clone()
    }

    /// Methods of every command sent so far, oldest first.
    pub fn command_methods(&self) -> Vec<String> {
        self.script
            .lock()
            .commands
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    /// Delivers one event to every subscriber. Returns how many received it.
    pub fn emit(&self, event: ProtocolEvent) -> usize {
        self.notifications
            .send(DebuggerNotification::Event(event))
            .unwrap_or(0)
    }

    /// Delivers a `{method, params}` event.
    pub fn emit_raw(&self, method: &str, params: Value) -> usize {
        self.emit(ProtocolEvent::new(method, params))
    }

    /// Ends the session as if the browser had detached.
    pub fn detach_with(&self, reason: DetachReason) {
        self.script.lock().attached = false;
        let _ = self
            .notifications
            .send(DebuggerNotification::Detached(reason));
    }

    /// Ends the session as if the user dismissed it.
    pub fn user_detach(&self) {
        self.detach_with(DetachReason::CanceledByUser);
    }

    /// Makes the next attach fail with `error`.
    pub fn fail_next_attach(&self, error: DevtoolsError) {
        self.script.lock().attach_failures.push_back(error);
    }

    /// Queues a response for the next `method` command. Commands without a
    /// queued response answer `{}`.
    pub fn respond(&self, method: &str, response: Result<Value, DevtoolsError>) {
        self.script
            .lock()
            .responses
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }
}

#[async_trait]
impl Debugger for InMemoryDebugger {
    async fn attach(&self) -> Result<(), DevtoolsError> {
        let mut script = self.script.lock();
        if script.attached {
            return Ok(());
        }
        if let Some(error) = script.attach_failures.pop_front() {
            return Err(error);
        }
        script.attached = true;
        script.attach_count += 1;
        Ok(())
    }

    async fn detach(&self) -> Result<(), DevtoolsError> {
        let mut script = self.script.lock();
        if script.attached {
            script.attached = false;
            script.detach_count += 1;
        }
        Ok(())
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value, DevtoolsError> {
        let mut script = self.script.lock();
        if !script.attached {
            return Err(DevtoolsError::NotAttached);
        }
        script.commands.push((method.to_string(), params));
        script
            .responses
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Value::Object(Default::default())))
    }

    fn subscribe(&self) -> broadcast::Receiver<DebuggerNotification> {
        self.notifications.subscribe()
    }
}

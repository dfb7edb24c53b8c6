//! The debugger interface the pipeline is built on.
//!
//! [`Debugger`] is the seam between the service and a browser: attach,
//! detach, send a command, and subscribe to notifications. [`CdpDebugger`]
//! speaks the Chrome DevTools Protocol over a WebSocket; [`InMemoryDebugger`]
//! is the scripted double used by tests.

pub mod cdp;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use audion_core::ProtocolEvent;

use crate::error::DevtoolsError;

pub use cdp::CdpDebugger;
pub use memory::InMemoryDebugger;

/// Why a debugger session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachReason {
    /// The user dismissed the debugging session in the browser.
    CanceledByUser,
    /// The debugged page went away.
    TargetClosed,
    /// The transport to the browser failed.
    ConnectionLost,
    /// We asked for it.
    Requested,
}

impl DetachReason {
    /// Maps the protocol's `Inspector.detached` reason string.
    pub fn from_protocol(reason: &str) -> Self {
        match reason {
            "canceled_by_user" => DetachReason::CanceledByUser,
            "target_closed" | "Render process gone." => DetachReason::TargetClosed,
            _ => DetachReason::ConnectionLost,
        }
    }
}

/// Something the debugger pushed to us.
#[derive(Debug, Clone, PartialEq)]
pub enum DebuggerNotification {
    Event(ProtocolEvent),
    Detached(DetachReason),
}

/// A browser debugger connection.
///
/// Implementations broadcast every notification to all subscribers in
/// arrival order.
#[async_trait]
pub trait Debugger: Send + Sync + 'static {
    /// Starts a debugging session. Attaching while attached is a no-op.
    async fn attach(&self) -> Result<(), DevtoolsError>;

    /// Ends the debugging session. Detaching while detached is a no-op.
    async fn detach(&self) -> Result<(), DevtoolsError>;

    /// Sends one protocol command and waits for its result.
    async fn send_command(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, DevtoolsError>;

    /// Subscribes to events and detach notifications.
    fn subscribe(&self) -> broadcast::Receiver<DebuggerNotification>;
}

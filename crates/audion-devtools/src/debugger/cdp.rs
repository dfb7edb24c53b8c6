//! Chrome DevTools Protocol debugger over a page target WebSocket.
//!
//! Attaching opens the socket and spawns a reader task. The reader routes
//! `{id, result | error}` frames to the command waiting on that id and
//! broadcasts `{method, params}` frames as notifications. When the socket
//! closes, every waiting command fails and subscribers see
//! [`DetachReason::ConnectionLost`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use audion_core::ProtocolEvent;

use super::{Debugger, DebuggerNotification, DetachReason};
use crate::error::DevtoolsError;

const INSPECTOR_DETACHED: &str = "Inspector.detached";
const NOTIFICATION_CAPACITY: usize = 1024;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

struct PendingCommand {
    method: String,
    tx: oneshot::Sender<Result<Value, DevtoolsError>>,
}

/// State shared between the debugger handle and its reader task.
struct Shared {
    next_id: AtomicU64,
    pending: DashMap<u64, PendingCommand>,
    notifications: broadcast::Sender<DebuggerNotification>,
}

struct Session {
    writer: Arc<Mutex<WsSink>>,
    reader: JoinHandle<()>,
}

impl Session {
    fn is_open(&self) -> bool {
        !self.reader.is_finished()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[derive(Debug, Deserialize)]
struct CdpErrorBody {
    code: i64,
    message: String,
}

/// Any frame the browser sends: a command response or a notification.
#[derive(Debug, Deserialize)]
struct CdpFrame {
    id: Option<u64>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    result: Option<Value>,
    error: Option<CdpErrorBody>,
}

/// A [`Debugger`] speaking CDP JSON over a WebSocket.
pub struct CdpDebugger {
    url: Url,
    command_timeout: Duration,
    session: Mutex<Option<Session>>,
    shared: Arc<Shared>,
}

impl CdpDebugger {
    /// Creates a detached debugger for the page target at `url`.
    pub fn new(url: Url) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        CdpDebugger {
            url,
            command_timeout: Duration::from_secs(10),
            session: Mutex::new(None),
            shared: Arc::new(Shared {
                next_id: AtomicU64::new(1),
                pending: DashMap::new(),
                notifications,
            }),
        }
    }

    /// Overrides how long a command may wait for its response.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn writer(&self) -> Result<Arc<Mutex<WsSink>>, DevtoolsError> {
        match self.session.lock().await.as_ref() {
            Some(session) if session.is_open() => Ok(Arc::clone(&session.writer)),
            _ => Err(DevtoolsError::NotAttached),
        }
    }
}

#[async_trait]
impl Debugger for CdpDebugger {
    async fn attach(&self) -> Result<(), DevtoolsError> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(Session::is_open) {
            return Ok(());
        }

        let (stream, _resp) = connect_async(self.url.as_str())
            .await
            .map_err(|e| DevtoolsError::Transport(e.to_string()))?;
        let (sink, mut stream) = stream.split();
        let writer = Arc::new(Mutex::new(sink));

        let shared = Arc::clone(&self.shared);
        let pong_writer = Arc::clone(&writer);
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => route_frame(&shared, text.as_str()),
                    Ok(WsMessage::Ping(payload)) => {
                        if let Err(e) = pong_writer.lock().await.send(WsMessage::Pong(payload)).await {
                            warn!(error = %e, "failed to answer debugger ping");
                            break;
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        debug!(?frame, "debugger closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "debugger read error");
                        break;
                    }
                    _ => {}
                }
            }
            connection_lost(&shared);
        });

        info!(url = %self.url, "attached to debugger target");
        *session = Some(Session { writer, reader });
        Ok(())
    }

    async fn detach(&self) -> Result<(), DevtoolsError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        session.reader.abort();
        let closed = session.writer.lock().await.send(WsMessage::Close(None)).await;
        fail_pending(&self.shared, "detached");
        info!(url = %self.url, "detached from debugger target");
        closed.map_err(|e| DevtoolsError::Transport(e.to_string()))
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value, DevtoolsError> {
        let writer = self.writer().await?;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let text = json!({"id": id, "method": method, "params": params}).to_string();

        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(
            id,
            PendingCommand {
                method: method.to_string(),
                tx,
            },
        );

        if let Err(e) = writer.lock().await.send(WsMessage::Text(text.into())).await {
            self.shared.pending.remove(&id);
            return Err(DevtoolsError::Transport(e.to_string()));
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_canceled)) => Err(DevtoolsError::NotAttached),
            Err(_elapsed) => {
                self.shared.pending.remove(&id);
                Err(DevtoolsError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<DebuggerNotification> {
        self.shared.notifications.subscribe()
    }
}

fn route_frame(shared: &Shared, text: &str) {
    let frame = match serde_json::from_str::<CdpFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "unparseable debugger frame");
            return;
        }
    };

    if let Some(id) = frame.id {
        let Some((_, pending)) = shared.pending.remove(&id) else {
            debug!(id, "response for unknown command id");
            return;
        };
        let result = match frame.error {
            Some(error) => Err(DevtoolsError::Command {
                method: pending.method,
                code: error.code,
                message: error.message,
            }),
            None => Ok(frame.result.unwrap_or(Value::Null)),
        };
        let _ = pending.tx.send(result);
        return;
    }

    let Some(method) = frame.method else {
        return;
    };
    let notification = if method == INSPECTOR_DETACHED {
        let reason = frame
            .params
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default();
        DebuggerNotification::Detached(DetachReason::from_protocol(reason))
    } else {
        DebuggerNotification::Event(ProtocolEvent::new(method, frame.params))
    };
    // No subscribers is fine: nobody is observing yet.
    let _ = shared.notifications.send(notification);
}

fn connection_lost(shared: &Shared) {
    fail_pending(shared, "connection lost");
    let _ = shared
        .notifications
        .send(DebuggerNotification::Detached(DetachReason::ConnectionLost));
}

fn fail_pending(shared: &Shared, why: &str) {
    let ids: Vec<u64> = shared.pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, pending)) = shared.pending.remove(&id) {
            let _ = pending.tx.send(Err(DevtoolsError::Transport(format!(
                "{} ({})",
                pending.method, why
            ))));
        }
    }
}

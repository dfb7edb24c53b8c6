//! Panel WebSocket tests against a served router.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use audion_core::protocol::method;
use audion_devtools::attach::{AttachState, DomainState, Permission};
use audion_devtools::router::build_router;
use audion_devtools::state::AppState;

const WAIT: Duration = Duration::from_secs(5);

type Panel = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    format!("ws://{addr}/panel/ws")
}

async fn send(panel: &mut Panel, value: Value) {
    panel
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn receive(panel: &mut Panel) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            match panel.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).unwrap()
                }
                Some(Ok(_)) => continue,
                other => panic!("panel socket closed: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a panel message")
}

#[tokio::test]
async fn shown_panel_receives_snapshot_and_updates() {
    let (state, debugger) = AppState::in_memory();
    let url = serve(state.clone()).await;
    let (mut panel, _) = connect_async(url.as_str()).await.unwrap();

    send(&mut panel, json!({"type": "panelShown"})).await;
    assert_eq!(receive(&mut panel).await, json!({"allGraphs": {}}));
    assert_eq!(state.controller.permission(), Permission::Temporary);

    let mut status = state.controller.watch_status();
    tokio::time::timeout(WAIT, status.wait_for(|s| s.web_audio == DomainState::Enabled))
        .await
        .unwrap()
        .unwrap();

    debugger.emit_raw(
        method::CONTEXT_CREATED,
        json!({"context": {"contextId": "c0", "contextType": "offline"}}),
    );
    let update = receive(&mut panel).await;
    assert_eq!(update["graphContext"]["id"], "c0");

    // Hidden then shown again: the snapshot carries the context.
    send(&mut panel, json!({"type": "panelHidden"})).await;
    send(&mut panel, json!({"type": "panelShown"})).await;
    let snapshot = receive(&mut panel).await;
    assert_eq!(snapshot["allGraphs"]["c0"]["id"], "c0");
}

#[tokio::test]
async fn closing_the_last_panel_detaches() {
    let (state, debugger) = AppState::in_memory();
    let url = serve(state.clone()).await;
    let (mut panel, _) = connect_async(url.as_str()).await.unwrap();

    send(&mut panel, json!({"type": "panelShown"})).await;
    receive(&mut panel).await;
    let mut status = state.controller.watch_status();
    tokio::time::timeout(WAIT, status.wait_for(|s| s.state == AttachState::Attached))
        .await
        .unwrap()
        .unwrap();

    panel.close(None).await.unwrap();
    tokio::time::timeout(WAIT, status.wait_for(|s| s.state == AttachState::Detached))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(debugger.attach_count(), 1);
    assert_eq!(debugger.detach_count(), 1);
    assert!(state.panels.is_empty());
}

#[tokio::test]
async fn layout_panels_receive_positions() {
    let (state, debugger) = AppState::in_memory();
    let url = serve(state.clone()).await;
    let (mut panel, _) = connect_async(format!("{url}?layout=true")).await.unwrap();

    send(&mut panel, json!({"type": "panelShown"})).await;
    receive(&mut panel).await;
    send(&mut panel, json!({"layoutOptions": {"rankdir": "TB"}})).await;

    let mut status = state.controller.watch_status();
    tokio::time::timeout(WAIT, status.wait_for(|s| s.web_audio == DomainState::Enabled))
        .await
        .unwrap()
        .unwrap();

    debugger.emit_raw(
        method::CONTEXT_CREATED,
        json!({"context": {"contextId": "c0", "contextType": "offline"}}),
    );
    let update = receive(&mut panel).await;
    assert_eq!(update["graphContext"]["id"], "c0");
    assert_eq!(update["graphContext"]["graph"]["value"]["rankdir"], "TB");
}

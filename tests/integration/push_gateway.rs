// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for live push delivery over `/ws`.
//!
//! A REST post stores the message and pushes it to the receiver's
//! identified WebSocket. These tests drive both surfaces against a real
//! bound server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pairchat_proto::codec::{self, Frame, Framing};
use pairchat_proto::event::{ClientEvent, ServerEvent};
use pairchat_proto::identity::Identity;
use pairchat_server::auth::StaticTokens;
use pairchat_server::presence::PresenceBackend;
use pairchat_server::server::{self, AppState};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite;

type Ws = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn id(s: &str) -> Identity {
    Identity::parse(s).unwrap()
}

async fn start() -> (SocketAddr, Arc<AppState>) {
    let tokens = StaticTokens::from_table([
        ("t-1".to_string(), id("u1")),
        ("t-2".to_string(), id("u2")),
    ]);
    let state = Arc::new(AppState::in_memory(Arc::new(tokens)));
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Ws {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

async fn send_identify(ws: &mut Ws, identity: &str, token: Option<&str>, framing: Framing) {
    let event = ClientEvent::Identify {
        identity: id(identity),
        token: token.map(str::to_string),
    };
    let msg = match codec::encode_client(&event, framing).unwrap() {
        Frame::Text(text) => tungstenite::Message::Text(text.into()),
        Frame::Binary(bytes) => tungstenite::Message::Binary(bytes.into()),
    };
    ws.send(msg).await.unwrap();
}

/// Receives the next server event, skipping control frames. `None` once the
/// server closes.
async fn recv_event(ws: &mut Ws) -> Option<ServerEvent> {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for server event");
        match msg {
            Some(Ok(tungstenite::Message::Text(text))) => {
                return Some(codec::decode_server_text(text.as_str()).unwrap());
            }
            Some(Ok(tungstenite::Message::Binary(bytes))) => {
                return Some(codec::decode_server_binary(&bytes).unwrap());
            }
            Some(Ok(tungstenite::Message::Close(_)) | Err(_)) | None => return None,
            Some(Ok(_)) => {}
        }
    }
}

async fn connect_and_identify(addr: SocketAddr, identity: &str, token: &str, framing: Framing) -> Ws {
    let mut ws = connect(addr).await;
    send_identify(&mut ws, identity, Some(token), framing).await;
    assert_eq!(
        recv_event(&mut ws).await,
        Some(ServerEvent::Identified {
            identity: id(identity)
        })
    );
    ws
}

async fn create_chat(addr: SocketAddr, token: &str, other: &str) -> String {
    let chat: Value = reqwest::Client::new()
        .post(format!("http://{addr}/chats"))
        .bearer_auth(token)
        .json(&json!({ "otherIdentity": other }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    chat["id"].as_str().unwrap().to_string()
}

async fn post_message(addr: SocketAddr, token: &str, chat_id: &str, body: Value) -> Value {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/chats/{chat_id}/messages"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    response.json().await.unwrap()
}

/// Polls until presence reflects `expected` for `identity`.
async fn wait_for_presence(state: &AppState, identity: &str, expected: bool) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while state.presence.lookup(&id(identity)).is_some() != expected {
        assert!(tokio::time::Instant::now() < deadline, "presence never settled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn online_receiver_gets_pushed_message() {
    let (addr, _state) = start().await;
    let chat_id = create_chat(addr, "t-1", "u2").await;
    let mut u2 = connect_and_identify(addr, "u2", "t-2", Framing::Text).await;

    let stored = post_message(
        addr,
        "t-1",
        &chat_id,
        json!({"senderId": "u1", "receiverId": "u2", "body": "hi"}),
    )
    .await;

    match recv_event(&mut u2).await {
        Some(ServerEvent::Message(pushed)) => {
            assert_eq!(pushed.id.to_string(), stored["id"].as_str().unwrap());
            assert_eq!(pushed.body, "hi");
            assert_eq!(pushed.sender_id, id("u1"));
        }
        other => panic!("expected pushed message, got {other:?}"),
    }
}

#[tokio::test]
async fn binary_identify_gets_binary_pushes() {
    let (addr, _state) = start().await;
    let chat_id = create_chat(addr, "t-1", "u2").await;
    let mut u2 = connect(addr).await;
    send_identify(&mut u2, "u2", Some("t-2"), Framing::Binary).await;

    let ack = tokio::time::timeout(RECV_TIMEOUT, u2.next()).await.unwrap().unwrap().unwrap();
    assert!(ack.is_binary());

    post_message(
        addr,
        "t-1",
        &chat_id,
        json!({"senderId": "u1", "receiverId": "u2", "body": "packed"}),
    )
    .await;

    let pushed = tokio::time::timeout(RECV_TIMEOUT, u2.next()).await.unwrap().unwrap().unwrap();
    let tungstenite::Message::Binary(bytes) = pushed else {
        panic!("expected binary frame, got {pushed:?}");
    };
    match codec::decode_server_binary(&bytes).unwrap() {
        ServerEvent::Message(message) => assert_eq!(message.body, "packed"),
        other => panic!("expected message event, got {other:?}"),
    }
}

#[tokio::test]
async fn offline_receiver_catches_up_by_listing() {
    let (addr, _state) = start().await;
    let chat_id = create_chat(addr, "t-1", "u2").await;

    post_message(
        addr,
        "t-1",
        &chat_id,
        json!({"senderId": "u1", "receiverId": "u2", "body": "while you were out"}),
    )
    .await;

    // Connecting later does not replay anything over the push channel.
    let mut u2 = connect_and_identify(addr, "u2", "t-2", Framing::Text).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(200), u2.next())
            .await
            .is_err()
    );

    let threads: Value = reqwest::Client::new()
        .get(format!("http://{addr}/chats/u2"))
        .bearer_auth("t-2")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(threads[0]["messages"][0]["body"], "while you were out");
}

#[tokio::test]
async fn sender_is_not_pushed_its_own_message() {
    let (addr, _state) = start().await;
    let chat_id = create_chat(addr, "t-1", "u2").await;
    let mut u1 = connect_and_identify(addr, "u1", "t-1", Framing::Text).await;

    post_message(
        addr,
        "t-1",
        &chat_id,
        json!({"senderId": "u1", "receiverId": "u2", "body": "to u2 only"}),
    )
    .await;

    assert!(
        tokio::time::timeout(Duration::from_millis(200), u1.next())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn first_frame_other_than_identify_closes_connection() {
    let (addr, state) = start().await;
    let mut ws = connect(addr).await;
    ws.send(tungstenite::Message::Text(r#"{"userConnected":"u1"}"#.to_string().into()))
        .await
        .unwrap();

    match recv_event(&mut ws).await {
        Some(ServerEvent::Error { reason }) => assert!(reason.contains("identify"), "got: {reason}"),
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(recv_event(&mut ws).await, None);
    assert_eq!(state.presence.online_count(), 0);
}

#[tokio::test]
async fn identify_with_wrong_token_is_rejected() {
    let (addr, state) = start().await;
    let mut ws = connect(addr).await;
    send_identify(&mut ws, "u2", Some("t-1"), Framing::Text).await;

    assert!(matches!(recv_event(&mut ws).await, Some(ServerEvent::Error { .. })));
    assert_eq!(recv_event(&mut ws).await, None);
    assert!(state.presence.lookup(&id("u2")).is_none());
}

#[tokio::test]
async fn identify_without_token_is_rejected_by_default() {
    let (addr, _state) = start().await;
    let mut ws = connect(addr).await;
    send_identify(&mut ws, "u2", None, Framing::Text).await;

    match recv_event(&mut ws).await {
        Some(ServerEvent::Error { reason }) => assert!(reason.contains("token"), "got: {reason}"),
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn second_event_after_identify_closes_connection() {
    let (addr, state) = start().await;
    let mut ws = connect_and_identify(addr, "u1", "t-1", Framing::Text).await;
    wait_for_presence(&state, "u1", true).await;

    send_identify(&mut ws, "u1", Some("t-1"), Framing::Text).await;

    assert!(matches!(recv_event(&mut ws).await, Some(ServerEvent::Error { .. })));
    assert_eq!(recv_event(&mut ws).await, None);
    wait_for_presence(&state, "u1", false).await;
}

#[tokio::test]
async fn reconnect_supersedes_previous_connection() {
    let (addr, state) = start().await;
    let chat_id = create_chat(addr, "t-1", "u2").await;

    let mut old = connect_and_identify(addr, "u2", "t-2", Framing::Text).await;
    let mut fresh = connect_and_identify(addr, "u2", "t-2", Framing::Text).await;

    // The superseded connection is closed by the server.
    assert_eq!(recv_event(&mut old).await, None);

    // Its late unregister must not evict the fresh connection.
    tokio::time::sleep(Duration::from_millis(50)).await;
    wait_for_presence(&state, "u2", true).await;

    post_message(
        addr,
        "t-1",
        &chat_id,
        json!({"senderId": "u1", "receiverId": "u2", "body": "to the new one"}),
    )
    .await;
    match recv_event(&mut fresh).await {
        Some(ServerEvent::Message(message)) => assert_eq!(message.body, "to the new one"),
        other => panic!("expected pushed message, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_unregisters_presence() {
    let (addr, state) = start().await;
    let mut ws = connect_and_identify(addr, "u1", "t-1", Framing::Text).await;
    wait_for_presence(&state, "u1", true).await;

    ws.close(None).await.unwrap();
    wait_for_presence(&state, "u1", false).await;
}

#[tokio::test]
async fn shutdown_closes_push_connections() {
    let tokens = StaticTokens::from_table([("t-1".to_string(), id("u1"))]);
    let state = Arc::new(AppState::in_memory(Arc::new(tokens)));
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let (addr, handle) = server::start_server_with_shutdown("127.0.0.1:0", state, async move {
        let _ = stop_rx.await;
    })
    .await
    .unwrap();

    let mut ws = connect_and_identify(addr, "u1", "t-1", Framing::Text).await;
    stop_tx.send(()).unwrap();

    assert_eq!(recv_event(&mut ws).await, None);
    tokio::time::timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

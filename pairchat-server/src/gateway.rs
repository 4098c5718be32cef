//! Push gateway: WebSocket lifecycle for live message delivery.
//!
//! Each connection walks `Connecting -> Open -> Identified -> Closed`:
//! 1. The upgrade completes and the connection is `Open`.
//! 2. The first data frame must be `identify`; it is authenticated, the
//!    connection is registered in presence and `identified` is sent back.
//! 3. From then on the connection is push-only. Deliveries arrive through
//!    the connection's outbound channel and are encoded in the framing the
//!    client identified with.
//! 4. On disconnect the connection unregisters itself.
//!
//! Any inbound frame that is not a valid first `identify` gets an `error`
//! event and the connection is closed.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use pairchat_proto::codec::{self, Frame, Framing};
use pairchat_proto::event::{ClientEvent, ServerEvent};
use pairchat_proto::identity::Identity;
use tokio::sync::mpsc;

use crate::auth::Authenticator;
use crate::presence::{ConnectionHandle, OUTBOUND_CAPACITY, PresenceBackend};
use crate::server::AppState;

/// Lifecycle of one push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade in progress.
    Connecting,
    /// Transport up, waiting for `identify`.
    Open,
    /// Registered in presence; deliveries may target this connection.
    Identified,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns the state after moving to `next`, or `None` if the move is
    /// not allowed.
    #[must_use]
    pub const fn advance(self, next: Self) -> Option<Self> {
        match (self, next) {
            (Self::Connecting, Self::Open)
            | (Self::Open, Self::Identified)
            | (Self::Open | Self::Identified, Self::Closed) => Some(next),
            _ => None,
        }
    }
}

/// Why a connection never reached `Identified`.
#[derive(Debug, PartialEq, Eq)]
enum Rejection {
    /// The client went away first.
    Disconnected,
    /// The client broke protocol; answer with `reason` and close.
    Violation { reason: String, framing: Framing },
}

/// axum handler that upgrades an HTTP request to a push connection.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drives a single upgraded push connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut lifecycle = ConnectionState::Connecting;
    transition(&mut lifecycle, ConnectionState::Open, None);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (identity, framing) = match wait_for_identify(
        &mut ws_receiver,
        state.auth.as_ref(),
        state.require_push_token,
    )
    .await
    {
        Ok(identified) => identified,
        Err(Rejection::Disconnected) => {
            tracing::debug!("connection closed before identify");
            transition(&mut lifecycle, ConnectionState::Closed, None);
            return;
        }
        Err(Rejection::Violation { reason, framing }) => {
            tracing::warn!(reason = %reason, "rejecting push connection");
            let _ = send_event(&mut ws_sender, &ServerEvent::error(&reason), framing).await;
            let _ = ws_sender.send(WsMessage::Close(None)).await;
            transition(&mut lifecycle, ConnectionState::Closed, None);
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);
    let handle = ConnectionHandle::new(identity.clone(), tx);

    if let Some(previous) = state.presence.register(handle.clone()) {
        tracing::info!(
            identity = %identity,
            previous = previous.id(),
            "superseding existing push connection"
        );
        previous.close();
    }
    transition(&mut lifecycle, ConnectionState::Identified, Some(&handle));

    // Sent before the writer starts, so it precedes any queued delivery.
    let ack = ServerEvent::Identified {
        identity: identity.clone(),
    };
    if let Err(e) = send_event(&mut ws_sender, &ack, framing).await {
        tracing::warn!(identity = %identity, error = %e, "failed to send identified ack");
        state.presence.unregister(&handle);
        transition(&mut lifecycle, ConnectionState::Closed, Some(&handle));
        return;
    }

    let writer_handle = handle.clone();
    let mut write_task = tokio::spawn(async move {
        loop {
            // Queued events go out before a pending close.
            tokio::select! {
                biased;
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = send_event(&mut ws_sender, &event, framing).await {
                        tracing::warn!(
                            connection = writer_handle.id(),
                            error = %e,
                            "push write failed"
                        );
                        break;
                    }
                }
                () = writer_handle.close_requested() => {
                    let _ = ws_sender.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    let reader_handle = handle.clone();
    let mut read_task = tokio::spawn(async move {
        let mut violated = false;
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                WsMessage::Close(_) => {
                    tracing::debug!(connection = reader_handle.id(), "received close frame");
                    break;
                }
                WsMessage::Text(_) | WsMessage::Binary(_) if !violated => {
                    tracing::warn!(
                        connection = reader_handle.id(),
                        identity = %reader_handle.identity(),
                        "unexpected event on identified connection"
                    );
                    // The writer flushes the error, closes and ends the
                    // connection; keep draining until then.
                    let _ = reader_handle.push(ServerEvent::error(
                        "connection already identified; no further events accepted",
                    ));
                    reader_handle.close();
                    violated = true;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let removed = state.presence.unregister(&handle);
    transition(&mut lifecycle, ConnectionState::Closed, Some(&handle));
    tracing::info!(
        identity = %identity,
        connection = handle.id(),
        unregistered = removed,
        "push connection closed"
    );
}

fn transition(state: &mut ConnectionState, next: ConnectionState, handle: Option<&ConnectionHandle>) {
    match state.advance(next) {
        Some(advanced) => {
            tracing::trace!(
                connection = handle.map(ConnectionHandle::id),
                from = ?*state,
                to = ?advanced,
                "connection state"
            );
            *state = advanced;
        }
        None => {
            tracing::error!(from = ?*state, to = ?next, "illegal connection state transition");
        }
    }
}

/// Waits for the first data frame and validates it as `identify`.
///
/// Ping and pong frames are skipped. Returns the authenticated identity and
/// the framing the client used.
async fn wait_for_identify(
    receiver: &mut (impl StreamExt<Item = Result<WsMessage, axum::Error>> + Unpin),
    auth: &dyn Authenticator,
    require_token: bool,
) -> Result<(Identity, Framing), Rejection> {
    while let Some(Ok(msg)) = receiver.next().await {
        let (decoded, framing) = match msg {
            WsMessage::Text(text) => (codec::decode_client_text(text.as_str()), Framing::Text),
            WsMessage::Binary(bytes) => (codec::decode_client_binary(&bytes), Framing::Binary),
            WsMessage::Close(_) => return Err(Rejection::Disconnected),
            _ => continue,
        };

        let event = decoded.map_err(|e| Rejection::Violation {
            reason: format!("expected identify: {e}"),
            framing,
        })?;

        let ClientEvent::Identify { identity, token } = event;
        return check_identify(identity, token.as_deref(), auth, require_token)
            .map(|identity| (identity, framing))
            .map_err(|reason| Rejection::Violation { reason, framing });
    }
    Err(Rejection::Disconnected)
}

/// Confirms the claimed identity against the presented token.
fn check_identify(
    identity: Identity,
    token: Option<&str>,
    auth: &dyn Authenticator,
    require_token: bool,
) -> Result<Identity, String> {
    match token {
        Some(token) => {
            let owner = auth.authenticate(token).map_err(|e| e.to_string())?;
            if owner == identity {
                Ok(identity)
            } else {
                Err(format!("token was not issued for {identity}"))
            }
        }
        None if require_token => Err("identify requires a token".to_string()),
        None => Ok(identity),
    }
}

async fn send_event(
    ws_sender: &mut (impl SinkExt<WsMessage, Error = axum::Error> + Unpin),
    event: &ServerEvent,
    framing: Framing,
) -> Result<(), String> {
    let msg = match codec::encode_server(event, framing).map_err(|e| e.to_string())? {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
    };
    ws_sender
        .send(msg)
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

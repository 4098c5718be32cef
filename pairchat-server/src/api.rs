//! REST routes.
//!
//! Every route except `/health` requires a bearer token, and callers may
//! only act as themselves.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use pairchat_proto::identity::Identity;
use pairchat_proto::message::{ChatId, ChatSession, ChatThread, Message};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::Actor;
use crate::error::ChatError;
use crate::server::AppState;

/// REST routes, to be merged into the main router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/chats", post(create_chat))
        .route("/chats/{id}", get(list_chats))
        .route("/chats/{id}/messages", post(post_message))
}

/// Body of `POST /chats`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    /// The identity to open a chat with.
    pub other_identity: Option<String>,
}

/// Body of `POST /chats/{chatId}/messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    /// The sending identity; must be the caller.
    pub sender_id: Option<String>,
    /// The other participant of the chat.
    pub receiver_id: Option<String>,
    /// Message text, non-empty after trimming.
    pub body: Option<String>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.directory.len(),
        "online": state.presence.online_count(),
    }))
}

/// Create-or-get the chat between the caller and `otherIdentity`.
///
/// 201 when the chat was created by this call, 200 when it already existed.
async fn create_chat(
    Actor(actor): Actor,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateChatRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChatSession>), ChatError> {
    let Json(request) = payload.map_err(malformed)?;
    let other = Identity::parse(required(request.other_identity, "otherIdentity")?)?;

    let outcome = state.directory.create_or_get(actor, other).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.session)))
}

/// Every chat the caller participates in, each with its full message log.
async fn list_chats(
    Actor(actor): Actor,
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<Vec<ChatThread>>, ChatError> {
    if identity != actor.as_str() {
        return Err(ChatError::Unauthorized(format!(
            "{actor} may not list chats of {identity}"
        )));
    }
    Ok(Json(
        state.directory.list_for_participant(&actor, &state.store),
    ))
}

/// Store a message, then push it to the receiver if they are online.
async fn post_message(
    Actor(actor): Actor,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ChatError> {
    let chat_id: ChatId = chat_id
        .parse()
        .map_err(|e| ChatError::MalformedRequest(format!("invalid chat id `{chat_id}`: {e}")))?;

    let Json(request) = payload.map_err(malformed)?;
    let sender = required(request.sender_id, "senderId")?;
    let receiver = required(request.receiver_id, "receiverId")?;
    let body = required(request.body, "body")?;

    if sender != actor.as_str() {
        return Err(ChatError::Unauthorized(format!(
            "{actor} may not send as {sender}"
        )));
    }
    let receiver = Identity::parse(receiver)?;

    let message = state.store.append(chat_id, &actor, &receiver, &body).await?;
    state.dispatcher.deliver(&message);

    Ok((StatusCode::CREATED, Json(message)))
}

fn required(field: Option<String>, name: &str) -> Result<String, ChatError> {
    field.ok_or_else(|| ChatError::MalformedRequest(format!("missing field `{name}`")))
}

fn malformed(rejection: JsonRejection) -> ChatError {
    ChatError::MalformedRequest(rejection.body_text())
}

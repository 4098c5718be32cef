//! Error taxonomy for chat operations and its HTTP mapping.
//!
//! | Variant                | Status |
//! |------------------------|--------|
//! | `InvalidParticipants`  | 400    |
//! | `EmptyMessage`         | 400    |
//! | `MessageTooLarge`      | 400    |
//! | `MalformedRequest`     | 400    |
//! | `Unauthorized`         | 401    |
//! | `ChatNotFound`         | 404    |
//! | `ServerFault`          | 500    |
//!
//! Nothing here is retried by the server; the caller resubmits.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pairchat_proto::identity::IdentityError;
use pairchat_proto::message::{ChatId, ValidationError};
use serde_json::json;

use crate::journal::JournalError;

/// Errors surfaced by the session directory, message store and REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Self-pairing, a malformed identity, or a sender/receiver pair that
    /// does not match the chat's participants.
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    /// The chat id does not resolve to a session.
    #[error("chat {0} not found")]
    ChatNotFound(ChatId),

    /// The message body is empty after trimming.
    #[error("message body is empty")]
    EmptyMessage,

    /// The message body exceeds the configured limit.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    MessageTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Configured maximum in bytes.
        max: usize,
    },

    /// The request body or path could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Missing or invalid caller identity, or acting as someone else.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The storage layer failed.
    #[error("storage failure: {0}")]
    ServerFault(#[from] JournalError),
}

impl ChatError {
    /// Stable machine-readable code for the error body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidParticipants(_) => "INVALID_PARTICIPANTS",
            Self::ChatNotFound(_) => "CHAT_NOT_FOUND",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE",
            Self::MalformedRequest(_) => "MALFORMED_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::ServerFault(_) => "SERVER_FAULT",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParticipants(_)
            | Self::EmptyMessage
            | Self::MessageTooLarge { .. }
            | Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ChatNotFound(_) => StatusCode::NOT_FOUND,
            Self::ServerFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IdentityError> for ChatError {
    fn from(e: IdentityError) -> Self {
        Self::InvalidParticipants(e.to_string())
    }
}

impl From<ValidationError> for ChatError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Empty => Self::EmptyMessage,
            ValidationError::TooLarge { size, max } => Self::MessageTooLarge { size, max },
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if let Self::ServerFault(e) = &self {
            tracing::error!(error = %e, "storage failure while handling request");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

//! Serialization for push-channel frames.
//!
//! A push connection speaks one of two framings, chosen by the client with
//! its first frame:
//! - [`Framing::Text`]: JSON in WebSocket text frames (browser clients).
//! - [`Framing::Binary`]: postcard in WebSocket binary frames.
//!
//! The server answers in whichever framing the client identified with.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::event::{ClientEvent, ServerEvent};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Postcard serialization or deserialization failed.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Which encoding a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// JSON text frames.
    Text,
    /// Postcard binary frames.
    Binary,
}

/// An encoded frame ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A UTF-8 text frame.
    Text(String),
    /// A binary frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// Returns the framing this frame was encoded with.
    #[must_use]
    pub const fn framing(&self) -> Framing {
        match self {
            Self::Text(_) => Framing::Text,
            Self::Binary(_) => Framing::Binary,
        }
    }
}

fn encode<T: Serialize>(value: &T, framing: Framing) -> Result<Frame, CodecError> {
    match framing {
        Framing::Text => Ok(Frame::Text(serde_json::to_string(value)?)),
        Framing::Binary => Ok(Frame::Binary(postcard::to_allocvec(value)?)),
    }
}

fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(text)?)
}

fn decode_binary<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(postcard::from_bytes(bytes)?)
}

/// Encodes a [`ServerEvent`] in the given framing.
///
/// # Errors
///
/// Returns [`CodecError`] if the event cannot be serialized.
pub fn encode_server(event: &ServerEvent, framing: Framing) -> Result<Frame, CodecError> {
    encode(event, framing)
}

/// Encodes a [`ClientEvent`] in the given framing.
///
/// # Errors
///
/// Returns [`CodecError`] if the event cannot be serialized.
pub fn encode_client(event: &ClientEvent, framing: Framing) -> Result<Frame, CodecError> {
    encode(event, framing)
}

/// Decodes a [`ClientEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the text is not a known client event.
pub fn decode_client_text(text: &str) -> Result<ClientEvent, CodecError> {
    decode_text(text)
}

/// Decodes a [`ClientEvent`] from a postcard binary frame.
///
/// # Errors
///
/// Returns [`CodecError::Postcard`] if the bytes are not a known client event.
pub fn decode_client_binary(bytes: &[u8]) -> Result<ClientEvent, CodecError> {
    decode_binary(bytes)
}

/// Decodes a [`ServerEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the text is not a known server event.
pub fn decode_server_text(text: &str) -> Result<ServerEvent, CodecError> {
    decode_text(text)
}

/// Decodes a [`ServerEvent`] from a postcard binary frame.
///
/// # Errors
///
/// Returns [`CodecError::Postcard`] if the bytes are not a known server event.
pub fn decode_server_binary(bytes: &[u8]) -> Result<ServerEvent, CodecError> {
    decode_binary(bytes)
}

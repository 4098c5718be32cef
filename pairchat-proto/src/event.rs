//! Push-channel event types.
//!
//! [`ClientEvent`] is the closed set of events a client may send over its
//! persistent connection; [`ServerEvent`] is everything the server pushes
//! back. Both are externally tagged, so a JSON frame looks like
//! `{"identify":{"identity":"u1","token":"..."}}`.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::message::Message;

/// Events sent from a client to the server.
///
/// The protocol is deliberately narrow: a connection identifies itself once
/// and from then on only receives. Anything that does not decode into this
/// enum is a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEvent {
    /// Binds this connection to an identity.
    ///
    /// Must be the first event sent after the connection opens. The server
    /// answers with [`ServerEvent::Identified`] on success.
    Identify {
        /// Identity the connection claims.
        identity: Identity,
        /// Bearer credential proving the claim.
        #[serde(default)]
        token: Option<String>,
    },
}

/// Events pushed from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerEvent {
    /// The connection is now registered for this identity.
    Identified {
        /// Identity that was registered (echoed back for confirmation).
        identity: Identity,
    },

    /// A newly stored message addressed to this connection's identity.
    Message(Message),

    /// The server rejected something; the connection is closed afterwards.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

impl ServerEvent {
    /// Builds an [`ServerEvent::Error`] from anything displayable.
    #[must_use]
    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self::Error {
            reason: reason.to_string(),
        }
    }
}

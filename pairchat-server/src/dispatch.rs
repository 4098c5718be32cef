//! Best-effort push of freshly stored messages.
//!
//! Delivery is fire-and-forget: the message is already durable by the time
//! [`DeliveryDispatcher::deliver`] runs, so a missing or stale receiver
//! connection is not an error. The receiver catches up by listing its chats.
//! Nothing here is retried.

use std::sync::Arc;

use pairchat_proto::event::ServerEvent;
use pairchat_proto::message::Message;

use crate::presence::{PresenceBackend, PushError};

/// What happened to a push attempt. Only used for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Queued on the receiver's live connection.
    Pushed,
    /// Receiver has no live connection.
    Offline,
    /// Receiver's connection went away between lookup and push, or its
    /// queue is full.
    Dropped,
}

/// Pushes stored messages to their receiver's live connection, if any.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    presence: Arc<dyn PresenceBackend>,
}

impl DeliveryDispatcher {
    /// Creates a dispatcher that resolves receivers through `presence`.
    #[must_use]
    pub fn new(presence: Arc<dyn PresenceBackend>) -> Self {
        Self { presence }
    }

    /// Attempts to push `message` to its receiver. Never fails and never
    /// waits on the receiver.
    pub fn deliver(&self, message: &Message) -> DeliveryOutcome {
        let Some(handle) = self.presence.lookup(&message.receiver_id) else {
            tracing::debug!(
                receiver = %message.receiver_id,
                message_id = %message.id,
                "receiver offline, push skipped"
            );
            return DeliveryOutcome::Offline;
        };

        match handle.push(ServerEvent::Message(message.clone())) {
            Ok(()) => {
                tracing::debug!(
                    receiver = %message.receiver_id,
                    message_id = %message.id,
                    connection = handle.id(),
                    "message pushed"
                );
                DeliveryOutcome::Pushed
            }
            Err(e @ PushError::Full(_)) => {
                tracing::warn!(
                    receiver = %message.receiver_id,
                    message_id = %message.id,
                    error = %e,
                    "receiver backlogged, push dropped"
                );
                DeliveryOutcome::Dropped
            }
            Err(e @ PushError::Closed(_)) => {
                tracing::warn!(
                    receiver = %message.receiver_id,
                    message_id = %message.id,
                    error = %e,
                    "push to stale connection dropped"
                );
                // Only evicts if nobody has re-registered in the meantime.
                self.presence.unregister(&handle);
                DeliveryOutcome::Dropped
            }
        }
    }
}

//! Presence: which identity currently holds a live push connection.
//!
//! The registry keeps at most one [`ConnectionHandle`] per identity. A newer
//! registration replaces the older one ("last register wins"), and removal
//! only happens if the handle being removed is still the current one, so a
//! late disconnect from a superseded connection cannot evict its
//! replacement.
//!
//! Presence is process-local and starts empty; clients re-identify after a
//! restart. [`PresenceBackend`] is the seam for a shared external registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use pairchat_proto::event::ServerEvent;
use pairchat_proto::identity::Identity;
use tokio::sync::{Notify, mpsc};

/// Pushes a connection may have queued before further ones are dropped.
pub const OUTBOUND_CAPACITY: usize = 256;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Why a push was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// The connection's writer task has stopped.
    #[error("connection {0} is closed")]
    Closed(u64),
    /// The connection's queue is full; its client is not reading.
    #[error("connection {0} is not keeping up")]
    Full(u64),
}

/// Cheap, cloneable handle to one live push connection.
///
/// Equality is by connection id: two handles are the same connection only if
/// they came from the same [`ConnectionHandle::new`] call.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    identity: Identity,
    sender: mpsc::Sender<ServerEvent>,
    closing: Arc<Notify>,
}

impl ConnectionHandle {
    /// Creates a handle for a connection identified as `identity` whose
    /// writer task drains `sender`.
    #[must_use]
    pub fn new(identity: Identity, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            identity,
            sender,
            closing: Arc::new(Notify::new()),
        }
    }

    /// Process-unique connection id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Identity this connection registered as.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Queues an event for the connection without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the writer task has stopped, or
    /// [`PushError::Full`] if the queue is at capacity.
    pub fn push(&self, event: ServerEvent) -> Result<(), PushError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full(self.id),
            mpsc::error::TrySendError::Closed(_) => PushError::Closed(self.id),
        })
    }

    /// Asks the writer task to close the connection. Takes effect even when
    /// the queue is full.
    pub fn close(&self) {
        self.closing.notify_one();
    }

    /// Resolves once [`ConnectionHandle::close`] has been called.
    pub async fn close_requested(&self) {
        self.closing.notified().await;
    }

    /// Returns `true` if the writer task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// The register/unregister/lookup contract every presence implementation
/// provides.
pub trait PresenceBackend: Send + Sync {
    /// Makes `handle` the current connection for its identity, returning the
    /// handle it replaced, if any.
    fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle>;

    /// Removes `handle` only if it is still the current connection for its
    /// identity. Returns `true` if something was removed.
    fn unregister(&self, handle: &ConnectionHandle) -> bool;

    /// Returns the current connection for `identity`.
    fn lookup(&self, identity: &Identity) -> Option<ConnectionHandle>;
}

/// In-memory presence registry with one slot per identity.
#[derive(Default)]
pub struct PresenceRegistry {
    slots: DashMap<Identity, ConnectionHandle>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities with a live connection.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.slots.len()
    }

    /// Asks every registered connection to close.
    ///
    /// Used for graceful shutdown; each connection unregisters itself as it
    /// winds down.
    pub fn close_all(&self) {
        for entry in &self.slots {
            tracing::info!(identity = %entry.key(), "closing push connection");
            entry.value().close();
        }
    }
}

impl PresenceBackend for PresenceRegistry {
    fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.slots.insert(handle.identity.clone(), handle)
    }

    fn unregister(&self, handle: &ConnectionHandle) -> bool {
        self.slots
            .remove_if(&handle.identity, |_, current| current.id == handle.id)
            .is_some()
    }

    fn lookup(&self, identity: &Identity) -> Option<ConnectionHandle> {
        self.slots.get(identity).map(|h| h.clone())
    }
}

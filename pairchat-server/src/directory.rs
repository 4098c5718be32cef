//! Session directory: one durable chat session per unordered identity pair.
//!
//! The canonical [`Participants`] value is the uniqueness key. Lookups go
//! through sharded [`DashMap`] indexes; creation for a given pair is
//! serialized by an async mutex that exists only for that pair and only
//! while a creation is in flight, so unrelated pairs never contend.

use std::sync::Arc;

use dashmap::DashMap;
use pairchat_proto::identity::{Identity, Participants};
use pairchat_proto::message::{ChatId, ChatSession, ChatThread};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::ChatError;
use crate::journal::{self, Journal, JournalError, Record};
use crate::store::MessageStore;

/// Result of [`SessionDirectory::create_or_get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    /// The session for the pair, new or pre-existing.
    pub session: ChatSession,
    /// `true` if this call created the session.
    pub created: bool,
}

/// Maps identity pairs to chat sessions with create-or-get semantics.
#[derive(Default)]
pub struct SessionDirectory {
    index: Arc<Index>,
    journal: Option<Arc<Journal>>,
}

#[derive(Default)]
struct Index {
    sessions: DashMap<ChatId, ChatSession>,
    by_pair: DashMap<Participants, ChatId>,
    by_participant: DashMap<Identity, Vec<ChatId>>,
    pair_locks: DashMap<Participants, Arc<Mutex<()>>>,
    /// Duplicate-pair session ids seen during replay, mapped to the kept id.
    aliases: DashMap<ChatId, ChatId>,
}

impl SessionDirectory {
    /// Creates an empty, memory-only directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty directory that journals new sessions before
    /// publishing them.
    #[must_use]
    pub fn with_journal(journal: Arc<Journal>) -> Self {
        Self {
            journal: Some(journal),
            ..Self::default()
        }
    }

    /// Returns the session for `{a, b}`, creating it if none exists.
    ///
    /// Order of `a` and `b` does not matter. Concurrent calls for the same
    /// pair all observe the same session. Once creation starts it runs to
    /// completion even if the returned future is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidParticipants`] if `a == b`, or
    /// [`ChatError::ServerFault`] if the new session cannot be journaled.
    pub async fn create_or_get(&self, a: Identity, b: Identity) -> Result<CreateOutcome, ChatError> {
        let pair = Participants::new(a, b)?;

        if let Some(session) = self.index.find_by_pair(&pair) {
            return Ok(CreateOutcome {
                session,
                created: false,
            });
        }

        let lock = Arc::clone(&self.index.pair_locks.entry(pair.clone()).or_default());
        let guard = lock.lock_owned().await;

        // Another caller may have created it while we waited.
        if let Some(session) = self.index.find_by_pair(&pair) {
            return Ok(CreateOutcome {
                session,
                created: false,
            });
        }

        let session = ChatSession::new(pair);
        let commit = Arc::clone(&self.index).commit(session.clone(), self.journal.clone(), guard);
        journal::run_detached(commit).await?;

        tracing::info!(
            chat_id = %session.id,
            participants = %session.participants,
            "chat session created"
        );

        Ok(CreateOutcome {
            session,
            created: true,
        })
    }

    /// Returns every session containing `identity`, each joined with its
    /// ordered message log. Sessions are ordered by creation time.
    #[must_use]
    pub fn list_for_participant(&self, identity: &Identity, messages: &MessageStore) -> Vec<ChatThread> {
        let ids = self
            .index
            .by_participant
            .get(identity)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        let mut sessions: Vec<ChatSession> = ids.iter().filter_map(|id| self.get(id)).collect();
        sessions.sort_by_key(|s| (s.created_at, s.id));

        sessions
            .into_iter()
            .map(|session| ChatThread {
                messages: messages.list_by_chat(&session.id),
                session,
            })
            .collect()
    }

    /// Looks up a session by id.
    #[must_use]
    pub fn get(&self, id: &ChatId) -> Option<ChatSession> {
        self.index.sessions.get(id).map(|s| s.clone())
    }

    /// Looks up a session by id, following replay aliases to the session
    /// that was kept for the pair.
    #[must_use]
    pub fn resolve(&self, id: &ChatId) -> Option<ChatSession> {
        self.get(id).or_else(|| {
            let kept = *self.index.aliases.get(id)?;
            self.get(&kept)
        })
    }

    /// Number of sessions in the directory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.sessions.len()
    }

    /// Returns `true` if the directory holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.sessions.is_empty()
    }

    /// Re-inserts a session read back from the journal.
    ///
    /// Returns `false` if the pair is already mapped. The existing entry is
    /// kept and the duplicate id becomes an alias for it, so messages
    /// journaled under either id land in the same log.
    pub fn restore(&self, session: ChatSession) -> bool {
        let existing = self.index.by_pair.get(&session.participants).map(|id| *id);
        if let Some(existing) = existing {
            tracing::warn!(
                chat_id = %session.id,
                existing = %existing,
                "aliasing duplicate session for pair during replay"
            );
            self.index.aliases.insert(session.id, existing);
            return false;
        }
        self.index.publish(session);
        true
    }
}

impl Index {
    fn find_by_pair(&self, pair: &Participants) -> Option<ChatSession> {
        let id = *self.by_pair.get(pair)?;
        self.sessions.get(&id).map(|s| s.clone())
    }

    /// Journals then publishes a new session while `guard` holds the pair
    /// lock, then releases the lock.
    async fn commit(
        self: Arc<Self>,
        session: ChatSession,
        journal: Option<Arc<Journal>>,
        guard: OwnedMutexGuard<()>,
    ) -> Result<(), JournalError> {
        let written = match &journal {
            Some(journal) => journal.append(&Record::Session(session.clone())).await,
            None => Ok(()),
        };

        let pair = session.participants.clone();
        let published = written.is_ok();
        if published {
            self.publish(session);
        }
        drop(guard);

        if published {
            // Later callers take the fast path.
            self.pair_locks.remove(&pair);
        } else {
            // Waiters still hold the lock; the last one out removes it.
            self.pair_locks
                .remove_if(&pair, |_, lock| Arc::strong_count(lock) == 1);
        }
        written
    }

    /// Makes a session visible. The pair index is written last so the
    /// lock-free fast path never sees a half-indexed session.
    fn publish(&self, session: ChatSession) {
        let id = session.id;
        let pair = session.participants.clone();
        self.sessions.insert(id, session);
        for participant in pair.as_array() {
            self.by_participant
                .entry(participant.clone())
                .or_default()
                .push(id);
        }
        self.by_pair.insert(pair, id);
    }
}

//! Append-only, ordered message log.
//!
//! The [`MessageStore`] holds one log per chat session, kept sorted by
//! `(sent_at, id)`. There is no update or delete: once
//! [`MessageStore::append`] returns, the message is durable (journaled when
//! a journal is configured) and visible to every later read.

use std::sync::Arc;

use dashmap::DashMap;
use pairchat_proto::identity::Identity;
use pairchat_proto::message::{self, ChatId, MAX_BODY_SIZE, Message, MessageId, Timestamp};

use crate::directory::SessionDirectory;
use crate::error::ChatError;
use crate::journal::{self, Journal, JournalError, Record};

type Logs = DashMap<ChatId, Vec<Message>>;

/// Per-chat ordered message logs.
///
/// Appends to different chats lock different shards; appends to the same
/// chat are independent rows that are slotted into sorted position.
pub struct MessageStore {
    logs: Arc<Logs>,
    directory: Arc<SessionDirectory>,
    journal: Option<Arc<Journal>>,
    max_body_size: usize,
}

impl MessageStore {
    /// Creates an empty, memory-only store resolving chats through
    /// `directory`.
    #[must_use]
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self {
            logs: Arc::default(),
            directory,
            journal: None,
            max_body_size: MAX_BODY_SIZE,
        }
    }

    /// Creates an empty store that journals each message before it becomes
    /// visible.
    #[must_use]
    pub fn with_journal(directory: Arc<SessionDirectory>, journal: Arc<Journal>) -> Self {
        Self {
            journal: Some(journal),
            ..Self::new(directory)
        }
    }

    /// Sets the maximum accepted body size in bytes.
    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Stores a new message and returns it with its server-assigned id and
    /// timestamp.
    ///
    /// # Errors
    ///
    /// - [`ChatError::ChatNotFound`] if `chat_id` is unknown.
    /// - [`ChatError::InvalidParticipants`] if `{sender, receiver}` is not
    ///   the chat's participant pair.
    /// - [`ChatError::EmptyMessage`] / [`ChatError::MessageTooLarge`] if the
    ///   body fails validation.
    /// - [`ChatError::ServerFault`] if the journal write fails; nothing is
    ///   stored in that case.
    ///
    /// Once the write starts it runs to completion even if the returned
    /// future is dropped.
    pub async fn append(
        &self,
        chat_id: ChatId,
        sender: &Identity,
        receiver: &Identity,
        body: &str,
    ) -> Result<Message, ChatError> {
        let session = self
            .directory
            .get(&chat_id)
            .ok_or(ChatError::ChatNotFound(chat_id))?;

        if !session.participants.is_pair(sender, receiver) {
            return Err(ChatError::InvalidParticipants(format!(
                "{sender} and {receiver} are not the participants of chat {chat_id}"
            )));
        }

        message::validate_body(body, self.max_body_size)?;

        let message = Message {
            id: MessageId::new(),
            chat_id,
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
            body: body.to_string(),
            sent_at: Timestamp::now(),
        };

        let logs = Arc::clone(&self.logs);
        let journal = self.journal.clone();
        let stored = message.clone();
        journal::run_detached(async move {
            if let Some(journal) = journal {
                journal.append(&Record::Message(stored.clone())).await?;
            }
            insert_sorted(&logs, stored);
            Ok::<(), JournalError>(())
        })
        .await?;

        tracing::debug!(
            chat_id = %chat_id,
            message_id = %message.id,
            sender = %sender,
            "message stored"
        );

        Ok(message)
    }

    /// Returns every message in the chat, ascending by `sent_at` with the
    /// message id as tie-break. Unknown chats yield an empty list.
    #[must_use]
    pub fn list_by_chat(&self, chat_id: &ChatId) -> Vec<Message> {
        self.logs
            .get(chat_id)
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Re-inserts a message read back from the journal.
    ///
    /// A message journaled under an aliased chat id is filed under the chat
    /// kept for that pair. Returns `false` if its chat is unknown to the
    /// directory.
    pub fn restore(&self, mut message: Message) -> bool {
        let Some(session) = self.directory.resolve(&message.chat_id) else {
            tracing::warn!(
                chat_id = %message.chat_id,
                message_id = %message.id,
                "skipping journaled message for unknown chat"
            );
            return false;
        };
        message.chat_id = session.id;
        insert_sorted(&self.logs, message);
        true
    }
}

fn insert_sorted(logs: &Logs, message: Message) {
    let key = message.order_key();
    let mut log = logs.entry(message.chat_id).or_default();
    let pos = log.partition_point(|m| m.order_key() <= key);
    log.insert(pos, message);
}

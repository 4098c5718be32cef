//! Append-only JSON-lines journal backing sessions and messages.
//!
//! Every created session and every stored message is written as one line to
//! `<data_dir>/journal.jsonl` before it becomes visible in memory. On startup
//! the file is replayed to rebuild the session directory and message store.
//!
//! A torn final line (crash mid-write) is truncated away on open. Any other
//! unparseable line is treated as corruption and refuses startup. A write
//! that fails partway is rolled back to the previous length, so a failed
//! append never leaves a fragment for the next record to land on.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use pairchat_proto::message::{ChatSession, Message};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Journal file name inside the data directory.
pub const JOURNAL_FILE: &str = "journal.jsonl";

/// Errors raised by the journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Reading or writing the journal file failed.
    #[error("journal i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized.
    #[error("journal encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// A complete line in the journal could not be parsed.
    #[error("corrupt journal record at line {line}: {source}")]
    Corrupt {
        /// 1-based line number.
        line: usize,
        /// Parse error.
        source: serde_json::Error,
    },

    /// A failed write could not be rolled back; the journal refuses further
    /// appends until the process restarts.
    #[error("journal is poisoned by an earlier failed write")]
    Poisoned,

    /// The task committing a record panicked or was cancelled.
    #[error("journal commit task failed: {0}")]
    Commit(#[from] tokio::task::JoinError),
}

/// One durable fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Record {
    /// A chat session was created.
    Session(ChatSession),
    /// A message was stored.
    Message(Message),
}

/// Append-only writer over the journal file.
///
/// Writes are serialized through a single async mutex; each record is one
/// `write_all` of a full line followed by a flush (and `sync_data` when
/// `fsync` is enabled).
pub struct Journal {
    path: PathBuf,
    file: Mutex<Writer>,
    fsync: bool,
    poisoned: AtomicBool,
}

struct Writer {
    file: tokio::fs::File,
    /// Makes the next write stop after this many bytes and fail.
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl Journal {
    /// Opens (creating if needed) the journal in `data_dir` and returns it
    /// together with every record already on disk, in write order.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the directory or file cannot be
    /// accessed, or [`JournalError::Corrupt`] if a complete line fails to
    /// parse.
    pub async fn open(data_dir: &Path, fsync: bool) -> Result<(Self, Vec<Record>), JournalError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(JOURNAL_FILE);

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let valid_len = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
                if valid_len < bytes.len() {
                    tracing::warn!(
                        path = %path.display(),
                        dropped = bytes.len() - valid_len,
                        "truncating torn journal tail"
                    );
                    let file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
                    file.set_len(valid_len as u64).await?;
                }
                parse_records(&bytes[..valid_len])?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::info!(
            path = %path.display(),
            records = records.len(),
            "journal opened"
        );

        Ok((
            Self {
                path,
                file: Mutex::new(Writer {
                    file,
                    #[cfg(test)]
                    fail_after: None,
                }),
                fsync,
                poisoned: AtomicBool::new(false),
            },
            records,
        ))
    }

    /// Appends one record as a single line.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the record cannot be encoded or written,
    /// or [`JournalError::Poisoned`] after a write that could not be rolled
    /// back.
    pub async fn append(&self, record: &Record) -> Result<(), JournalError> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(JournalError::Poisoned);
        }
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut writer = self.file.lock().await;
        let len = writer.file.metadata().await?.len();
        if let Err(e) = writer.write_line(&line, self.fsync).await {
            match writer.file.set_len(len).await {
                Ok(()) => tracing::warn!(error = %e, "journal write failed, rolled back"),
                Err(rollback) => {
                    tracing::error!(
                        error = %e,
                        rollback = %rollback,
                        "journal write failed and could not be rolled back"
                    );
                    self.poisoned.store(true, Ordering::Release);
                }
            }
            return Err(e.into());
        }
        drop(writer);
        Ok(())
    }

    /// Makes the next append write only `bytes` bytes of its line and then
    /// fail, as a full disk would.
    #[cfg(test)]
    pub(crate) async fn fail_next_write_after(&self, bytes: usize) {
        self.file.lock().await.fail_after = Some(bytes);
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Writer {
    async fn write_line(&mut self, line: &[u8], fsync: bool) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(n) = self.fail_after.take() {
            self.file.write_all(&line[..n.min(line.len())]).await?;
            self.file.flush().await?;
            return Err(std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "no space left on device",
            ));
        }

        self.file.write_all(line).await?;
        self.file.flush().await?;
        if fsync {
            self.file.sync_data().await?;
        }
        Ok(())
    }
}

/// Runs `commit` on its own task and waits for it.
///
/// A journal write and the in-memory publish that follows it must both
/// happen or neither; a caller dropped mid-await cannot split them once they
/// run detached.
///
/// # Errors
///
/// Returns whatever `commit` returns, or [`JournalError::Commit`] if the task
/// panicked.
pub async fn run_detached<T, F>(commit: F) -> Result<T, JournalError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, JournalError>> + Send + 'static,
{
    tokio::spawn(commit).await?
}

fn parse_records(bytes: &[u8]) -> Result<Vec<Record>, JournalError> {
    let mut records = Vec::new();
    for (idx, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record = serde_json::from_slice(line)
            .map_err(|source| JournalError::Corrupt { line: idx + 1, source })?;
        records.push(record);
    }
    Ok(records)
}

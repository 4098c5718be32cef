//! Server bootstrap: shared state, router and listener.
//!
//! [`AppState`] wires the session directory, message store, presence
//! registry, delivery dispatcher and authenticator together. With a data
//! directory configured it replays the journal before serving.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::{Authenticator, StaticTokens};
use crate::config::ServerConfig;
use crate::directory::SessionDirectory;
use crate::dispatch::DeliveryDispatcher;
use crate::gateway;
use crate::journal::{Journal, JournalError, Record};
use crate::presence::{PresenceBackend, PresenceRegistry};
use crate::store::MessageStore;

/// Shared server state handed to every handler.
pub struct AppState {
    /// Chat sessions by id and by participant pair.
    pub directory: Arc<SessionDirectory>,
    /// Ordered message logs.
    pub store: Arc<MessageStore>,
    /// Live push connections.
    pub presence: Arc<PresenceRegistry>,
    /// Best-effort push of stored messages.
    pub dispatcher: DeliveryDispatcher,
    /// Bearer token resolution.
    pub auth: Arc<dyn Authenticator>,
    /// Whether push `identify` must carry a token.
    pub require_push_token: bool,
}

impl AppState {
    /// Assembles state around an existing directory and store.
    #[must_use]
    pub fn new(
        directory: Arc<SessionDirectory>,
        store: MessageStore,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let dispatcher = DeliveryDispatcher::new(Arc::clone(&presence) as Arc<dyn PresenceBackend>);
        Self {
            directory,
            store: Arc::new(store),
            presence,
            dispatcher,
            auth,
            require_push_token: true,
        }
    }

    /// Memory-only state with default limits.
    #[must_use]
    pub fn in_memory(auth: Arc<dyn Authenticator>) -> Self {
        let directory = Arc::new(SessionDirectory::new());
        let store = MessageStore::new(Arc::clone(&directory));
        Self::new(directory, store, auth)
    }

    /// Sets whether push `identify` must carry a token.
    #[must_use]
    pub fn with_require_push_token(mut self, require: bool) -> Self {
        self.require_push_token = require;
        self
    }

    /// Builds state from resolved configuration, replaying the journal when
    /// a data directory is configured.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the journal cannot be opened or is
    /// corrupt.
    pub async fn open(config: &ServerConfig) -> Result<Self, JournalError> {
        let auth: Arc<dyn Authenticator> = Arc::new(StaticTokens::from_table(
            config
                .tokens
                .iter()
                .map(|(token, identity)| (token.clone(), identity.clone())),
        ));

        let Some(data_dir) = &config.data_dir else {
            tracing::warn!("no data directory configured, running memory-only");
            let directory = Arc::new(SessionDirectory::new());
            let store =
                MessageStore::new(Arc::clone(&directory)).with_max_body_size(config.max_body_size);
            return Ok(Self::new(directory, store, auth)
                .with_require_push_token(config.require_push_token));
        };

        let (journal, records) = Journal::open(data_dir, config.fsync).await?;
        let journal = Arc::new(journal);
        let directory = Arc::new(SessionDirectory::with_journal(Arc::clone(&journal)));
        let store = MessageStore::with_journal(Arc::clone(&directory), journal)
            .with_max_body_size(config.max_body_size);

        let (mut sessions, mut messages) = (0usize, 0usize);
        for record in records {
            match record {
                Record::Session(session) => sessions += usize::from(directory.restore(session)),
                Record::Message(message) => messages += usize::from(store.restore(message)),
            }
        }
        tracing::info!(sessions, messages, "journal replayed");

        Ok(Self::new(directory, store, auth).with_require_push_token(config.require_push_token))
    }
}

/// Builds the HTTP router: REST routes, the `/ws` push endpoint and request
/// tracing.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(gateway::ws_handler))
        .merge(api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the server with memory-only state and no tokens.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState::in_memory(Arc::new(StaticTokens::new())).with_require_push_token(false);
    start_server_with_state(addr, Arc::new(state)).await
}

/// Starts the server with a pre-built [`AppState`]; it runs until the task
/// is aborted.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    start_server_with_shutdown(addr, state, std::future::pending()).await
}

/// Starts the server and shuts it down gracefully once `shutdown` resolves.
///
/// On shutdown every live push connection is asked to close, then in-flight
/// requests are allowed to finish.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_shutdown<F>(
    addr: &str,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let presence = Arc::clone(&state.presence);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let signal = async move {
            shutdown.await;
            tracing::info!(
                online = presence.online_count(),
                "shutdown requested, closing push connections"
            );
            presence.close_all();
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(signal).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

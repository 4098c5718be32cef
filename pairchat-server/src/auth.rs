//! Caller authentication.
//!
//! Identity is issued elsewhere; this module only maps a presented bearer
//! token to the [`Identity`] it was issued for. [`Authenticator`] is the
//! seam for a real identity provider; [`StaticTokens`] is the table-backed
//! implementation loaded from configuration.
//!
//! REST handlers obtain the caller through the [`Actor`] extractor, which
//! reads `Authorization: Bearer <token>` (or the legacy `JWT <token>`).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use pairchat_proto::identity::Identity;

use crate::error::ChatError;
use crate::server::AppState;

/// Why a credential was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("missing credential; provide `Authorization: Bearer <token>`")]
    Missing,

    /// The `Authorization` header is not a bearer credential.
    #[error("malformed authorization header")]
    MalformedHeader,

    /// The token was not issued to anyone.
    #[error("invalid token")]
    InvalidToken,
}

impl From<AuthError> for ChatError {
    fn from(e: AuthError) -> Self {
        Self::Unauthorized(e.to_string())
    }
}

/// Resolves bearer tokens to identities.
pub trait Authenticator: Send + Sync {
    /// Returns the identity `token` was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the token is empty or unknown.
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Token table loaded once from configuration.
#[derive(Debug, Default)]
pub struct StaticTokens {
    table: HashMap<String, Identity>,
}

impl StaticTokens {
    /// Creates an empty table that rejects every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table from `(token, identity)` pairs.
    #[must_use]
    pub fn from_table(entries: impl IntoIterator<Item = (String, Identity)>) -> Self {
        Self {
            table: entries.into_iter().collect(),
        }
    }
}

impl Authenticator for StaticTokens {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        self.table
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Extracts the bearer token from request headers.
///
/// # Errors
///
/// Returns [`AuthError::Missing`] without an `Authorization` header and
/// [`AuthError::MalformedHeader`] if it is not `Bearer`/`JWT` followed by a
/// token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(AuthError::Missing);
    };
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("JWT "))
        .ok_or(AuthError::MalformedHeader)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::Missing);
    }
    Ok(token)
}

/// The authenticated caller of a REST request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub Identity);

impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = ChatError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let identity = state.auth.authenticate(token).map_err(|e| {
            tracing::debug!(error = %e, "request rejected by authenticator");
            e
        })?;
        Ok(Self(identity))
    }
}

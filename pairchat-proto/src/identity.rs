//! Identity and participant-pair types.
//!
//! An [`Identity`] is an opaque, externally issued user token. The chat core
//! never interprets it beyond checking that it is well-formed. A
//! [`Participants`] value is the canonical, order-independent pair of two
//! distinct identities that keys a chat session.

use serde::{Deserialize, Serialize};

/// Maximum identity length in bytes.
pub const MAX_IDENTITY_LEN: usize = 128;

/// Error returned when an identity or identity pair is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The identity string is empty.
    #[error("identity is empty")]
    Empty,
    /// The identity exceeds [`MAX_IDENTITY_LEN`] bytes.
    #[error("identity too long ({len} bytes, max {MAX_IDENTITY_LEN})")]
    TooLong {
        /// Actual length in bytes.
        len: usize,
    },
    /// The identity contains a character outside the accepted set.
    #[error("identity contains invalid character {0:?}")]
    InvalidChar(char),
    /// Both sides of a pair are the same identity.
    #[error("cannot pair an identity with itself")]
    SelfPair,
}

/// Opaque identifier for a user, issued and validated by an external
/// authentication service.
///
/// Accepted characters are ASCII alphanumerics plus `-`, `_`, `.`, `:`
/// and `@`. Comparison is exact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Parses and validates an identity.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the string is empty, too long, or has a
    /// character outside the accepted set.
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdentityError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(IdentityError::Empty);
        }
        if raw.len() > MAX_IDENTITY_LEN {
            return Err(IdentityError::TooLong { len: raw.len() });
        }
        if let Some(bad) = raw.chars().find(|c| !is_identity_char(*c)) {
            return Err(IdentityError::InvalidChar(bad));
        }
        Ok(Self(raw))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const fn is_identity_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@')
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two distinct participants of a chat session, in canonical order.
///
/// Construction sorts the pair, so `Participants::new(a, b)` and
/// `Participants::new(b, a)` are equal and hash identically. This makes the
/// value usable directly as the uniqueness key for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[Identity; 2]", into = "[Identity; 2]")]
pub struct Participants([Identity; 2]);

impl Participants {
    /// Builds the canonical pair for two identities.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::SelfPair`] if `a == b`.
    pub fn new(a: Identity, b: Identity) -> Result<Self, IdentityError> {
        if a == b {
            return Err(IdentityError::SelfPair);
        }
        if a < b {
            Ok(Self([a, b]))
        } else {
            Ok(Self([b, a]))
        }
    }

    /// Returns `true` if this pair is exactly `{a, b}` in either order.
    #[must_use]
    pub fn is_pair(&self, a: &Identity, b: &Identity) -> bool {
        (&self.0[0] == a && &self.0[1] == b) || (&self.0[0] == b && &self.0[1] == a)
    }

    /// Returns the participant that is not `identity`, if `identity` is in the
    /// pair.
    #[must_use]
    pub fn other(&self, identity: &Identity) -> Option<&Identity> {
        if &self.0[0] == identity {
            Some(&self.0[1])
        } else if &self.0[1] == identity {
            Some(&self.0[0])
        } else {
            None
        }
    }

    /// Returns both participants in canonical order.
    #[must_use]
    pub const fn as_array(&self) -> &[Identity; 2] {
        &self.0
    }
}

impl TryFrom<[Identity; 2]> for Participants {
    type Error = IdentityError;

    fn try_from(value: [Identity; 2]) -> Result<Self, Self::Error> {
        let [a, b] = value;
        Self::new(a, b)
    }
}

impl From<Participants> for [Identity; 2] {
    fn from(value: Participants) -> Self {
        value.0
    }
}

impl std::fmt::Display for Participants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.0[0], self.0[1])
    }
}

//! Application-level client identifier.
//!
//! [`ClientId`] is issued by the server at first contact and presented by
//! the client on reconnect. It is never derived from transport-level
//! values such as the `Sec-WebSocket-Key` header, which change on every
//! handshake.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Maximum accepted length of a client-presented identifier.
pub const MAX_CLIENT_ID_LEN: usize = 128;

/// Opaque identifier of a relay client.
///
/// Server-issued identifiers are UUID v4 strings, but any non-empty
/// printable ASCII token up to [`MAX_CLIENT_ID_LEN`] bytes is accepted on
/// reconnect so that clients keep whatever they were handed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Issues a fresh random identifier (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self::from(uuid::Uuid::new_v4())
    }

    /// Validates and wraps a client-presented identifier.
    ///
    /// Returns `None` for empty, oversized, or non-printable values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty()
            || raw.len() > MAX_CLIENT_ID_LEN
            || !raw.bytes().all(|b| b.is_ascii_graphic())
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<uuid::Uuid> for ClientId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl TryFrom<String> for ClientId {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| format!("invalid client id: {raw:?}"))
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

//! Live client sessions and their outbound delivery handle.
//!
//! Each WebSocket connection task owns the receiving half of a bounded
//! channel; the [`SessionHandle`] stored in the registry owns the sending
//! half. Delivery never waits: a full or closed channel fails immediately
//! with a [`DeliveryError`].
//!
//! Eviction travels out of band on a [`CancellationToken`], so a connection
//! whose queue is full still learns that it has been dropped.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use utoipa::ToSchema;

use super::ClientId;
use crate::ws::messages::ServerMessage;

/// Role a session plays in the review flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sends submissions and receives decisions.
    #[default]
    Submitter,
    /// Receives new submissions and issues decisions.
    Admin,
}

impl Role {
    /// Returns the lowercase wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitter => "submitter",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "submitter" | "client" | "user" => Ok(Self::Submitter),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Identifies one physical connection, as opposed to the client behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Creates a new random connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instruction queued for a connection task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Serialize and send a message to the peer.
    Message(ServerMessage),
    /// Close the connection once `after` has elapsed.
    Close {
        /// Grace period before the close frame is sent.
        after: Duration,
    },
}

/// Why a message could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The connection task has exited or the session was evicted.
    #[error("connection closed")]
    Closed,
    /// The connection is not draining its outbound queue.
    #[error("outbound queue full")]
    Full,
}

impl<T> From<mpsc::error::TrySendError<T>> for DeliveryError {
    fn from(err: mpsc::error::TrySendError<T>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => Self::Full,
            mpsc::error::TrySendError::Closed(_) => Self::Closed,
        }
    }
}

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    connection_id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    evicted: CancellationToken,
}

impl SessionHandle {
    /// Creates a handle and the receiver the connection task drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                connection_id: ConnectionId::new(),
                tx,
                evicted: CancellationToken::new(),
            },
            rx,
        )
    }

    /// Returns the id of the connection behind this handle.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queues a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the connection is gone or its queue is
    /// full.
    pub fn deliver(&self, message: ServerMessage) -> Result<(), DeliveryError> {
        self.enqueue(Outbound::Message(message))
    }

    /// Asks the connection task to close after `after` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the connection is gone or its queue is
    /// full.
    pub fn close_after(&self, after: Duration) -> Result<(), DeliveryError> {
        self.enqueue(Outbound::Close { after })
    }

    /// Marks the connection as evicted. Its task closes the socket without
    /// draining the queue, and every later delivery fails with
    /// [`DeliveryError::Closed`]. Idempotent.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    /// Resolves once [`SessionHandle::evict`] has been called.
    pub fn evicted(&self) -> WaitForCancellationFuture<'_> {
        self.evicted.cancelled()
    }

    /// Returns `true` once the session was evicted or its connection task
    /// has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.evicted.is_cancelled() || self.tx.is_closed()
    }

    fn enqueue(&self, item: Outbound) -> Result<(), DeliveryError> {
        if self.evicted.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(item)?;
        Ok(())
    }
}

/// A registered client: identity, role, and live connection.
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Application-level client id.
    pub id: ClientId,
    /// Role negotiated at connect time.
    pub role: Role,
    /// Outbound handle to the connection.
    pub handle: SessionHandle,
}

impl ClientSession {
    /// Creates a session record.
    #[must_use]
    pub fn new(id: ClientId, role: Role, handle: SessionHandle) -> Self {
        Self { id, role, handle }
    }

    /// Returns `true` for administrator sessions.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

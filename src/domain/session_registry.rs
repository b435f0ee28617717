//! Registry of live client sessions.
//!
//! [`SessionRegistry`] maps a [`ClientId`] to the session currently
//! connected under that id. Connection tasks run on the multi-threaded
//! runtime, so the map sits behind a [`tokio::sync::RwLock`]. Message
//! delivery happens outside the lock.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::session::{ClientSession, ConnectionId, Role};
use super::ClientId;
use crate::ws::messages::ServerMessage;

/// Live sessions keyed by client id.
///
/// At most one session exists per client id. Registering an id that is
/// already present closes the previous connection before installing the
/// new one. A session leaving the map by any path is evicted, which closes
/// its connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ClientId, ClientSession>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `session`, replacing and closing any existing session for
    /// the same client id.
    ///
    /// Returns the replaced session, if any.
    pub async fn register(&self, session: ClientSession) -> Option<ClientSession> {
        let mut map = self.sessions.write().await;
        let new_conn = session.handle.connection_id();
        let replaced = map.insert(session.id.clone(), session);
        drop(map);

        if let Some(old) = &replaced
            && old.handle.connection_id() != new_conn
        {
            tracing::info!(client_id = %old.id, old_conn = %old.handle.connection_id(), "closing superseded connection");
            old.handle.evict();
        }
        replaced
    }

    /// Returns the session registered under `id`. A session whose
    /// connection has already gone away counts as unregistered.
    pub async fn lookup(&self, id: &ClientId) -> Option<ClientSession> {
        self.sessions
            .read()
            .await
            .get(id)
            .filter(|s| !s.handle.is_closed())
            .cloned()
    }

    /// Removes the session registered under `id`. Removing an absent id is
    /// a no-op.
    pub async fn remove(&self, id: &ClientId) -> Option<ClientSession> {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = &removed {
            session.handle.evict();
        }
        removed
    }

    /// Removes the session for `id` only if it is still backed by
    /// `connection_id`.
    ///
    /// A connection that was superseded by a reconnect must not evict its
    /// successor when it finally shuts down.
    pub async fn remove_connection(&self, id: &ClientId, connection_id: ConnectionId) -> bool {
        let mut map = self.sessions.write().await;
        match map.get(id) {
            Some(s) if s.handle.connection_id() == connection_id => {
                if let Some(session) = map.remove(id) {
                    session.handle.evict();
                }
                true
            }
            _ => false,
        }
    }

    /// Delivers `message` to every session matching `predicate`.
    ///
    /// Recipients whose delivery fails are logged and removed; delivery to
    /// the remaining sessions continues. Returns the number of successful
    /// deliveries.
    pub async fn broadcast<P>(&self, predicate: P, message: &ServerMessage) -> usize
    where
        P: Fn(&ClientSession) -> bool,
    {
        let targets: Vec<ClientSession> = {
            let map = self.sessions.read().await;
            map.values().filter(|s| predicate(*s)).cloned().collect()
        };

        let mut delivered = 0usize;
        for session in targets {
            match session.handle.deliver(message.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(client_id = %session.id, error = %err, "broadcast delivery failed; dropping session");
                    self.remove_connection(&session.id, session.handle.connection_id())
                        .await;
                }
            }
        }
        delivered
    }

    /// Returns the number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Returns the number of registered sessions with the given role.
    pub async fn count_by_role(&self, role: Role) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.role == role)
            .count()
    }
}

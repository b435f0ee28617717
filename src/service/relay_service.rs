//! Relay service: submission intake, decision delivery, and admin fan-out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::domain::{
    ClientId, ClientSession, Decision, DeliveryError, Outbound, PendingDecision, ReviewPolicy,
    Role, SessionHandle, SessionRegistry, Submission, SubmissionId, SubmissionStatus, Verdict,
};
use crate::error::RelayError;
use crate::persistence::SubmissionStore;
use crate::ws::messages::ServerMessage;

/// Smallest outbound queue handed to a connection. A fresh connection is
/// sent up to three messages before its task starts draining.
const MIN_OUTBOUND_CAPACITY: usize = 8;

/// Timing and sizing knobs for decision delivery.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// How long an undelivered decision is held.
    pub pending_ttl: chrono::Duration,
    /// Delay between delivering a decision and closing the connection.
    pub close_grace: Duration,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for DeliverySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            pending_ttl: config.pending_decision_ttl(),
            close_grace: config.close_grace(),
            outbound_capacity: config.outbound_channel_capacity,
        }
    }
}

/// A freshly registered connection: its session record and the queue its
/// task must drain.
#[derive(Debug)]
pub struct Connected {
    /// The registered session.
    pub session: ClientSession,
    /// Outbound instructions for the connection task.
    pub outbound: mpsc::Receiver<Outbound>,
}

/// What happened to a decision after it was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionDelivery {
    /// Sent to the live session.
    Delivered,
    /// Stored for delivery on the client's next connect.
    Held,
    /// Neither sent nor held (holding it failed).
    Dropped,
}

/// Orchestration layer for the relay.
///
/// Owns references to the [`SessionRegistry`] for live connections, the
/// [`SubmissionStore`] for durable state, and the [`ReviewPolicy`]
/// consulted at intake. Every mutation follows the pattern: persist →
/// deliver to the owner (or hold) → fan out to admins.
#[derive(Debug, Clone)]
pub struct RelayService {
    sessions: Arc<SessionRegistry>,
    store: Arc<dyn SubmissionStore>,
    policy: Arc<dyn ReviewPolicy>,
    settings: DeliverySettings,
}

impl RelayService {
    /// Creates a new `RelayService`.
    #[must_use]
    pub fn new(
        sessions: Arc<SessionRegistry>,
        store: Arc<dyn SubmissionStore>,
        policy: Arc<dyn ReviewPolicy>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            sessions,
            store,
            policy,
            settings,
        }
    }

    /// Returns a reference to the inner [`SessionRegistry`].
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Registers a new connection.
    ///
    /// Uses `requested` as the client id when the client presents one and
    /// issues a fresh id otherwise. Any previous connection under the same
    /// id is closed. The connection is then sent, in order: a `session`
    /// message; the decision held for this client, if any (submitters); or
    /// the list of pending submissions (admins).
    pub async fn connect(&self, requested: Option<ClientId>, role: Role) -> Connected {
        let client_id = requested.unwrap_or_else(ClientId::generate);
        let (handle, outbound) =
            SessionHandle::channel(self.settings.outbound_capacity.max(MIN_OUTBOUND_CAPACITY));
        let session = ClientSession::new(client_id.clone(), role, handle);

        self.sessions.register(session.clone()).await;
        tracing::info!(%client_id, %role, conn = %session.handle.connection_id(), "client connected");

        let _ = session.handle.deliver(ServerMessage::Session {
            client_id: client_id.clone(),
            role,
        });

        match role {
            Role::Submitter => {
                self.flush_pending(&session).await;
            }
            Role::Admin => match self.store.list_submissions(Some(SubmissionStatus::Pending)).await {
                Ok(submissions) => {
                    let _ = session
                        .handle
                        .deliver(ServerMessage::InitialSubmissions { submissions });
                }
                Err(err) => {
                    tracing::warn!(%client_id, error = %err, "could not load pending submissions for admin");
                }
            },
        }

        Connected { session, outbound }
    }

    /// Unregisters a connection that has ended. A no-op when the client
    /// has already reconnected on another connection.
    pub async fn disconnect(&self, session: &ClientSession) {
        let removed = self
            .sessions
            .remove_connection(&session.id, session.handle.connection_id())
            .await;
        tracing::info!(client_id = %session.id, removed, "client disconnected");
    }

    /// Accepts a submission from `client_id`.
    ///
    /// Persists the payload as `pending`, acknowledges to the submitter,
    /// announces it to every admin, then runs the review policy. An
    /// immediate verdict goes through [`RelayService::decide`].
    ///
    /// Returns the submission in its latest state.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedPayload`] if `payload` is not a JSON
    /// object and [`RelayError::PersistenceFailure`] if storing it fails.
    pub async fn submit(
        &self,
        client_id: &ClientId,
        payload: Value,
    ) -> Result<Submission, RelayError> {
        if !payload.is_object() {
            return Err(RelayError::MalformedPayload(
                "submission must be a JSON object".to_string(),
            ));
        }

        let submission = self.store.insert_submission(client_id, &payload).await?;
        tracing::info!(submission_id = %submission.id, %client_id, "submission stored");

        self.send_to(
            client_id,
            ServerMessage::Acknowledge {
                submission_id: submission.id,
                message: "Form received and pending approval".to_string(),
            },
        )
        .await;
        self.notify_admins(&ServerMessage::new_submission(&submission), None)
            .await;

        match self.policy.evaluate(&submission.payload) {
            Verdict::Deferred => Ok(submission),
            Verdict::Decide { decision, reason } => {
                match self
                    .decide(None, submission.id, decision, Some(reason), None)
                    .await
                {
                    Err(RelayError::AlreadyDecided(id)) => self.get_submission(id).await,
                    other => other,
                }
            }
        }
    }

    /// Records `decision` on a submission and routes it to the submitter.
    ///
    /// When `expected_client` is given it must own the submission. The
    /// status change is persisted first; then the decision is delivered to
    /// the owner's live session (closing it after the grace period) or held
    /// for the owner's next connect. Admins other than `actor` are told
    /// about the decision.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SubmissionNotFound`],
    /// [`RelayError::AlreadyDecided`], [`RelayError::InvalidRequest`] on an
    /// owner mismatch, and [`RelayError::PersistenceFailure`] on storage
    /// failure. Nothing is delivered when an error is returned.
    pub async fn decide(
        &self,
        expected_client: Option<&ClientId>,
        submission_id: SubmissionId,
        decision: Decision,
        reason: Option<String>,
        actor: Option<&ClientId>,
    ) -> Result<Submission, RelayError> {
        if let Some(expected) = expected_client {
            let current = self.get_submission(submission_id).await?;
            if current.client_id != *expected {
                return Err(RelayError::InvalidRequest(format!(
                    "submission {submission_id} does not belong to client {expected}"
                )));
            }
        }

        let decided = self
            .store
            .update_submission_status(
                submission_id,
                decision.status(),
                reason.as_deref(),
                Utc::now(),
            )
            .await?;

        let delivery = self
            .deliver_decision(&decided.client_id, submission_id, decision, reason)
            .await;
        tracing::info!(
            %submission_id,
            client_id = %decided.client_id,
            status = %decided.status,
            ?delivery,
            "submission decided"
        );

        self.notify_admins(
            &ServerMessage::SubmissionDecided {
                submission_id,
                status: decided.status,
                reason: decided.reason.clone(),
            },
            actor,
        )
        .await;

        Ok(decided)
    }

    /// Delivers `message` to every admin session except `exclude`.
    ///
    /// Per-recipient failures are logged and skipped. Returns the number of
    /// admins reached.
    pub async fn notify_admins(&self, message: &ServerMessage, exclude: Option<&ClientId>) -> usize {
        self.sessions
            .broadcast(
                |s| s.is_admin() && exclude.is_none_or(|ex| *ex != s.id),
                message,
            )
            .await
    }

    /// Fetches one submission.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SubmissionNotFound`] for unknown ids and
    /// [`RelayError::PersistenceFailure`] on storage failure.
    pub async fn get_submission(&self, id: SubmissionId) -> Result<Submission, RelayError> {
        self.store
            .get_submission(id)
            .await?
            .ok_or(RelayError::SubmissionNotFound(id))
    }

    /// Lists submissions, optionally filtered by status, in intake order.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PersistenceFailure`] on storage failure.
    pub async fn list_submissions(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, RelayError> {
        self.store.list_submissions(status).await
    }

    /// Best-effort send to one client. A failed send unregisters the
    /// session. Returns `true` if the message was queued.
    async fn send_to(&self, client_id: &ClientId, message: ServerMessage) -> bool {
        let Some(session) = self.sessions.lookup(client_id).await else {
            return false;
        };
        match session.handle.deliver(message) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%client_id, error = %err, "delivery failed; dropping session");
                self.sessions
                    .remove_connection(client_id, session.handle.connection_id())
                    .await;
                false
            }
        }
    }

    async fn deliver_decision(
        &self,
        client_id: &ClientId,
        submission_id: SubmissionId,
        decision: Decision,
        reason: Option<String>,
    ) -> DecisionDelivery {
        if let Some(session) = self.sessions.lookup(client_id).await {
            let message = ServerMessage::decision(submission_id, decision, reason.clone());
            match session.handle.deliver(message) {
                Ok(()) => {
                    let _ = session.handle.close_after(self.settings.close_grace);
                    return DecisionDelivery::Delivered;
                }
                Err(err) => {
                    tracing::warn!(%client_id, error = %err, "decision delivery failed; holding it");
                    self.sessions
                        .remove_connection(client_id, session.handle.connection_id())
                        .await;
                }
            }
        }

        let pending = PendingDecision {
            client_id: client_id.clone(),
            submission_id,
            decision,
            reason,
            expires_at: self.expiry_from(Utc::now()),
        };
        if let Err(err) = self.store.set_pending_decision(&pending).await {
            tracing::error!(%client_id, %submission_id, error = %err, "failed to hold decision");
            return DecisionDelivery::Dropped;
        }

        // The client may have registered between the lookup above and the
        // store write, after its own connect found nothing to take.
        if let Some(session) = self.sessions.lookup(client_id).await {
            if self.flush_pending(&session).await {
                return DecisionDelivery::Delivered;
            }
        }
        DecisionDelivery::Held
    }

    /// Takes the decision held for `session` and delivers it. Returns
    /// `true` if one was delivered.
    ///
    /// Only the connection currently registered for the client receives it.
    /// When `session` has been superseded or cannot take the message, the
    /// decision is held again and handed to the current connection, if any.
    async fn flush_pending(&self, session: &ClientSession) -> bool {
        let mut target = session.clone();
        loop {
            let pending = match self.store.take_pending_decision(&target.id, Utc::now()).await {
                Ok(Some(pending)) => pending,
                Ok(None) => return false,
                Err(err) => {
                    tracing::warn!(client_id = %target.id, error = %err, "could not read pending decision");
                    return false;
                }
            };

            let current = self.sessions.lookup(&target.id).await;
            let is_current = current
                .as_ref()
                .is_some_and(|c| c.handle.connection_id() == target.handle.connection_id());
            let sent = if is_current {
                target.handle.deliver(ServerMessage::from_pending(&pending))
            } else {
                Err(DeliveryError::Closed)
            };

            match sent {
                Ok(()) => {
                    let _ = target.handle.close_after(self.settings.close_grace);
                    tracing::info!(client_id = %target.id, submission_id = %pending.submission_id, "delivered held decision");
                    return true;
                }
                Err(err) => {
                    tracing::warn!(client_id = %target.id, conn = %target.handle.connection_id(), error = %err, "held decision undeliverable; keeping it");
                    if is_current {
                        self.sessions
                            .remove_connection(&target.id, target.handle.connection_id())
                            .await;
                    }
                    if let Err(err) = self.store.set_pending_decision(&pending).await {
                        tracing::error!(client_id = %target.id, error = %err, "failed to re-hold decision");
                        return false;
                    }
                }
            }

            // Retry on a newer connection registered under the same id.
            match current {
                Some(next) if !is_current => target = next,
                _ => return false,
            }
        }
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.settings.pending_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

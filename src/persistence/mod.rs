//! Persistence layer: submissions and pending decisions.
//!
//! [`SubmissionStore`] is the contract the relay core relies on. Each
//! method is one transactional unit; in particular
//! [`SubmissionStore::take_pending_decision`] reads and clears in a single
//! step so a pending decision is handed out at most once.
//!
//! Two implementations ship: [`MemoryStore`] for single-process
//! deployments and tests, and [`PostgresStore`] backed by `sqlx::PgPool`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ClientId, PendingDecision, Submission, SubmissionId, SubmissionStatus};
use crate::error::RelayError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Durable storage for submissions and pending decisions.
#[async_trait]
pub trait SubmissionStore: std::fmt::Debug + Send + Sync {
    /// Stores a new `pending` submission and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PersistenceFailure`] on storage failure.
    async fn insert_submission(
        &self,
        client_id: &ClientId,
        payload: &serde_json::Value,
    ) -> Result<Submission, RelayError>;

    /// Moves a `pending` submission to `status`, recording reason and time.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SubmissionNotFound`] for unknown ids,
    /// [`RelayError::AlreadyDecided`] when the submission is no longer
    /// pending, and [`RelayError::PersistenceFailure`] on storage failure.
    async fn update_submission_status(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
        reason: Option<&str>,
        decided_at: DateTime<Utc>,
    ) -> Result<Submission, RelayError>;

    /// Fetches one submission.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PersistenceFailure`] on storage failure.
    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>, RelayError>;

    /// Lists submissions, optionally restricted to one status, in intake
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PersistenceFailure`] on storage failure.
    async fn list_submissions(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, RelayError>;

    /// Stores `pending`, replacing any decision already held for the same
    /// client.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PersistenceFailure`] on storage failure.
    async fn set_pending_decision(&self, pending: &PendingDecision) -> Result<(), RelayError>;

    /// Atomically removes and returns the decision held for `client_id`.
    ///
    /// Expired decisions are removed but not returned.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PersistenceFailure`] on storage failure.
    async fn take_pending_decision(
        &self,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingDecision>, RelayError>;
}

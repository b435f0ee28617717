//! In-process implementation of the persistence layer.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::SubmissionStore;
use crate::domain::{ClientId, PendingDecision, Submission, SubmissionId, SubmissionStatus};
use crate::error::RelayError;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    submissions: BTreeMap<SubmissionId, Submission>,
    pending: HashMap<ClientId, PendingDecision>,
}

/// Submission store held entirely in memory.
///
/// All state lives behind one [`tokio::sync::Mutex`], which makes every
/// trait method trivially atomic. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_submission(
        &self,
        client_id: &ClientId,
        payload: &serde_json::Value,
    ) -> Result<Submission, RelayError> {
        let mut inner = self.inner.lock().await;
        inner.next_id = inner.next_id.saturating_add(1);
        let submission = Submission {
            id: SubmissionId::new(inner.next_id),
            client_id: client_id.clone(),
            payload: payload.clone(),
            status: SubmissionStatus::Pending,
            submitted_at: Utc::now(),
            decided_at: None,
            reason: None,
        };
        inner.submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn update_submission_status(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
        reason: Option<&str>,
        decided_at: DateTime<Utc>,
    ) -> Result<Submission, RelayError> {
        let mut inner = self.inner.lock().await;
        let submission = inner
            .submissions
            .get_mut(&id)
            .ok_or(RelayError::SubmissionNotFound(id))?;
        if submission.status != SubmissionStatus::Pending {
            return Err(RelayError::AlreadyDecided(id));
        }
        submission.status = status;
        submission.reason = reason.map(str::to_string);
        submission.decided_at = Some(decided_at);
        Ok(submission.clone())
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>, RelayError> {
        Ok(self.inner.lock().await.submissions.get(&id).cloned())
    }

    async fn list_submissions(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, RelayError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .submissions
            .values()
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .cloned()
            .collect())
    }

    async fn set_pending_decision(&self, pending: &PendingDecision) -> Result<(), RelayError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        inner.pending.retain(|_, p| !p.is_expired(now));
        inner
            .pending
            .insert(pending.client_id.clone(), pending.clone());
        Ok(())
    }

    async fn take_pending_decision(
        &self,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingDecision>, RelayError> {
        let taken = self.inner.lock().await.pending.remove(client_id);
        Ok(taken.filter(|p| !p.is_expired(now)))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;
    use tokio_test::assert_ok;

    use super::*;
    use crate::domain::Decision;

    fn pending_for(client_id: &ClientId, submission: i64, ttl_secs: i64) -> PendingDecision {
        PendingDecision {
            client_id: client_id.clone(),
            submission_id: SubmissionId::new(submission),
            decision: Decision::Approve,
            reason: None,
            expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs),
        }
    }

    #[tokio::test]
    async fn insert_assigns_unique_increasing_ids() {
        let store = MemoryStore::new();
        let client = ClientId::generate();
        let Ok(a) = store.insert_submission(&client, &json!({"n": 1})).await else {
            panic!("insert failed");
        };
        let Ok(b) = store.insert_submission(&client, &json!({"n": 2})).await else {
            panic!("insert failed");
        };
        assert!(b.id > a.id);
        assert_eq!(a.status, SubmissionStatus::Pending);
    }

    #[tokio::test]
    async fn status_transitions_exactly_once() {
        let store = MemoryStore::new();
        let Ok(s) = store
            .insert_submission(&ClientId::generate(), &json!({}))
            .await
        else {
            panic!("insert failed");
        };

        let first = store
            .update_submission_status(s.id, SubmissionStatus::Approved, Some("ok"), Utc::now())
            .await;
        let Ok(first) = first else {
            panic!("first update should succeed");
        };
        assert_eq!(first.status, SubmissionStatus::Approved);
        assert_eq!(first.reason.as_deref(), Some("ok"));
        assert!(first.decided_at.is_some());

        let second = store
            .update_submission_status(s.id, SubmissionStatus::Denied, None, Utc::now())
            .await;
        assert!(matches!(second, Err(RelayError::AlreadyDecided(_))));
    }

    #[tokio::test]
    async fn update_unknown_submission_fails() {
        let store = MemoryStore::new();
        let result = store
            .update_submission_status(
                SubmissionId::new(99),
                SubmissionStatus::Approved,
                None,
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(RelayError::SubmissionNotFound(_))));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = MemoryStore::new();
        let client = ClientId::generate();
        assert_ok!(store.insert_submission(&client, &json!({})).await);
        let decided = assert_ok!(store.insert_submission(&client, &json!({})).await);
        assert_ok!(
            store
                .update_submission_status(decided.id, SubmissionStatus::Denied, None, Utc::now())
                .await
        );

        let all = store.list_submissions(None).await.unwrap_or_default();
        let pending = store
            .list_submissions(Some(SubmissionStatus::Pending))
            .await
            .unwrap_or_default();
        assert_eq!(all.len(), 2);
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn take_pending_is_read_once() {
        let store = MemoryStore::new();
        let client = ClientId::generate();
        assert_ok!(store.set_pending_decision(&pending_for(&client, 1, 60)).await);

        let first = store.take_pending_decision(&client, Utc::now()).await;
        assert!(matches!(first, Ok(Some(_))));
        let second = store.take_pending_decision(&client, Utc::now()).await;
        assert!(matches!(second, Ok(None)));
    }

    #[tokio::test]
    async fn pending_last_write_wins() {
        let store = MemoryStore::new();
        let client = ClientId::generate();
        assert_ok!(store.set_pending_decision(&pending_for(&client, 1, 60)).await);
        assert_ok!(store.set_pending_decision(&pending_for(&client, 2, 60)).await);

        let Ok(Some(taken)) = store.take_pending_decision(&client, Utc::now()).await else {
            panic!("expected a pending decision");
        };
        assert_eq!(taken.submission_id, SubmissionId::new(2));
    }

    #[tokio::test]
    async fn expired_pending_is_discarded() {
        let store = MemoryStore::new();
        let client = ClientId::generate();
        assert_ok!(store.set_pending_decision(&pending_for(&client, 1, 60)).await);

        let later = Utc::now() + chrono::Duration::seconds(120);
        let taken = store.take_pending_decision(&client, later).await;
        assert!(matches!(taken, Ok(None)));
        let again = store.take_pending_decision(&client, Utc::now()).await;
        assert!(matches!(again, Ok(None)));
    }
}

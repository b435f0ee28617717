//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::SubmissionStore;
use crate::config::RelayConfig;
use crate::domain::{
    ClientId, Decision, PendingDecision, Submission, SubmissionId, SubmissionStatus,
};
use crate::error::RelayError;

/// Row shape of the `submissions` table.
type SubmissionRow = (
    i64,
    String,
    serde_json::Value,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
);

const SUBMISSION_COLUMNS: &str =
    "id, client_id, payload, status, submitted_at, decided_at, reason";

/// PostgreSQL-backed submission store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the pool settings in `config` and applies pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError::PersistenceFailure`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(config: &RelayConfig) -> Result<Self, RelayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RelayError::PersistenceFailure(format!("migration failed: {e}")))?;

        tracing::info!(
            max_connections = config.database_max_connections,
            "connected to postgres"
        );
        Ok(Self::new(pool))
    }
}

fn submission_from_row(row: SubmissionRow) -> Result<Submission, RelayError> {
    let (id, client_id, payload, status, submitted_at, decided_at, reason) = row;
    let client_id = ClientId::parse(&client_id).ok_or_else(|| {
        RelayError::PersistenceFailure(format!("invalid client id in submission {id}"))
    })?;
    let status = status
        .parse::<SubmissionStatus>()
        .map_err(RelayError::PersistenceFailure)?;
    Ok(Submission {
        id: SubmissionId::new(id),
        client_id,
        payload,
        status,
        submitted_at,
        decided_at,
        reason,
    })
}

#[async_trait]
impl SubmissionStore for PostgresStore {
    async fn insert_submission(
        &self,
        client_id: &ClientId,
        payload: &serde_json::Value,
    ) -> Result<Submission, RelayError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "INSERT INTO submissions (client_id, payload, status) VALUES ($1, $2, 'pending') \
             RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(client_id.as_str())
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        submission_from_row(row)
    }

    async fn update_submission_status(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
        reason: Option<&str>,
        decided_at: DateTime<Utc>,
    ) -> Result<Submission, RelayError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "UPDATE submissions SET status = $2, reason = $3, decided_at = $4 \
             WHERE id = $1 AND status = 'pending' RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(id.get())
        .bind(status.as_str())
        .bind(reason)
        .bind(decided_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return submission_from_row(row);
        }
        // Zero rows: either the id is unknown or the submission is no
        // longer pending.
        if self.get_submission(id).await?.is_some() {
            Err(RelayError::AlreadyDecided(id))
        } else {
            Err(RelayError::SubmissionNotFound(id))
        }
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>, RelayError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(submission_from_row).transpose()
    }

    async fn list_submissions(
        &self,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>, RelayError> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, SubmissionRow>(&format!(
                "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE status = $1 ORDER BY id ASC"
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, SubmissionRow>(&format!(
                "SELECT {SUBMISSION_COLUMNS} FROM submissions ORDER BY id ASC"
            ))
            .fetch_all(&self.pool)
            .await
        }?;

        rows.into_iter().map(submission_from_row).collect()
    }

    async fn set_pending_decision(&self, pending: &PendingDecision) -> Result<(), RelayError> {
        // Expired rows for clients that never came back.
        let purged = sqlx::query("DELETE FROM pending_decisions WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if purged > 0 {
            tracing::debug!(purged, "discarded expired pending decisions");
        }

        sqlx::query(
            "INSERT INTO pending_decisions (client_id, submission_id, decision, reason, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (client_id) DO UPDATE SET submission_id = EXCLUDED.submission_id, \
             decision = EXCLUDED.decision, reason = EXCLUDED.reason, expires_at = EXCLUDED.expires_at",
        )
        .bind(pending.client_id.as_str())
        .bind(pending.submission_id.get())
        .bind(pending.decision.as_str())
        .bind(pending.reason.as_deref())
        .bind(pending.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_pending_decision(
        &self,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingDecision>, RelayError> {
        let row = sqlx::query_as::<_, (i64, String, Option<String>, DateTime<Utc>)>(
            "DELETE FROM pending_decisions WHERE client_id = $1 \
             RETURNING submission_id, decision, reason, expires_at",
        )
        .bind(client_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some((submission_id, decision, reason, expires_at)) = row else {
            return Ok(None);
        };
        let decision = decision
            .parse::<Decision>()
            .map_err(RelayError::PersistenceFailure)?;
        let pending = PendingDecision {
            client_id: client_id.clone(),
            submission_id: SubmissionId::new(submission_id),
            decision,
            reason,
            expires_at,
        };
        Ok((!pending.is_expired(now)).then_some(pending))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(client_id: &str, status: &str) -> SubmissionRow {
        (
            7,
            client_id.to_string(),
            json!({"message": "hello"}),
            status.to_string(),
            Utc::now(),
            None,
            None,
        )
    }

    #[test]
    fn row_maps_to_submission() {
        let Ok(submission) = submission_from_row(row("client-1", "approved")) else {
            panic!("row should map");
        };
        assert_eq!(submission.id, SubmissionId::new(7));
        assert_eq!(submission.client_id.as_str(), "client-1");
        assert_eq!(submission.status, SubmissionStatus::Approved);
        assert_eq!(submission.payload["message"], "hello");
    }

    #[test]
    fn row_with_bad_status_or_client_is_persistence_failure() {
        let bad_status = submission_from_row(row("client-1", "archived"));
        assert!(matches!(bad_status, Err(RelayError::PersistenceFailure(_))));
        let bad_client = submission_from_row(row("", "pending"));
        assert!(matches!(bad_client, Err(RelayError::PersistenceFailure(_))));
    }

    async fn live_store() -> Option<PostgresStore> {
        let database_url = std::env::var("DATABASE_URL").ok()?;
        let config = RelayConfig {
            database_url,
            ..RelayConfig::default()
        };
        match PostgresStore::connect(&config).await {
            Ok(store) => Some(store),
            Err(err) => panic!("DATABASE_URL is set but unusable: {err}"),
        }
    }

    fn pending(client_id: &ClientId, submission_id: SubmissionId, ttl_secs: i64) -> PendingDecision {
        PendingDecision {
            client_id: client_id.clone(),
            submission_id,
            decision: Decision::Deny,
            reason: Some("no".to_string()),
            expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs),
        }
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn status_update_distinguishes_missing_from_decided() {
        let Some(store) = live_store().await else {
            return;
        };
        let Ok(s) = store
            .insert_submission(&ClientId::generate(), &json!({"n": 1}))
            .await
        else {
            panic!("insert failed");
        };
        assert_eq!(s.status, SubmissionStatus::Pending);

        let first = store
            .update_submission_status(s.id, SubmissionStatus::Approved, Some("ok"), Utc::now())
            .await;
        let Ok(first) = first else {
            panic!("first update should succeed");
        };
        assert_eq!(first.reason.as_deref(), Some("ok"));

        let again = store
            .update_submission_status(s.id, SubmissionStatus::Denied, None, Utc::now())
            .await;
        assert!(matches!(again, Err(RelayError::AlreadyDecided(_))));

        let missing = store
            .update_submission_status(
                SubmissionId::new(i64::MAX),
                SubmissionStatus::Denied,
                None,
                Utc::now(),
            )
            .await;
        assert!(matches!(missing, Err(RelayError::SubmissionNotFound(_))));
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL DATABASE_URL"]
    async fn pending_decision_is_taken_once_and_expired_rows_are_purged() {
        let Some(store) = live_store().await else {
            return;
        };
        let client = ClientId::generate();
        let stale = ClientId::generate();
        let Ok(s) = store.insert_submission(&client, &json!({})).await else {
            panic!("insert failed");
        };

        assert!(store.set_pending_decision(&pending(&stale, s.id, -60)).await.is_ok());
        assert!(store.set_pending_decision(&pending(&client, s.id, 60)).await.is_ok());

        let Ok((stale_rows,)) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM pending_decisions WHERE client_id = $1",
        )
        .bind(stale.as_str())
        .fetch_one(&store.pool)
        .await
        else {
            panic!("count query failed");
        };
        assert_eq!(stale_rows, 0);

        let Ok(Some(taken)) = store.take_pending_decision(&client, Utc::now()).await else {
            panic!("pending decision should be taken");
        };
        assert_eq!(taken.decision, Decision::Deny);
        assert!(matches!(
            store.take_pending_decision(&client, Utc::now()).await,
            Ok(None)
        ));
    }
}

//! Submission records, review decisions, and pending decisions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ClientId;

/// Store-assigned identifier of a submission.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct SubmissionId(i64);

impl SubmissionId {
    /// Wraps a raw row identifier.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw row identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a submission.
///
/// A submission starts as `Pending` and transitions exactly once to
/// `Approved` or `Denied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved by policy or an administrator.
    Approved,
    /// Denied by policy or an administrator.
    Denied,
}

impl SubmissionStatus {
    /// Returns the lowercase wire/database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            other => Err(format!("unknown submission status: {other}")),
        }
    }
}

/// An approve/deny outcome for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Accept the submission.
    Approve,
    /// Reject the submission.
    Deny,
}

impl Decision {
    /// Status the submission takes once this decision is recorded.
    #[must_use]
    pub const fn status(self) -> SubmissionStatus {
        match self {
            Self::Approve => SubmissionStatus::Approved,
            Self::Deny => SubmissionStatus::Denied,
        }
    }

    /// Returns the lowercase wire/database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" | "approved" => Ok(Self::Approve),
            "deny" | "denied" => Ok(Self::Deny),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// A persisted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Submission {
    /// Store-assigned identifier.
    pub id: SubmissionId,
    /// Client that submitted the payload.
    pub client_id: ClientId,
    /// Submitted form data (always a JSON object).
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    /// Current review status.
    pub status: SubmissionStatus,
    /// Intake timestamp.
    pub submitted_at: DateTime<Utc>,
    /// Decision timestamp, once decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// Reason attached to the decision, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A decision recorded while its target client was not connected.
///
/// Held by the store, keyed by client id (one per client, last write
/// wins), and consumed atomically on the client's next connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDecision {
    /// Client the decision is addressed to.
    pub client_id: ClientId,
    /// Decided submission.
    pub submission_id: SubmissionId,
    /// The decision itself.
    pub decision: Decision,
    /// Reason attached to the decision.
    pub reason: Option<String>,
    /// Instant after which the decision is discarded undelivered.
    pub expires_at: DateTime<Utc>,
}

impl PendingDecision {
    /// Returns `true` once `now` has reached the expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

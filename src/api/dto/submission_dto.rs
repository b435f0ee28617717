//! Submission listing and decision DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{ClientId, Decision, Submission, SubmissionStatus};

/// Query parameters for `GET /submissions`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct SubmissionQuery {
    /// Only return submissions in this status.
    #[serde(default)]
    pub status: Option<SubmissionStatus>,
}

/// Response body for `GET /submissions`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmissionListResponse {
    /// Submissions, newest first.
    pub data: Vec<Submission>,
    /// Number of submissions returned.
    pub total: usize,
}

/// Request body for `POST /submissions/{id}/decision`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DecisionRequest {
    /// `approve` or `deny`.
    pub decision: Decision,
    /// Optional reason delivered to the submitter.
    #[serde(default)]
    pub reason: Option<String>,
    /// Expected owner of the submission.
    #[serde(default)]
    pub client_id: Option<ClientId>,
}

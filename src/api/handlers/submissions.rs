//! Submission handlers: list, get, decide.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{DecisionRequest, SubmissionListResponse, SubmissionQuery};
use crate::app_state::AppState;
use crate::domain::{Submission, SubmissionId};
use crate::error::{ErrorResponse, RelayError};

/// `GET /submissions` — List submissions, newest first.
///
/// # Errors
///
/// Returns [`RelayError::PersistenceFailure`] if the store is unavailable.
#[utoipa::path(
    get,
    path = "/api/v1/submissions",
    tag = "Submissions",
    summary = "List submissions",
    description = "Returns all submissions, newest first, optionally filtered by status.",
    params(SubmissionQuery),
    responses(
        (status = 200, description = "Submission list", body = SubmissionListResponse),
        (status = 500, description = "Persistence failure", body = ErrorResponse),
    )
)]
pub async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<SubmissionQuery>,
) -> Result<impl IntoResponse, RelayError> {
    let mut data = state.relay_service.list_submissions(query.status).await?;
    data.reverse();
    let total = data.len();
    Ok(Json(SubmissionListResponse { data, total }))
}

/// `GET /submissions/{id}` — Get one submission.
///
/// # Errors
///
/// Returns [`RelayError::SubmissionNotFound`] if no submission has this id.
#[utoipa::path(
    get,
    path = "/api/v1/submissions/{id}",
    tag = "Submissions",
    summary = "Get a submission",
    params(("id" = i64, Path, description = "Submission id")),
    responses(
        (status = 200, description = "The submission", body = Submission),
        (status = 404, description = "Unknown submission", body = ErrorResponse),
    )
)]
pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, RelayError> {
    let submission = state
        .relay_service
        .get_submission(SubmissionId::new(id))
        .await?;
    Ok(Json(submission))
}

/// `POST /submissions/{id}/decision` — Approve or deny a submission.
///
/// Follows the same path as a WebSocket admin decision: the submitter
/// receives it now or on reconnect, and every admin session is notified.
///
/// # Errors
///
/// Returns [`RelayError::SubmissionNotFound`], [`RelayError::AlreadyDecided`],
/// or [`RelayError::InvalidRequest`] on an owner mismatch.
#[utoipa::path(
    post,
    path = "/api/v1/submissions/{id}/decision",
    tag = "Submissions",
    summary = "Decide a submission",
    params(("id" = i64, Path, description = "Submission id")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decision recorded", body = Submission),
        (status = 400, description = "Owner mismatch", body = ErrorResponse),
        (status = 404, description = "Unknown submission", body = ErrorResponse),
        (status = 409, description = "Already decided", body = ErrorResponse),
    )
)]
pub async fn decide_submission(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<DecisionRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let submission = state
        .relay_service
        .decide(
            req.client_id.as_ref(),
            SubmissionId::new(id),
            req.decision,
            req.reason,
            None,
        )
        .await?;
    Ok(Json(submission))
}

/// Submission routes, mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/submissions", get(list_submissions))
        .route("/submissions/{id}", get(get_submission))
        .route("/submissions/{id}/decision", post(decide_submission))
}

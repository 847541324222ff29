use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::core::state::AppState;
use crate::schemas::submission::{
    LinkSubmissionRequest, RepositorySubmissionRequest, SubmissionResponse,
};
use crate::services::pipeline;

use super::helpers;

pub(super) async fn submit_repository(
    Path(activity_id): Path<String>,
    CurrentStudent(user): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<RepositorySubmissionRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let submission =
        pipeline::submit_repository(&state, &activity_id, &user.id, &payload.repo_url).await?;

    Ok(Json(helpers::submission_to_response(submission)))
}

pub(super) async fn submit_link(
    Path(activity_id): Path<String>,
    CurrentStudent(user): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<LinkSubmissionRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let submission = pipeline::submit_freeform(
        &state,
        &activity_id,
        &user.id,
        &payload.url,
        &payload.description,
    )
    .await?;

    Ok(Json(helpers::submission_to_response(submission)))
}

pub(super) async fn get_my_submission(
    Path(activity_id): Path<String>,
    CurrentStudent(user): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = state
        .store()
        .find_submission(&activity_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch submission"))?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    Ok(Json(helpers::submission_to_response(submission)))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::schemas::submission::{
    ManualGradeRequest, SubmissionResponse, SubmissionWithStudentResponse,
};
use crate::services::originality::{self, OriginalityReport};
use crate::services::pipeline;

use super::helpers;

pub(super) async fn list_submissions(
    Path(activity_id): Path<String>,
    CurrentTeacher(_user): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubmissionWithStudentResponse>>, ApiError> {
    state
        .store()
        .find_activity(&activity_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch activity"))?
        .ok_or_else(|| ApiError::NotFound("Activity not found".to_string()))?;

    let rows = state
        .store()
        .list_activity_submissions(&activity_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    Ok(Json(rows.into_iter().map(helpers::roster_row_to_response).collect()))
}

pub(super) async fn override_grade(
    Path((activity_id, user_id)): Path<(String, String)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let submission = pipeline::override_grade(
        &state,
        &activity_id,
        &user_id,
        &teacher.id,
        payload.grade,
        payload.feedback,
        payload.url,
    )
    .await?;

    Ok(Json(helpers::submission_to_response(submission)))
}

pub(super) async fn delete_submission(
    Path((activity_id, user_id)): Path<(String, String)>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    pipeline::delete_submission(&state, &activity_id, &user_id, &teacher.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn originality_report(
    Path(activity_id): Path<String>,
    CurrentTeacher(_user): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<OriginalityReport>, ApiError> {
    state
        .store()
        .find_activity(&activity_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch activity"))?
        .ok_or_else(|| ApiError::NotFound("Activity not found".to_string()))?;

    let report = originality::analyze(state.store(), &activity_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to build originality report"))?;

    Ok(Json(report))
}

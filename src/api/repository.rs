use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::schemas::submission::RepositoryTreeResponse;
use crate::services::vcs::RepoIdentity;

#[derive(Debug, Deserialize)]
pub(crate) struct TreeQuery {
    pub(crate) url: String,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/tree", get(tree))
}

/// File listing for the activity editor, so teachers can pick the paths a
/// repository activity requires.
async fn tree(
    Query(query): Query<TreeQuery>,
    CurrentTeacher(_user): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<RepositoryTreeResponse>, ApiError> {
    let identity = RepoIdentity::parse(&query.url)
        .ok_or_else(|| ApiError::BadRequest("Invalid repository URL".to_string()))?;

    let paths = state
        .vcs()
        .list_tree(&identity)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list repository tree"))?;

    Ok(Json(RepositoryTreeResponse { repository: identity.full_name(), paths }))
}

pub(crate) mod helpers;
mod student;
mod teacher;

use axum::{routing::delete, routing::get, routing::post, routing::put, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        // Student endpoints
        .route("/:activity_id/submissions/repository", post(student::submit_repository))
        .route("/:activity_id/submissions/link", post(student::submit_link))
        .route("/:activity_id/submissions/me", get(student::get_my_submission))
        // Teacher endpoints
        .route("/:activity_id/submissions", get(teacher::list_submissions))
        .route("/:activity_id/submissions/:user_id/grade", put(teacher::override_grade))
        .route("/:activity_id/submissions/:user_id", delete(teacher::delete_submission))
        .route("/:activity_id/originality", get(teacher::originality_report))
}

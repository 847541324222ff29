use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RepositorySubmissionRequest {
    #[validate(length(min = 1, message = "repo_url must not be empty"))]
    pub(crate) repo_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct LinkSubmissionRequest {
    #[validate(url(message = "url must be a valid URL"))]
    pub(crate) url: String,
    #[validate(length(min = 1, message = "description must not be empty"))]
    pub(crate) description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ManualGradeRequest {
    #[validate(range(min = 0.0, max = 5.0, message = "grade must be between 0.0 and 5.0"))]
    pub(crate) grade: f64,
    #[validate(length(min = 1, message = "feedback must not be empty"))]
    pub(crate) feedback: String,
    #[serde(default)]
    #[validate(url(message = "url must be a valid URL"))]
    pub(crate) url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) activity_id: String,
    pub(crate) user_id: String,
    pub(crate) url: String,
    pub(crate) grade: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) attempt_count: i32,
    pub(crate) created_at: String,
    pub(crate) last_submitted_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionWithStudentResponse {
    pub(crate) id: String,
    pub(crate) activity_id: String,
    pub(crate) user_id: String,
    pub(crate) student_name: String,
    pub(crate) student_email: String,
    pub(crate) url: String,
    pub(crate) grade: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) attempt_count: i32,
    pub(crate) created_at: String,
    pub(crate) last_submitted_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RepositoryTreeResponse {
    pub(crate) repository: String,
    pub(crate) paths: Vec<String>,
}

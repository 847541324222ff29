use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{ActivityType, UserRole};

// Profile/role mirror of the platform identity provider; credentials stay
// on its side.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Activity {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) activity_type: ActivityType,
    /// Repository paths the evaluation covers, in grading order.
    pub(crate) file_paths: Json<Vec<String>>,
    pub(crate) max_attempts: i32,
    pub(crate) weight: f64,
    pub(crate) open_date: Option<PrimitiveDateTime>,
    pub(crate) deadline: PrimitiveDateTime,
    pub(crate) allow_link_submission: bool,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

// One row per (activity, user); repeated attempts fold into it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) activity_id: String,
    pub(crate) user_id: String,
    pub(crate) url: String,
    pub(crate) grade: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) attempt_count: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) last_submitted_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

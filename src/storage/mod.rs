pub(crate) mod postgres;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use sqlx::FromRow;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Activity, Submission, User};
use crate::db::types::{ActivityType, UserRole};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub(crate) struct NewUser {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) struct NewActivity {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) activity_type: ActivityType,
    pub(crate) file_paths: Vec<String>,
    pub(crate) max_attempts: i32,
    pub(crate) weight: f64,
    pub(crate) open_date: Option<PrimitiveDateTime>,
    pub(crate) deadline: PrimitiveDateTime,
    pub(crate) allow_link_submission: bool,
    pub(crate) created_by: String,
    pub(crate) now: PrimitiveDateTime,
}

/// One graded attempt, ready to fold into the submission row.
pub(crate) struct AttemptRecord {
    pub(crate) submission_id: String,
    pub(crate) activity_id: String,
    pub(crate) user_id: String,
    pub(crate) url: String,
    pub(crate) grade: f64,
    pub(crate) feedback: String,
    pub(crate) max_attempts: i32,
    pub(crate) now: PrimitiveDateTime,
}

/// A teacher-entered grade; replaces whatever is stored and never counts
/// as an attempt.
pub(crate) struct OverrideRecord {
    pub(crate) submission_id: String,
    pub(crate) activity_id: String,
    pub(crate) user_id: String,
    pub(crate) url: Option<String>,
    pub(crate) grade: f64,
    pub(crate) feedback: String,
    pub(crate) now: PrimitiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct SubmissionWithStudent {
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
    pub(crate) student_name: String,
    pub(crate) student_email: String,
}

/// Persistence boundary for the evaluation pipeline. The conditional
/// attempt fold lives behind it so the attempt bound holds under
/// concurrent requests regardless of the backing store.
#[async_trait]
pub(crate) trait LedgerStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_activity(&self, id: &str) -> Result<Option<Activity>, StoreError>;

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, StoreError>;

    async fn find_submission(
        &self,
        activity_id: &str,
        user_id: &str,
    ) -> Result<Option<Submission>, StoreError>;

    /// Folds a graded attempt into the (activity, user) row atomically.
    /// Returns `None` when the row already carries `max_attempts` attempts.
    async fn record_attempt(
        &self,
        attempt: AttemptRecord,
    ) -> Result<Option<Submission>, StoreError>;

    async fn apply_override(&self, record: OverrideRecord) -> Result<Submission, StoreError>;

    async fn list_activity_submissions(
        &self,
        activity_id: &str,
    ) -> Result<Vec<SubmissionWithStudent>, StoreError>;

    async fn delete_submission(
        &self,
        activity_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError>;
}

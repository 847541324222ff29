use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::{Activity, Submission, User};
use crate::storage::{
    AttemptRecord, LedgerStore, NewActivity, NewUser, OverrideRecord, StoreError,
    SubmissionWithStudent,
};

const USER_COLUMNS: &str = "id, email, full_name, role, is_active, created_at, updated_at";

const ACTIVITY_COLUMNS: &str = "\
    id, course_id, title, description, activity_type, file_paths, max_attempts, \
    weight, open_date, deadline, allow_link_submission, created_by, created_at, updated_at";

const SUBMISSION_COLUMNS: &str = "\
    id, activity_id, user_id, url, grade, feedback, attempt_count, \
    created_at, last_submitted_at, updated_at";

#[derive(Clone)]
pub(crate) struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, full_name, role, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(user.email)
        .bind(user.full_name)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.now)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_activity(&self, id: &str) -> Result<Option<Activity>, StoreError> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(activity)
    }

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, StoreError> {
        let created = sqlx::query_as::<_, Activity>(&format!(
            "INSERT INTO activities (
                id, course_id, title, description, activity_type, file_paths,
                max_attempts, weight, open_date, deadline, allow_link_submission,
                created_by, created_at, updated_at
             ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$13)
             RETURNING {ACTIVITY_COLUMNS}"
        ))
        .bind(activity.id)
        .bind(activity.course_id)
        .bind(activity.title)
        .bind(activity.description)
        .bind(activity.activity_type)
        .bind(sqlx::types::Json(activity.file_paths))
        .bind(activity.max_attempts)
        .bind(activity.weight)
        .bind(activity.open_date)
        .bind(activity.deadline)
        .bind(activity.allow_link_submission)
        .bind(activity.created_by)
        .bind(activity.now)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_submission(
        &self,
        activity_id: &str,
        user_id: &str,
    ) -> Result<Option<Submission>, StoreError> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions \
             WHERE activity_id = $1 AND user_id = $2"
        ))
        .bind(activity_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(submission)
    }

    // Single-statement fold: the retention rule sits in the SET list and the
    // attempt bound in the conflict condition, so concurrent requests can
    // never push attempt_count past max_attempts. Mirrors
    // services::ledger::merge_attempt.
    async fn record_attempt(
        &self,
        attempt: AttemptRecord,
    ) -> Result<Option<Submission>, StoreError> {
        let updated = sqlx::query_as::<_, Submission>(&format!(
            "INSERT INTO submissions (
                id, activity_id, user_id, url, grade, feedback, attempt_count,
                created_at, last_submitted_at, updated_at
             ) VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $7, $7)
             ON CONFLICT (activity_id, user_id) DO UPDATE SET
                attempt_count = submissions.attempt_count + 1,
                grade = GREATEST(submissions.grade, EXCLUDED.grade),
                url = EXCLUDED.url,
                feedback = EXCLUDED.feedback,
                last_submitted_at = EXCLUDED.last_submitted_at,
                updated_at = EXCLUDED.updated_at
             WHERE submissions.attempt_count < $8
             RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(attempt.submission_id)
        .bind(attempt.activity_id)
        .bind(attempt.user_id)
        .bind(attempt.url)
        .bind(attempt.grade)
        .bind(attempt.feedback)
        .bind(attempt.now)
        .bind(attempt.max_attempts)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    // Overrides replace grade and feedback unconditionally, keep the stored
    // URL unless a new one is given, and leave the attempt counter and
    // last_submitted_at alone. A row is promoted into place when the student
    // never submitted.
    async fn apply_override(&self, record: OverrideRecord) -> Result<Submission, StoreError> {
        let updated = sqlx::query_as::<_, Submission>(&format!(
            "INSERT INTO submissions (
                id, activity_id, user_id, url, grade, feedback, attempt_count,
                created_at, last_submitted_at, updated_at
             ) VALUES ($1, $2, $3, COALESCE($4, ''), $5, $6, 0, $7, $7, $7)
             ON CONFLICT (activity_id, user_id) DO UPDATE SET
                grade = EXCLUDED.grade,
                feedback = EXCLUDED.feedback,
                url = COALESCE($4, submissions.url),
                updated_at = EXCLUDED.updated_at
             RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(record.submission_id)
        .bind(record.activity_id)
        .bind(record.user_id)
        .bind(record.url)
        .bind(record.grade)
        .bind(record.feedback)
        .bind(record.now)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn list_activity_submissions(
        &self,
        activity_id: &str,
    ) -> Result<Vec<SubmissionWithStudent>, StoreError> {
        let rows = sqlx::query_as::<_, SubmissionWithStudent>(
            "SELECT s.id, s.activity_id, s.user_id, s.url, s.grade, s.feedback, \
                    s.attempt_count, s.created_at, s.last_submitted_at, s.updated_at, \
                    u.full_name AS student_name, u.email AS student_email \
             FROM submissions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.activity_id = $1 \
             ORDER BY u.full_name, s.user_id",
        )
        .bind(activity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_submission(
        &self,
        activity_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM submissions WHERE activity_id = $1 AND user_id = $2")
            .bind(activity_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

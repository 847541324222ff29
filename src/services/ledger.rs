use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Activity, Submission};
use crate::services::aggregation::GradeOutcome;
use crate::storage::{AttemptRecord, LedgerStore, OverrideRecord, StoreError};

/// One submission row per (activity, user). An attempt may be recorded only
/// while `attempt_count` is below the activity's limit; callers check this
/// before running any analysis, and the store re-checks it atomically when
/// writing.
pub(crate) fn has_attempts_left(existing: Option<&Submission>, max_attempts: i32) -> bool {
    existing.map_or(true, |submission| submission.attempt_count < max_attempts)
}

/// The retention rule for graded attempts: `grade` keeps the best value seen
/// so far, while `url`, `feedback` and `last_submitted_at` always reflect the
/// latest attempt. `PgLedgerStore` mirrors this merge in its upsert; the two
/// must stay in sync.
pub(crate) fn merge_attempt(existing: Option<&Submission>, record: &AttemptRecord) -> Submission {
    match existing {
        None => Submission {
            id: record.submission_id.clone(),
            activity_id: record.activity_id.clone(),
            user_id: record.user_id.clone(),
            url: record.url.clone(),
            grade: Some(record.grade),
            feedback: Some(record.feedback.clone()),
            attempt_count: 1,
            created_at: record.now,
            last_submitted_at: record.now,
            updated_at: record.now,
        },
        Some(current) => Submission {
            id: current.id.clone(),
            activity_id: current.activity_id.clone(),
            user_id: current.user_id.clone(),
            url: record.url.clone(),
            grade: Some(best_grade(current.grade, record.grade)),
            feedback: Some(record.feedback.clone()),
            attempt_count: current.attempt_count + 1,
            created_at: current.created_at,
            last_submitted_at: record.now,
            updated_at: record.now,
        },
    }
}

/// A teacher's direct grade entry. Replaces `grade` and `feedback`
/// unconditionally, never touches `attempt_count` or `last_submitted_at`,
/// and keeps the stored URL unless the teacher supplied a new one. With no
/// existing row it creates one at attempt zero.
pub(crate) fn merge_override(existing: Option<&Submission>, record: &OverrideRecord) -> Submission {
    match existing {
        None => Submission {
            id: record.submission_id.clone(),
            activity_id: record.activity_id.clone(),
            user_id: record.user_id.clone(),
            url: record.url.clone().unwrap_or_default(),
            grade: Some(record.grade),
            feedback: Some(record.feedback.clone()),
            attempt_count: 0,
            created_at: record.now,
            last_submitted_at: record.now,
            updated_at: record.now,
        },
        Some(current) => Submission {
            id: current.id.clone(),
            activity_id: current.activity_id.clone(),
            user_id: current.user_id.clone(),
            url: record.url.clone().unwrap_or_else(|| current.url.clone()),
            grade: Some(record.grade),
            feedback: Some(record.feedback.clone()),
            attempt_count: current.attempt_count,
            created_at: current.created_at,
            last_submitted_at: current.last_submitted_at,
            updated_at: record.now,
        },
    }
}

fn best_grade(existing: Option<f64>, incoming: f64) -> f64 {
    match existing {
        Some(current) => current.max(incoming),
        None => incoming,
    }
}

/// Persists a graded attempt. `None` means the store rejected the write
/// because the attempt limit was already reached.
pub(crate) async fn record_attempt(
    store: &dyn LedgerStore,
    activity: &Activity,
    user_id: &str,
    url: &str,
    outcome: &GradeOutcome,
) -> Result<Option<Submission>, StoreError> {
    let record = AttemptRecord {
        submission_id: Uuid::new_v4().to_string(),
        activity_id: activity.id.clone(),
        user_id: user_id.to_string(),
        url: url.to_string(),
        grade: outcome.grade,
        feedback: outcome.feedback.clone(),
        max_attempts: activity.max_attempts,
        now: primitive_now_utc(),
    };
    store.record_attempt(record).await
}

pub(crate) async fn record_manual_override(
    store: &dyn LedgerStore,
    activity_id: &str,
    user_id: &str,
    url: Option<String>,
    grade: f64,
    feedback: String,
) -> Result<Submission, StoreError> {
    let record = OverrideRecord {
        submission_id: Uuid::new_v4().to_string(),
        activity_id: activity_id.to_string(),
        user_id: user_id.to_string(),
        url,
        grade,
        feedback,
        now: primitive_now_utc(),
    };
    store.apply_override(record).await
}

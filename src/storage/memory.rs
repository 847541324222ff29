use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::types::Json;

use crate::db::models::{Activity, Submission, User};
use crate::services::ledger;

use super::{
    AttemptRecord, LedgerStore, NewActivity, NewUser, OverrideRecord, StoreError,
    SubmissionWithStudent,
};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    activities: HashMap<String, Activity>,
    submissions: HashMap<(String, String), Submission>,
}

/// Hermetic stand-in for `PgLedgerStore`. Applies the merge rules from
/// `services::ledger`, which the SQL upsert mirrors, so tests observe the
/// same retention behavior as production.
#[derive(Default)]
pub(crate) struct InMemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl InMemoryLedgerStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().unwrap().users.get(id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let stored = User {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            is_active: user.is_active,
            created_at: user.now,
            updated_at: user.now,
        };
        self.inner.lock().unwrap().users.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_activity(&self, id: &str) -> Result<Option<Activity>, StoreError> {
        Ok(self.inner.lock().unwrap().activities.get(id).cloned())
    }

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, StoreError> {
        let stored = Activity {
            id: activity.id,
            course_id: activity.course_id,
            title: activity.title,
            description: activity.description,
            activity_type: activity.activity_type,
            file_paths: Json(activity.file_paths),
            max_attempts: activity.max_attempts,
            weight: activity.weight,
            open_date: activity.open_date,
            deadline: activity.deadline,
            allow_link_submission: activity.allow_link_submission,
            created_by: activity.created_by,
            created_at: activity.now,
            updated_at: activity.now,
        };
        self.inner.lock().unwrap().activities.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_submission(
        &self,
        activity_id: &str,
        user_id: &str,
    ) -> Result<Option<Submission>, StoreError> {
        let key = (activity_id.to_string(), user_id.to_string());
        Ok(self.inner.lock().unwrap().submissions.get(&key).cloned())
    }

    async fn record_attempt(
        &self,
        attempt: AttemptRecord,
    ) -> Result<Option<Submission>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (attempt.activity_id.clone(), attempt.user_id.clone());
        let existing = inner.submissions.get(&key);
        if !ledger::has_attempts_left(existing, attempt.max_attempts) {
            return Ok(None);
        }
        let merged = ledger::merge_attempt(existing, &attempt);
        inner.submissions.insert(key, merged.clone());
        Ok(Some(merged))
    }

    async fn apply_override(&self, record: OverrideRecord) -> Result<Submission, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (record.activity_id.clone(), record.user_id.clone());
        let merged = ledger::merge_override(inner.submissions.get(&key), &record);
        inner.submissions.insert(key, merged.clone());
        Ok(merged)
    }

    async fn list_activity_submissions(
        &self,
        activity_id: &str,
    ) -> Result<Vec<SubmissionWithStudent>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<SubmissionWithStudent> = inner
            .submissions
            .values()
            .filter(|submission| submission.activity_id == activity_id)
            .map(|submission| {
                let (student_name, student_email) = inner
                    .users
                    .get(&submission.user_id)
                    .map(|user| (user.full_name.clone(), user.email.clone()))
                    .unwrap_or_default();
                SubmissionWithStudent {
                    id: submission.id.clone(),
                    activity_id: submission.activity_id.clone(),
                    user_id: submission.user_id.clone(),
                    url: submission.url.clone(),
                    grade: submission.grade,
                    feedback: submission.feedback.clone(),
                    attempt_count: submission.attempt_count,
                    created_at: submission.created_at,
                    last_submitted_at: submission.last_submitted_at,
                    updated_at: submission.updated_at,
                    student_name,
                    student_email,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            a.student_name.cmp(&b.student_name).then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(rows)
    }

    async fn delete_submission(
        &self,
        activity_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        let key = (activity_id.to_string(), user_id.to_string());
        Ok(self.inner.lock().unwrap().submissions.remove(&key).is_some())
    }
}

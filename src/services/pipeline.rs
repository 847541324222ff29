use std::time::Instant;

use serde_json::json;
use thiserror::Error;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Activity, Submission};
use crate::db::types::ActivityType;
use crate::services::aggregation::{self, GradeOutcome};
use crate::services::analysis::{self, AnalysisContext};
use crate::services::audit::AuditEvent;
use crate::services::ledger;
use crate::services::notify::GradeNotification;
use crate::services::retrieval;
use crate::services::vcs::RepoIdentity;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub(crate) enum EvaluationError {
    #[error("Invalid repository URL")]
    InvalidUrl,
    #[error("Activity not found")]
    ActivityNotFound,
    #[error("User not found")]
    UserNotFound,
    #[error("Submission not found")]
    SubmissionNotFound,
    #[error("Activity does not accept this kind of submission")]
    ActivityTypeMismatch,
    #[error("Submission window is closed")]
    SubmissionWindowClosed,
    #[error("No required files found in the repository")]
    NoFilesFound,
    #[error("Attempt limit exceeded")]
    AttemptLimitExceeded,
    #[error("Automatic evaluation failed: {0}")]
    AggregationFailed(String),
    #[error("Grade must be between 0.0 and 5.0")]
    GradeOutOfRange,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EvaluationError {
    /// Stable label for the `evaluation_jobs_total` counter.
    fn metric_status(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::ActivityNotFound | Self::UserNotFound | Self::SubmissionNotFound => "not_found",
            Self::ActivityTypeMismatch => "type_mismatch",
            Self::SubmissionWindowClosed => "window_closed",
            Self::NoFilesFound => "no_files",
            Self::AttemptLimitExceeded => "attempt_limit",
            Self::GradeOutOfRange => "grade_out_of_range",
            Self::AggregationFailed(_) => "aggregation_failed",
            Self::Store(_) => "storage_error",
        }
    }
}

/// Evaluates a repository submission end to end: parse the URL, fetch the
/// activity's required files, analyze them in order, fold the results into a
/// grade and record the attempt. Every gate runs before the first external
/// call it guards, so a rejected request leaves no trace in the ledger.
pub(crate) async fn submit_repository(
    state: &AppState,
    activity_id: &str,
    user_id: &str,
    repo_url: &str,
) -> Result<Submission, EvaluationError> {
    let timer = Instant::now();
    let result = evaluate_repository(state, activity_id, user_id, repo_url).await;
    observe_evaluation(timer, &result);
    result
}

/// Single-shot evaluation for Colab and manual link submissions.
pub(crate) async fn submit_freeform(
    state: &AppState,
    activity_id: &str,
    user_id: &str,
    url: &str,
    description: &str,
) -> Result<Submission, EvaluationError> {
    let timer = Instant::now();
    let result = evaluate_freeform(state, activity_id, user_id, url, description).await;
    observe_evaluation(timer, &result);
    result
}

async fn evaluate_repository(
    state: &AppState,
    activity_id: &str,
    user_id: &str,
    repo_url: &str,
) -> Result<Submission, EvaluationError> {
    let repo_url = repo_url.trim();
    let repo = RepoIdentity::parse(repo_url).ok_or(EvaluationError::InvalidUrl)?;

    let activity = find_activity(state, activity_id).await?;
    if activity.activity_type != ActivityType::Github {
        return Err(EvaluationError::ActivityTypeMismatch);
    }
    ensure_window_open(&activity)?;
    ensure_attempt_available(state, &activity, user_id).await?;
    if activity.file_paths.is_empty() {
        return Err(EvaluationError::NoFilesFound);
    }

    tracing::info!(
        activity_id = %activity.id,
        user_id = %user_id,
        repo = %repo.full_name(),
        "Evaluating repository submission"
    );

    let retrieved =
        retrieval::fetch_required(state.vcs(), &repo, activity.file_paths.as_slice()).await;
    if retrieved.nothing_found() {
        tracing::warn!(
            activity_id = %activity.id,
            user_id = %user_id,
            repo = %repo.full_name(),
            "None of the required files could be retrieved"
        );
        return Err(EvaluationError::NoFilesFound);
    }

    let context = AnalysisContext {
        activity_description: activity.description.clone(),
        repo_url: repo_url.to_string(),
        caller_id: user_id.to_string(),
    };
    let analyses = analysis::analyze_files(state.inference(), &retrieved.found, &context).await;
    let outcome = aggregation::aggregate(&analyses, &activity.description, &retrieved.missing);

    persist_attempt(state, &activity, user_id, repo_url, &outcome).await
}

async fn evaluate_freeform(
    state: &AppState,
    activity_id: &str,
    user_id: &str,
    url: &str,
    description: &str,
) -> Result<Submission, EvaluationError> {
    let url = url.trim();
    let activity = find_activity(state, activity_id).await?;
    if !accepts_link(&activity) {
        return Err(EvaluationError::ActivityTypeMismatch);
    }
    ensure_window_open(&activity)?;
    ensure_attempt_available(state, &activity, user_id).await?;

    tracing::info!(
        activity_id = %activity.id,
        user_id = %user_id,
        "Evaluating link submission"
    );

    let outcome = aggregation::aggregate_single_shot(
        state.inference(),
        description,
        url,
        &activity.description,
        user_id,
    )
    .await
    .map_err(|err| {
        tracing::error!(
            activity_id = %activity.id,
            user_id = %user_id,
            error = %err,
            "Holistic grading failed"
        );
        EvaluationError::AggregationFailed(err.to_string())
    })?;

    persist_attempt(state, &activity, user_id, url, &outcome).await
}

/// Records a grade a teacher entered by hand. Applies from any state,
/// replaces the stored grade and feedback unconditionally and never counts
/// against the attempt limit, so it works after the deadline too.
pub(crate) async fn override_grade(
    state: &AppState,
    activity_id: &str,
    user_id: &str,
    actor_id: &str,
    grade: f64,
    feedback: String,
    url: Option<String>,
) -> Result<Submission, EvaluationError> {
    if !grade.is_finite() || !(0.0..=5.0).contains(&grade) {
        return Err(EvaluationError::GradeOutOfRange);
    }
    let activity = find_activity(state, activity_id).await?;
    let student = state
        .store()
        .find_user(user_id)
        .await?
        .ok_or(EvaluationError::UserNotFound)?;

    let submission = ledger::record_manual_override(
        state.store(),
        &activity.id,
        &student.id,
        url,
        grade,
        feedback,
    )
    .await?;

    state
        .audit()
        .record(AuditEvent {
            action: "submission.override",
            actor_id: actor_id.to_string(),
            activity_id: activity.id.clone(),
            detail: json!({"user_id": student.id, "grade": grade}),
        })
        .await;
    state
        .notifications()
        .grade_published(GradeNotification {
            user_id: student.id.clone(),
            activity_id: activity.id.clone(),
            activity_title: activity.title.clone(),
            grade,
            manual: true,
        })
        .await;

    tracing::info!(
        activity_id = %activity.id,
        user_id = %student.id,
        actor_id = %actor_id,
        grade,
        "Manual grade recorded"
    );

    Ok(submission)
}

/// Removes a student's submission row, resetting them to attempt zero.
pub(crate) async fn delete_submission(
    state: &AppState,
    activity_id: &str,
    user_id: &str,
    actor_id: &str,
) -> Result<(), EvaluationError> {
    let deleted = state.store().delete_submission(activity_id, user_id).await?;
    if !deleted {
        return Err(EvaluationError::SubmissionNotFound);
    }

    state
        .audit()
        .record(AuditEvent {
            action: "submission.delete",
            actor_id: actor_id.to_string(),
            activity_id: activity_id.to_string(),
            detail: json!({"user_id": user_id}),
        })
        .await;

    tracing::info!(
        activity_id = %activity_id,
        user_id = %user_id,
        actor_id = %actor_id,
        "Submission deleted"
    );
    Ok(())
}

async fn find_activity(
    state: &AppState,
    activity_id: &str,
) -> Result<Activity, EvaluationError> {
    state
        .store()
        .find_activity(activity_id)
        .await?
        .ok_or(EvaluationError::ActivityNotFound)
}

fn ensure_window_open(activity: &Activity) -> Result<(), EvaluationError> {
    let now = primitive_now_utc();
    if let Some(open_date) = activity.open_date {
        if now < open_date {
            return Err(EvaluationError::SubmissionWindowClosed);
        }
    }
    if now > activity.deadline {
        return Err(EvaluationError::SubmissionWindowClosed);
    }
    Ok(())
}

async fn ensure_attempt_available(
    state: &AppState,
    activity: &Activity,
    user_id: &str,
) -> Result<(), EvaluationError> {
    let existing = state.store().find_submission(&activity.id, user_id).await?;
    if !ledger::has_attempts_left(existing.as_ref(), activity.max_attempts) {
        return Err(EvaluationError::AttemptLimitExceeded);
    }
    Ok(())
}

fn accepts_link(activity: &Activity) -> bool {
    match activity.activity_type {
        ActivityType::GoogleColab => true,
        ActivityType::Manual => activity.allow_link_submission,
        ActivityType::Github => false,
    }
}

async fn persist_attempt(
    state: &AppState,
    activity: &Activity,
    user_id: &str,
    url: &str,
    outcome: &GradeOutcome,
) -> Result<Submission, EvaluationError> {
    // The store re-checks the attempt bound inside its upsert; a concurrent
    // duplicate request loses here instead of double-incrementing.
    let submission = ledger::record_attempt(state.store(), activity, user_id, url, outcome)
        .await?
        .ok_or(EvaluationError::AttemptLimitExceeded)?;

    state
        .audit()
        .record(AuditEvent {
            action: "submission.attempt",
            actor_id: user_id.to_string(),
            activity_id: activity.id.clone(),
            detail: json!({
                "url": submission.url,
                "grade": submission.grade,
                "attempt_count": submission.attempt_count,
            }),
        })
        .await;
    state
        .notifications()
        .grade_published(GradeNotification {
            user_id: user_id.to_string(),
            activity_id: activity.id.clone(),
            activity_title: activity.title.clone(),
            grade: outcome.grade,
            manual: false,
        })
        .await;

    tracing::info!(
        activity_id = %activity.id,
        user_id = %user_id,
        grade = outcome.grade,
        attempt_count = submission.attempt_count,
        "Submission attempt recorded"
    );

    Ok(submission)
}

fn observe_evaluation(timer: Instant, result: &Result<Submission, EvaluationError>) {
    match result {
        Ok(_) => {
            metrics::counter!("evaluation_jobs_total", "status" => "success").increment(1);
            metrics::histogram!("evaluation_duration_seconds")
                .record(timer.elapsed().as_secs_f64());
        }
        Err(err) => {
            metrics::counter!("evaluation_jobs_total", "status" => err.metric_status())
                .increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LedgerStore;
    use crate::test_support::{github_activity, manual_activity, TestContext};
    use time::Duration;

    const REPO_URL: &str = "https://github.com/octocat/hello";

    #[tokio::test]
    async fn two_attempts_keep_best_grade_and_latest_url() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        let mut seed = github_activity("act-1", &["a.py", "b.py"]);
        seed.max_attempts = 2;
        ctx.insert_activity(seed).await;

        ctx.vcs.script_file("octocat/hello", "a.py", "print('a')");
        ctx.inference.script_file_score("a.py", 4.0);

        let first = submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await.unwrap();
        assert_eq!(first.attempt_count, 1);
        assert_eq!(first.grade, Some(2.0));
        let feedback = first.feedback.unwrap();
        assert!(feedback.contains("## a.py"));
        assert!(feedback.contains("- b.py"));

        ctx.vcs.script_file("octocat/hello", "b.py", "print('b')");
        ctx.inference.script_file_score("a.py", 4.5);
        ctx.inference.script_file_score("b.py", 4.0);

        let second_url = "https://github.com/octocat/hello.git";
        let second = submit_repository(&ctx.state, "act-1", "user-1", second_url).await.unwrap();
        assert_eq!(second.attempt_count, 2);
        assert_eq!(second.grade, Some(4.2));
        assert_eq!(second.url, second_url);
    }

    #[tokio::test]
    async fn grade_never_decreases_across_attempts() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        let mut seed = github_activity("act-1", &["a.py"]);
        seed.max_attempts = 5;
        ctx.insert_activity(seed).await;
        ctx.vcs.script_file("octocat/hello", "a.py", "print('a')");

        ctx.inference.script_file_score("a.py", 4.0);
        let first = submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await.unwrap();
        assert_eq!(first.grade, Some(4.0));

        ctx.inference.script_file_score("a.py", 3.0);
        let second = submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await.unwrap();
        assert_eq!(second.grade, Some(4.0));
        assert!(second.feedback.unwrap().contains("3.0/5.0"));
    }

    #[tokio::test]
    async fn attempt_over_the_limit_is_rejected_and_leaves_the_record_unchanged() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        let mut seed = github_activity("act-1", &["a.py"]);
        seed.max_attempts = 1;
        ctx.insert_activity(seed).await;
        ctx.vcs.script_file("octocat/hello", "a.py", "print('a')");
        ctx.inference.script_file_score("a.py", 4.0);

        let first = submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await.unwrap();

        let rejected = submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await;
        assert!(matches!(rejected, Err(EvaluationError::AttemptLimitExceeded)));

        let stored = ctx.store.find_submission("act-1", "user-1").await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 1);
        assert_eq!(stored.grade, first.grade);
        assert_eq!(stored.url, first.url);
    }

    #[tokio::test]
    async fn all_files_missing_fails_fast_without_writing() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        ctx.insert_activity(github_activity("act-1", &["a.py", "b.py"])).await;

        let result = submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await;
        assert!(matches!(result, Err(EvaluationError::NoFilesFound)));

        let stored = ctx.store.find_submission("act-1", "user-1").await.unwrap();
        assert!(stored.is_none());
        assert!(ctx.inference.analysis_calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_repository_url_is_rejected_before_any_lookup() {
        let ctx = TestContext::new().await;
        let result =
            submit_repository(&ctx.state, "act-1", "user-1", "https://gitlab.com/a/b").await;
        assert!(matches!(result, Err(EvaluationError::InvalidUrl)));
    }

    #[tokio::test]
    async fn repository_submission_to_a_colab_activity_is_rejected() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        let mut seed = github_activity("act-1", &[]);
        seed.activity_type = ActivityType::GoogleColab;
        ctx.insert_activity(seed).await;

        let result = submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await;
        assert!(matches!(result, Err(EvaluationError::ActivityTypeMismatch)));
    }

    #[tokio::test]
    async fn submissions_outside_the_window_are_rejected() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;

        let mut expired = github_activity("act-past", &["a.py"]);
        expired.deadline = primitive_now_utc() - Duration::days(1);
        ctx.insert_activity(expired).await;
        let result = submit_repository(&ctx.state, "act-past", "user-1", REPO_URL).await;
        assert!(matches!(result, Err(EvaluationError::SubmissionWindowClosed)));

        let mut unopened = github_activity("act-future", &["a.py"]);
        unopened.open_date = Some(primitive_now_utc() + Duration::days(1));
        ctx.insert_activity(unopened).await;
        let result = submit_repository(&ctx.state, "act-future", "user-1", REPO_URL).await;
        assert!(matches!(result, Err(EvaluationError::SubmissionWindowClosed)));
    }

    #[tokio::test]
    async fn failed_holistic_grading_does_not_consume_an_attempt() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        let mut seed = manual_activity("act-1", true);
        seed.max_attempts = 1;
        ctx.insert_activity(seed).await;
        ctx.inference.script_freeform_failure("service unavailable");

        let url = "https://colab.research.google.com/drive/abc";
        let failed = submit_freeform(&ctx.state, "act-1", "user-1", url, "Mi notebook").await;
        assert!(matches!(failed, Err(EvaluationError::AggregationFailed(_))));
        assert!(ctx.store.find_submission("act-1", "user-1").await.unwrap().is_none());

        ctx.inference.script_freeform(4.0, "Buen trabajo");
        let recorded =
            submit_freeform(&ctx.state, "act-1", "user-1", url, "Mi notebook").await.unwrap();
        assert_eq!(recorded.attempt_count, 1);
        assert_eq!(recorded.grade, Some(4.0));
    }

    #[tokio::test]
    async fn freeform_submission_requires_an_activity_that_accepts_links() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        ctx.insert_activity(manual_activity("act-links-off", false)).await;
        ctx.insert_activity(github_activity("act-repo", &["a.py"])).await;

        for activity_id in ["act-links-off", "act-repo"] {
            let result =
                submit_freeform(&ctx.state, activity_id, "user-1", "https://x.com", "desc").await;
            assert!(matches!(result, Err(EvaluationError::ActivityTypeMismatch)));
        }
    }

    #[tokio::test]
    async fn manual_override_replaces_the_grade_and_skips_the_attempt_counter() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        ctx.insert_student("teacher-1", "Teo").await;
        let mut seed = github_activity("act-1", &["a.py"]);
        seed.max_attempts = 3;
        ctx.insert_activity(seed).await;
        ctx.vcs.script_file("octocat/hello", "a.py", "print('a')");
        ctx.inference.script_file_score("a.py", 4.5);

        submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await.unwrap();

        let overridden = override_grade(
            &ctx.state,
            "act-1",
            "user-1",
            "teacher-1",
            2.0,
            "Plagio detectado".to_string(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(overridden.grade, Some(2.0));
        assert_eq!(overridden.feedback.as_deref(), Some("Plagio detectado"));
        assert_eq!(overridden.attempt_count, 1);
        assert_eq!(overridden.url, REPO_URL);

        let notifications = ctx.notifications.notifications();
        assert!(notifications.last().unwrap().manual);
    }

    #[tokio::test]
    async fn manual_override_promotes_a_student_without_a_submission() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        ctx.insert_activity(manual_activity("act-1", false)).await;

        let promoted = override_grade(
            &ctx.state,
            "act-1",
            "user-1",
            "teacher-1",
            4.0,
            "Entregado en papel".to_string(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(promoted.attempt_count, 0);
        assert_eq!(promoted.grade, Some(4.0));
    }

    #[tokio::test]
    async fn out_of_range_manual_grades_are_rejected() {
        let ctx = TestContext::new().await;
        for grade in [-0.1, 5.1, f64::NAN] {
            let result = override_grade(
                &ctx.state,
                "act-1",
                "user-1",
                "teacher-1",
                grade,
                "nota".to_string(),
                None,
            )
            .await;
            assert!(matches!(result, Err(EvaluationError::GradeOutOfRange)));
        }
    }

    #[tokio::test]
    async fn deleting_a_submission_resets_the_attempt_count() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        let mut seed = github_activity("act-1", &["a.py"]);
        seed.max_attempts = 1;
        ctx.insert_activity(seed).await;
        ctx.vcs.script_file("octocat/hello", "a.py", "print('a')");
        ctx.inference.script_file_score("a.py", 3.0);

        submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await.unwrap();
        let rejected = submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await;
        assert!(matches!(rejected, Err(EvaluationError::AttemptLimitExceeded)));

        delete_submission(&ctx.state, "act-1", "user-1", "teacher-1").await.unwrap();

        let retried = submit_repository(&ctx.state, "act-1", "user-1", REPO_URL).await.unwrap();
        assert_eq!(retried.attempt_count, 1);

        let missing = delete_submission(&ctx.state, "act-1", "ghost", "teacher-1").await;
        assert!(matches!(missing, Err(EvaluationError::SubmissionNotFound)));
    }

    #[tokio::test]
    async fn audit_trail_records_attempts_and_overrides() {
        let ctx = TestContext::new().await;
        ctx.insert_student("user-1", "Ana").await;
        ctx.insert_activity(manual_activity("act-1", true)).await;
        ctx.inference.script_freeform(3.5, "ok");

        submit_freeform(&ctx.state, "act-1", "user-1", "https://x.com/doc", "desc")
            .await
            .unwrap();
        override_grade(&ctx.state, "act-1", "user-1", "teacher-1", 4.0, "ajuste".into(), None)
            .await
            .unwrap();

        let actions: Vec<&'static str> =
            ctx.audit.events().iter().map(|event| event.action).collect();
        assert_eq!(actions, vec!["submission.attempt", "submission.override"]);
    }
}

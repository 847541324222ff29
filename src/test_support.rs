use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use time::Duration;

use crate::api;
use crate::core::{config::Settings, security, state::AppState, time::primitive_now_utc};
use crate::db::models::{Activity, User};
use crate::db::types::{ActivityType, UserRole};
use crate::services::analysis::FileAnalysisResult;
use crate::services::audit::{AuditEvent, AuditSink};
use crate::services::inference::{
    FileAnalysisRequest, FreeformAssessment, FreeformGradeRequest, InferenceService,
};
use crate::services::notify::{GradeNotification, NotificationSink};
use crate::services::vcs::{RepoIdentity, VcsContentService};
use crate::storage::memory::InMemoryLedgerStore;
use crate::storage::{LedgerStore, NewActivity, NewUser};

const TEST_SECRET_KEY: &str = "test-secret";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) store: Arc<InMemoryLedgerStore>,
    pub(crate) vcs: Arc<ScriptedVcs>,
    pub(crate) inference: Arc<ScriptedInference>,
    pub(crate) audit: Arc<RecordingAuditSink>,
    pub(crate) notifications: Arc<RecordingNotificationSink>,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> tokio::sync::OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<tokio::sync::Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(tokio::sync::Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("AULA_ENV", "test");
    std::env::set_var("AULA_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("BACKEND_CORS_ORIGINS");
    std::env::remove_var("DATABASE_URL");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("PROJECT_NAME");
}

impl TestContext {
    pub(crate) async fn new() -> Self {
        Self::with_env(&[]).await
    }

    pub(crate) async fn with_env(overrides: &[(&str, &str)]) -> Self {
        let guard = env_lock().await;
        set_test_env();
        for (key, value) in overrides {
            std::env::set_var(key, value);
        }

        let settings = Settings::load().expect("settings");
        let store = Arc::new(InMemoryLedgerStore::new());
        let vcs = Arc::new(ScriptedVcs::new());
        let inference = Arc::new(ScriptedInference::new());
        let audit = Arc::new(RecordingAuditSink::default());
        let notifications = Arc::new(RecordingNotificationSink::default());

        let state = AppState::new(
            settings,
            store.clone(),
            vcs.clone(),
            inference.clone(),
            audit.clone(),
            notifications.clone(),
        );
        let app = api::router::router(state.clone());

        TestContext { state, app, store, vcs, inference, audit, notifications, _guard: guard }
    }

    pub(crate) async fn insert_student(&self, id: &str, full_name: &str) -> User {
        self.insert_user(id, full_name, UserRole::Student).await
    }

    pub(crate) async fn insert_teacher(&self, id: &str, full_name: &str) -> User {
        self.insert_user(id, full_name, UserRole::Teacher).await
    }

    pub(crate) async fn insert_user(&self, id: &str, full_name: &str, role: UserRole) -> User {
        self.store
            .insert_user(NewUser {
                id: id.to_string(),
                email: format!("{id}@aula.test"),
                full_name: full_name.to_string(),
                role,
                is_active: true,
                now: primitive_now_utc(),
            })
            .await
            .expect("insert user")
    }

    pub(crate) async fn insert_activity(&self, seed: NewActivity) -> Activity {
        self.store.insert_activity(seed).await.expect("insert activity")
    }
}

/// Repository activity seed with a one-week window. Tests mutate the fields
/// they care about before inserting.
pub(crate) fn github_activity(id: &str, file_paths: &[&str]) -> NewActivity {
    let now = primitive_now_utc();
    NewActivity {
        id: id.to_string(),
        course_id: "course-1".to_string(),
        title: format!("Activity {id}"),
        description: "Implementar un parser".to_string(),
        activity_type: ActivityType::Github,
        file_paths: file_paths.iter().map(|path| path.to_string()).collect(),
        max_attempts: 3,
        weight: 1.0,
        open_date: None,
        deadline: now + Duration::days(7),
        allow_link_submission: false,
        created_by: "teacher-1".to_string(),
        now,
    }
}

pub(crate) fn manual_activity(id: &str, allow_link: bool) -> NewActivity {
    let mut seed = github_activity(id, &[]);
    seed.activity_type = ActivityType::Manual;
    seed.allow_link_submission = allow_link;
    seed
}

#[derive(Default)]
pub(crate) struct ScriptedVcs {
    files: Mutex<HashMap<(String, String), String>>,
    failing: Mutex<HashSet<String>>,
}

impl ScriptedVcs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file(self, repo: &str, path: &str, content: &str) -> Self {
        self.script_file(repo, path, content);
        self
    }

    pub(crate) fn with_failing_path(self, path: &str) -> Self {
        self.failing.lock().unwrap().insert(path.to_string());
        self
    }

    pub(crate) fn script_file(&self, repo: &str, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert((repo.to_string(), path.to_string()), content.to_string());
    }
}

#[async_trait]
impl VcsContentService for ScriptedVcs {
    async fn list_tree(&self, repo: &RepoIdentity) -> anyhow::Result<Vec<String>> {
        let full_name = repo.full_name();
        let mut paths: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|(scripted_repo, _)| *scripted_repo == full_name)
            .map(|(_, path)| path.clone())
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn fetch_file(&self, repo: &RepoIdentity, path: &str) -> anyhow::Result<Option<String>> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(anyhow!("scripted fetch failure for {path}"));
        }
        Ok(self.files.lock().unwrap().get(&(repo.full_name(), path.to_string())).cloned())
    }
}

enum FileScript {
    Score(f64),
    Fail(String),
}

#[derive(Default)]
pub(crate) struct ScriptedInference {
    file_scripts: Mutex<HashMap<String, FileScript>>,
    freeform_script: Mutex<Option<Result<(f64, String), String>>>,
    analysis_calls: Mutex<Vec<FileAnalysisRequest>>,
    freeform_calls: Mutex<Vec<FreeformGradeRequest>>,
}

impl ScriptedInference {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file_score(self, path: &str, score: f64) -> Self {
        self.script_file_score(path, score);
        self
    }

    pub(crate) fn with_failing_file(self, path: &str, reason: &str) -> Self {
        self.file_scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), FileScript::Fail(reason.to_string()));
        self
    }

    pub(crate) fn with_freeform(self, grade: f64, feedback: &str) -> Self {
        self.script_freeform(grade, feedback);
        self
    }

    pub(crate) fn with_freeform_failure(self, reason: &str) -> Self {
        self.script_freeform_failure(reason);
        self
    }

    pub(crate) fn script_file_score(&self, path: &str, score: f64) {
        self.file_scripts.lock().unwrap().insert(path.to_string(), FileScript::Score(score));
    }

    pub(crate) fn script_freeform(&self, grade: f64, feedback: &str) {
        *self.freeform_script.lock().unwrap() = Some(Ok((grade, feedback.to_string())));
    }

    pub(crate) fn script_freeform_failure(&self, reason: &str) {
        *self.freeform_script.lock().unwrap() = Some(Err(reason.to_string()));
    }

    pub(crate) fn analysis_calls(&self) -> Vec<FileAnalysisRequest> {
        self.analysis_calls.lock().unwrap().clone()
    }

    pub(crate) fn freeform_calls(&self) -> Vec<FreeformGradeRequest> {
        self.freeform_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceService for ScriptedInference {
    async fn analyze_file(
        &self,
        request: FileAnalysisRequest,
    ) -> anyhow::Result<FileAnalysisResult> {
        let path = request.path.clone();
        let repo_url = request.repo_url.clone();
        self.analysis_calls.lock().unwrap().push(request);

        match self.file_scripts.lock().unwrap().get(&path) {
            Some(FileScript::Score(score)) => Ok(FileAnalysisResult {
                filename: path.clone(),
                repo_url,
                summary: format!("Resumen de {path}"),
                strengths: vec!["Código claro".to_string()],
                weaknesses: Vec::new(),
                errors: Vec::new(),
                score_contribution: *score,
                degraded: false,
            }),
            Some(FileScript::Fail(reason)) => Err(anyhow!("{reason}")),
            None => Err(anyhow!("no scripted analysis for {path}")),
        }
    }

    async fn grade_freeform(
        &self,
        request: FreeformGradeRequest,
    ) -> anyhow::Result<FreeformAssessment> {
        self.freeform_calls.lock().unwrap().push(request);

        match self.freeform_script.lock().unwrap().as_ref() {
            Some(Ok((grade, feedback))) => {
                Ok(FreeformAssessment { grade: *grade, feedback: feedback.clone() })
            }
            Some(Err(reason)) => Err(anyhow!("{reason}")),
            None => Err(anyhow!("no scripted freeform assessment")),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub(crate) fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotificationSink {
    notifications: Mutex<Vec<GradeNotification>>,
}

impl RecordingNotificationSink {
    pub(crate) fn notifications(&self) -> Vec<GradeNotification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn grade_published(&self, notification: GradeNotification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

pub(crate) fn bearer_token(user_id: &str, settings: &Settings) -> String {
    security::create_access_token(user_id, settings, None).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

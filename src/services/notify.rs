use async_trait::async_trait;

#[derive(Debug, Clone)]
pub(crate) struct GradeNotification {
    pub(crate) user_id: String,
    pub(crate) activity_id: String,
    pub(crate) activity_title: String,
    pub(crate) grade: f64,
    /// True when a teacher entered the grade by hand.
    pub(crate) manual: bool,
}

#[async_trait]
pub(crate) trait NotificationSink: Send + Sync {
    async fn grade_published(&self, notification: GradeNotification);
}

pub(crate) struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn grade_published(&self, notification: GradeNotification) {
        tracing::info!(
            target: "aula::notify",
            user_id = %notification.user_id,
            activity_id = %notification.activity_id,
            activity_title = %notification.activity_title,
            grade = notification.grade,
            manual = notification.manual,
            "Grade published"
        );
    }
}

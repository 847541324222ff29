use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub(crate) struct AuditEvent {
    pub(crate) action: &'static str,
    pub(crate) actor_id: String,
    pub(crate) activity_id: String,
    pub(crate) detail: Value,
}

/// Injected capability for the audit trail. Recording must never fail the
/// pipeline; implementations deal with their own delivery problems.
#[async_trait]
pub(crate) trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

pub(crate) struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "aula::audit",
            action = event.action,
            actor_id = %event.actor_id,
            activity_id = %event.activity_id,
            detail = %event.detail,
            "Audit event"
        );
    }
}

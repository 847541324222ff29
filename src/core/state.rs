use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::audit::AuditSink;
use crate::services::inference::InferenceService;
use crate::services::notify::NotificationSink;
use crate::services::vcs::VcsContentService;
use crate::storage::LedgerStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn LedgerStore>,
    vcs: Arc<dyn VcsContentService>,
    inference: Arc<dyn InferenceService>,
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn NotificationSink>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn LedgerStore>,
        vcs: Arc<dyn VcsContentService>,
        inference: Arc<dyn InferenceService>,
        audit: Arc<dyn AuditSink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(InnerState { settings, store, vcs, inference, audit, notifications }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn LedgerStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn vcs(&self) -> &dyn VcsContentService {
        self.inner.vcs.as_ref()
    }

    pub(crate) fn inference(&self) -> &dyn InferenceService {
        self.inner.inference.as_ref()
    }

    pub(crate) fn audit(&self) -> &dyn AuditSink {
        self.inner.audit.as_ref()
    }

    pub(crate) fn notifications(&self) -> &dyn NotificationSink {
        self.inner.notifications.as_ref()
    }
}

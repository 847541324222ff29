pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod storage;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::audit::TracingAuditSink;
use crate::services::inference::OpenAiInferenceService;
use crate::services::notify::TracingNotificationSink;
use crate::services::vcs::GithubContentService;
use crate::storage::postgres::PgLedgerStore;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    if let Err(err) = core::bootstrap::ensure_admin(&db_pool, &settings).await {
        tracing::error!(error = %err, "Failed to ensure default admin");
    }

    let store = Arc::new(PgLedgerStore::new(db_pool));
    let vcs = Arc::new(GithubContentService::from_settings(&settings)?);
    let inference = Arc::new(OpenAiInferenceService::from_settings(&settings)?);

    let state = AppState::new(
        settings,
        store,
        vcs,
        inference,
        Arc::new(TracingAuditSink),
        Arc::new(TracingNotificationSink),
    );

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Aula API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(core::shutdown::shutdown_signal())
        .await?;

    Ok(())
}

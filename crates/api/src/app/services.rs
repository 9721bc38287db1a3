//! Service wiring: job store, orchestrator, lifecycle and processor.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use docportal_infra::jobs::{InMemoryJobStore, JobLifecycle, JobProcessor, JobStore, PostgresJobStore};
use docportal_infra::{ExtractionOrchestrator, HttpExtractionOrchestrator, PortalConfig, ProcessorConfig};

/// Shared application services, handed to handlers through an `Extension`.
#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn JobStore>,
    pub lifecycle: JobLifecycle,
    pub processor: Arc<JobProcessor>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn JobStore>,
        orchestrator: Arc<dyn ExtractionOrchestrator>,
        processor_config: ProcessorConfig,
    ) -> Self {
        Self {
            lifecycle: JobLifecycle::new(store.clone(), orchestrator),
            processor: Arc::new(JobProcessor::new(store.clone(), processor_config)),
            store,
        }
    }
}

/// Build services from configuration.
///
/// Without `DATABASE_URL` jobs live in memory and are lost on restart.
pub async fn build_services(config: &PortalConfig) -> Result<AppServices, sqlx::Error> {
    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            tracing::info!("using Postgres job store");
            Arc::new(PostgresJobStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory job store");
            Arc::new(InMemoryJobStore::new())
        }
    };

    let orchestrator = Arc::new(HttpExtractionOrchestrator::new(
        config.orchestrator_url.clone(),
        config.processor.service_key(),
    ));
    tracing::info!(url = %orchestrator.url(), "extraction orchestrator configured");

    Ok(AppServices::new(store, orchestrator, config.processor.clone()))
}

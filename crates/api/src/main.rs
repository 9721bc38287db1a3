use std::sync::Arc;

use anyhow::Context;

use docportal_api::app;
use docportal_infra::jobs::{PollerConfig, ProcessorPoller};
use docportal_infra::PortalConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docportal_observability::init();

    let config = PortalConfig::from_env().context("invalid configuration")?;
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set; admin routes are unauthenticated");
    }

    let services = Arc::new(
        app::build_services(&config)
            .await
            .context("failed to connect to the job store")?,
    );

    let poller = config.poll_interval.map(|interval| {
        ProcessorPoller::spawn(services.processor.clone(), PollerConfig::new(interval))
    });

    let router = app::build_app(services, config.admin_token.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(poller) = poller {
        poller.shutdown().await;
    }
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

mod api;
mod bootstrap;
mod health;
mod notifier;

use std::time::Duration;

use anyhow::Result;
use procura_core::config::{AppConfig, LoadOptions};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use procura_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes up before bootstrap so its events are captured.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let mut app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let router = api::router(app.api_state())
        .merge(health::router(app.db_pool.clone(), app.notifications.clone()));
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "procura-server listening"
    );
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "procura-server stopping"
    );

    // Dropping the services closes the notification queue; the worker then drains and exits.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let worker = app.dispatch_worker.take();
    let db_pool = app.db_pool.clone();
    drop(app);

    if let Some(worker) = worker {
        if tokio::time::timeout(grace, worker.join()).await.is_err() {
            warn!(
                event_name = "system.server.notifications_abandoned",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "notification queue did not drain before shutdown deadline"
            );
        }
    }
    db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}

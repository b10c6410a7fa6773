mod bootstrap;
mod health;
mod routes;
mod worker;

use std::time::Duration;

use anyhow::Result;
use fred_core::config::{AppConfig, LoadOptions};
use tokio_util::sync::CancellationToken;

use crate::routes::ChatState;
use crate::worker::ChatWorker;

fn init_logging(config: &AppConfig) {
    use fred_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let worker = ChatWorker::new(app.orchestrator.clone(), app.sender.clone());

    let state = ChatState {
        webhook_token: app.config.zulip.webhook_token.clone(),
        acknowledgement: app.config.orchestrator.acknowledgement.clone(),
        worker: worker.clone(),
    };
    let router = routes::router(state).merge(health::router(app.history_pool.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "fred-server listening"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(error) = wait_for_shutdown().await {
            tracing::error!(event_name = "system.server.signal_error", error = %error, "signal handler failed");
        }
        signal.cancel();
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        in_flight = worker.in_flight(),
        "fred-server stopping"
    );
    worker.shutdown(Duration::from_secs(app.config.server.graceful_shutdown_secs)).await;
    app.history_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

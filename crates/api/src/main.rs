use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use quote_desk_api::app::{build_state, create_app, Backends};
use quote_desk_api::config::Config;
use quote_desk_api::jobs::{AuditRetentionJob, JobScheduler, LockSweepJob, RuntimeGaugesJob};
use quote_desk_api::middleware::{init_metrics, logging::init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config.logging);
    init_metrics().context("Failed to install metrics recorder")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Quote Desk");

    let db_config = persistence::db::DatabaseConfig::from(&config.database);
    let pool = persistence::db::create_pool(&db_config)
        .await
        .context("Failed to connect to the database")?;

    info!("Running database migrations");
    persistence::db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let addr = config.socket_addr();
    let state = build_state(config, Some(pool.clone()), Backends::postgres(&pool))?;

    let mut scheduler = JobScheduler::new();
    scheduler.register(RuntimeGaugesJob::new(&state));
    scheduler.register(LockSweepJob::new(
        state.coordinator.locks().clone(),
        state.rate_limiter.clone(),
        state.dispatcher.clone(),
    ));
    scheduler.register(AuditRetentionJob::new(state.audit.clone()));
    scheduler.start();

    let app = create_app(state);

    info!(%addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;
    info!("Quote Desk stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

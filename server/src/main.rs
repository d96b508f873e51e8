//! Animal control HTTP server.
//!
//! Serves the disposition and claim API over a `PostgreSQL` entity store.

mod config;
mod telemetry;

use animal_control_core::environment::SystemClock;
use animal_control_postgres::PostgresEntityStore;
use animal_control_web::{AppState, router};
use anyhow::Context;
use config::{Config, PostgresConfig};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    info!("Starting animal control server");

    let config = Config::from_env();
    info!(
        http = %config.http_addr(),
        metrics = %config.metrics_addr(),
        max_connections = config.postgres.max_connections,
        "Configuration loaded"
    );

    telemetry::install_metrics(&config.metrics_addr())?;

    info!("Connecting to database...");
    let pool = connect(&config.postgres).await?;
    let store = PostgresEntityStore::from_pool(pool);
    store.migrate().await.context("failed to run migrations")?;
    info!("Database ready");

    let state = AppState::new(Arc::new(store), Arc::new(SystemClock));
    let app = router(state);

    let addr = config.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => {
            joined??;
            info!("Server stopped");
            return Ok(());
        }
        () = shutdown_signal() => {}
    }

    let _ = stop_tx.send(true);
    let grace = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => joined??,
        Err(_) => {
            warn!(timeout_secs = grace.as_secs(), "Shutdown timeout elapsed, closing open connections");
            server.abort();
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn connect(config: &PostgresConfig) -> anyhow::Result<PgPool> {
    let mut options = PgConnectOptions::from_str(&config.url).context("invalid DATABASE_URL")?;
    if config.statement_timeout > 0 {
        options = options.options([(
            "statement_timeout",
            format!("{}s", config.statement_timeout),
        )]);
    }

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .idle_timeout(Duration::from_secs(config.idle_timeout))
        .connect_with(options)
        .await
        .context("failed to connect to PostgreSQL")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

//! Queue Worker Service
//!
//! A background worker that claims records from `processing_queue`,
//! processes them, and finalizes the result, with periodic orphan/failed
//! recovery sweeps.
//!
//! ## Architecture
//!
//! ```text
//! processing_queue (Postgres)
//!   ↓ (claim, FOR UPDATE SKIP LOCKED)
//! Worker<FLOW_NAME>
//!   ↓ (executes the task fn)
//! Finalizer (complete | fail)
//! ```
//!
//! ## Features
//!
//! - Exactly-once-per-record processing across concurrent instances
//! - Automatic retry with exponential backoff on transient store errors
//! - Orphan reclaim and failed-record reset on a timer
//! - Graceful shutdown handling
//! - Health check endpoint for Kubernetes probes

use axum::Router;
use core_config::{Environment, FromEnv};
use database::postgres::{connect_from_config_with_retry, PostgresConfig};
use eyre::{Result, WrapErr};
use queue_engine::{health_router, HealthState, TaskOutcome, Worker, WorkerSettings};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Start the health HTTP server.
///
/// Provides `/health`, `/health/ready`, `/health/live`, `/health/detailed`,
/// and `/metrics`.
async fn start_health_server(health_state: HealthState, port: u16) -> Result<()> {
    let app: Router = health_router(health_state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health server listening");

    axum::serve(listener, app).await.wrap_err("Health server failed")?;

    Ok(())
}

/// Run the queue worker for `flow_name`.
///
/// This is the main entry point. It:
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Connects to PostgreSQL with retry logic
/// 3. Starts the worker loop with graceful shutdown handling
/// 4. Serves the health/metrics HTTP surface alongside it
///
/// # Errors
///
/// Returns an error if PostgreSQL configuration is invalid, the
/// connection fails, or the health server fails to bind.
pub async fn run(flow_name: &str) -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);
    queue_engine::metrics::init_metrics();

    info!(name = APP_NAME, version = APP_VERSION, "Starting queue worker service");
    info!("Environment: {:?}", environment);

    let health_port: u16 = std::env::var("QUEUE_WORKER_HEALTH_PORT")
        .or_else(|_| std::env::var("HEALTH_PORT"))
        .unwrap_or_else(|_| "8082".to_string())
        .parse()
        .unwrap_or(8082);

    let pg_config = PostgresConfig::from_env().wrap_err("Failed to load PostgreSQL configuration")?;

    info!("Connecting to PostgreSQL...");
    let db = connect_from_config_with_retry(pg_config, None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL successfully");

    let settings = WorkerSettings::from_env().wrap_err("Failed to load worker settings")?;
    let worker = Worker::new(flow_name, settings);
    info!(
        instance_id = %worker.instance_id,
        flow_name = %worker.flow_name,
        batch_size = worker.settings.batch_size,
        max_retries = worker.settings.max_retries,
        "Worker configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(db.clone(), APP_NAME, APP_VERSION);
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    info!("Starting worker loop...");
    worker
        .run(
            &db,
            |record| async move {
                match run_task(&record) {
                    Ok(result) => TaskOutcome::Completed(result),
                    Err(message) => TaskOutcome::Failed(message),
                }
            },
            Duration::from_secs(1),
            Duration::from_secs(60),
            shutdown_rx,
        )
        .await;

    info!("Queue worker service stopped");
    Ok(())
}

/// Placeholder task function: real deployments replace this with a
/// caller-supplied closure when embedding `queue-engine` directly. This
/// binary exists to demonstrate the wiring, not to implement any
/// particular flow's business logic.
fn run_task(_record: &queue_engine::ClaimedRecord) -> std::result::Result<serde_json::Value, String> {
    Ok(serde_json::Value::Null)
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}

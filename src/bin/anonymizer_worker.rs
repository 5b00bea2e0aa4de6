//! # Anonymizer Worker
//!
//! Long-running process that consumes the anonymization queue and, when
//! enabled, runs the anonymization sweep on a fixed interval. Shuts down
//! gracefully on Ctrl+C or SIGTERM, finishing the message in hand first.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use epets_core::config::{ConfigManager, EpetsConfig};
use epets_core::error_reporting::{ErrorReporter, FailureTracker, TracingErrorReporter};
use epets_core::jobs::{AnonymizationSweep, AnonymizePetitionJob, JobWorker};
use epets_core::logging::init_structured_logging;
use epets_core::messaging::{JobQueue, PgJobQueue};
use epets_core::repositories::{PgPetitionRepository, PgSignatureRepository};
use epets_core::validation::SignatureValidator;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = manager.config().clone();

    let pool = PgPoolOptions::new()
        .max_connections(config.database.pool)
        .acquire_timeout(config.database.checkout_timeout())
        .connect(&config.database_url())
        .await
        .context("failed to connect to the database")?;

    let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(pool.clone(), config.queue.name.clone()).await?);
    let petitions = Arc::new(PgPetitionRepository::new(pool.clone()));
    let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingErrorReporter);

    let job = AnonymizePetitionJob::new(
        Arc::new(PgSignatureRepository::new(pool.clone())),
        petitions.clone(),
        queue.clone(),
        reporter.clone(),
    )
    .with_validator(SignatureValidator::new(config.anonymization.validation.clone()))
    .with_failure_tracker(Arc::new(FailureTracker::new(
        config.anonymization.failure_alert_threshold,
    )));

    let worker = JobWorker::new(Arc::new(job), queue.clone(), reporter, config.queue.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweep_handle = config.sweep.enabled.then(|| {
        let sweep = AnonymizationSweep::new(petitions, queue, &config.anonymization);
        tokio::spawn(run_sweep(sweep, config.clone(), shutdown_rx.clone()))
    });
    let worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    info!(
        environment = %manager.environment(),
        queue = %config.queue.name,
        sweep_enabled = config.sweep.enabled,
        "Anonymizer worker running... Press Ctrl+C to shutdown gracefully"
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        result = wait_for_sigterm() => {
            match result {
                Ok(()) => info!("Received SIGTERM, initiating graceful shutdown..."),
                Err(e) => warn!("Error setting up SIGTERM handler: {}", e),
            }
        }
    }

    shutdown_tx.send(true).ok();
    worker_handle.await.context("worker task panicked")?;
    if let Some(handle) = sweep_handle {
        handle.await.context("sweep task panicked")?;
    }

    pool.close().await;
    info!("Anonymizer worker shutdown complete");

    Ok(())
}

async fn run_sweep(sweep: AnonymizationSweep, config: EpetsConfig, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(config.sweep.interval());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match sweep.run(Utc::now()).await {
                    Ok(report) => info!(
                        enqueued = report.enqueued.len(),
                        skipped = report.skipped.len(),
                        "Anonymization sweep finished"
                    ),
                    Err(e) => error!(error = %e, "Anonymization sweep failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Wait for SIGTERM signal (for container deployments)
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

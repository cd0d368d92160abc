//! Worker Instance (C9).
//!
//! Owns a process-lifetime `instance_id` (`{hostname}-{8 hex digits}`, the
//! same shape `stream_worker::config::WorkerConfig` builds its
//! `consumer_id` with) and drives the claim -> task fn -> finalize loop
//! for one flow, plus the periodic recovery sweeps.

use crate::claim::ClaimEngine;
use crate::config::WorkerSettings;
use crate::error::QueueError;
use crate::finalize::Finalizer;
use crate::model::ClaimedRecord;
use crate::recovery::RecoveryEngine;
use rand::Rng;
use sea_orm::DatabaseConnection;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Builds the `{hostname}-{8 hex digits}` instance id. Computed once per
/// process; never changes for the lifetime of the worker.
pub fn new_instance_id() -> String {
    let hostname = hostname_or_fallback();
    let suffix: u32 = rand::rng().random();
    format!("{hostname}-{suffix:08x}")
}

fn hostname_or_fallback() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "worker".to_string())
}

/// Outcome of processing a single claimed record, returned by the
/// caller-supplied task function.
pub enum TaskOutcome {
    /// The task succeeded; its result replaces the record's `payload`.
    Completed(serde_json::Value),
    Failed(String),
}

pub struct Worker {
    pub instance_id: String,
    pub flow_name: String,
    pub settings: WorkerSettings,
}

impl Worker {
    pub fn new(flow_name: impl Into<String>, settings: WorkerSettings) -> Self {
        Self { instance_id: new_instance_id(), flow_name: flow_name.into(), settings }
    }

    /// Claim one batch and run `task` against each claimed record,
    /// finalizing every record via [`Finalizer`] according to the
    /// outcome `task` returns. Returns the number of records processed.
    #[instrument(skip(self, db, task), fields(instance_id = %self.instance_id, flow_name = %self.flow_name))]
    pub async fn process_batch<F, Fut>(&self, db: &DatabaseConnection, task: F) -> Result<usize, QueueError>
    where
        F: Fn(ClaimedRecord) -> Fut,
        Fut: Future<Output = TaskOutcome>,
    {
        if !self.settings.enabled {
            return Ok(0);
        }

        let claimed = ClaimEngine::claim(db, &self.flow_name, self.settings.batch_size, &self.instance_id).await?;
        let count = claimed.len();
        crate::metrics::set_queue_records(&self.flow_name, "processing", count as u64);

        for record in claimed {
            let record_id = record.id;
            match task(record).await {
                TaskOutcome::Completed(result) => {
                    if let Err(e) = Finalizer::complete(db, record_id, &self.instance_id, result).await {
                        warn!(record_id, error = %e, "failed to finalize completed record");
                    }
                }
                TaskOutcome::Failed(message) => {
                    if let Err(e) = Finalizer::fail(db, record_id, &self.instance_id, &message).await {
                        warn!(record_id, error = %e, "failed to finalize failed record");
                    }
                }
            }
        }

        Ok(count)
    }

    /// Run both recovery sweeps once.
    #[instrument(skip(self, db), fields(flow_name = %self.flow_name))]
    pub async fn run_recovery_sweep(&self, db: &DatabaseConnection) -> Result<(), QueueError> {
        RecoveryEngine::cleanup_orphaned(db, self.settings.cleanup_timeout_hours).await?;
        RecoveryEngine::reset_failed(db, &self.flow_name, self.settings.max_retries).await?;
        Ok(())
    }

    /// Drive the claim/process/finalize loop until `shutdown` resolves,
    /// sleeping `poll_interval` between empty batches and running a
    /// recovery sweep every `recovery_interval`.
    pub async fn run<F, Fut>(
        &self,
        db: &DatabaseConnection,
        task: F,
        poll_interval: Duration,
        recovery_interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) where
        F: Fn(ClaimedRecord) -> Fut,
        Fut: Future<Output = TaskOutcome>,
    {
        info!(instance_id = %self.instance_id, flow_name = %self.flow_name, "worker loop starting");
        let mut last_recovery = tokio::time::Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_batch(db, &task).await {
                Ok(0) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "batch processing failed");
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }

            if last_recovery.elapsed() >= recovery_interval {
                if let Err(e) = self.run_recovery_sweep(db).await {
                    error!(error = %e, "recovery sweep failed");
                }
                last_recovery = tokio::time::Instant::now();
            }
        }

        info!(instance_id = %self.instance_id, "worker loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_has_expected_shape() {
        let id = new_instance_id();
        let mut parts = id.rsplitn(2, '-');
        let suffix = parts.next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn instance_id_is_stable_per_call_but_unique_across_calls() {
        let a = new_instance_id();
        let b = new_instance_id();
        assert_ne!(a, b);
    }
}

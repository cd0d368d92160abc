//! Recovery Engine (C5).
//!
//! Two idempotent sweeps, grounded in `cleanup_orphaned_records` and
//! `reset_failed_records` (`core/distributed.py`):
//!
//! - [`RecoveryEngine::cleanup_orphaned`] reclaims records stuck in
//!   `processing` past `timeout_hours`, system-wide (no flow filter —
//!   an orphan from a dead worker blocks the whole queue, not just one
//!   flow). `retry_count` is incremented, matching the original's
//!   semantics that a reclaim *is* a retry attempt even though the
//!   record never reached `failed`.
//! - [`RecoveryEngine::reset_failed`] moves `failed` records of a single
//!   flow back to `pending` while `retry_count < max_retries`, clearing
//!   `error_message` but never decrementing `retry_count` — a record
//!   that round-trips failed -> pending -> failed again keeps counting
//!   up toward the limit instead of resetting the clock.

use crate::error::QueueError;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use tracing::instrument;

const CLEANUP_ORPHANED_SQL: &str = r#"
UPDATE processing_queue
SET status = 'pending',
    flow_instance_id = NULL,
    retry_count = retry_count + 1,
    claimed_at = NULL,
    updated_at = now()
WHERE status = 'processing'
  AND claimed_at < now() - ($1 || ' hours')::interval
"#;

const RESET_FAILED_SQL: &str = r#"
UPDATE processing_queue
SET status = 'pending',
    error_message = NULL,
    updated_at = now()
WHERE flow_name = $1
  AND status = 'failed'
  AND retry_count < $2
"#;

pub struct RecoveryEngine;

impl RecoveryEngine {
    /// Reclaim records that have been `processing` longer than
    /// `timeout_hours`. System-wide; returns the number of rows reclaimed.
    #[instrument(skip(db), fields(timeout_hours))]
    pub async fn cleanup_orphaned(db: &DatabaseConnection, timeout_hours: u32) -> Result<u64, QueueError> {
        if timeout_hours == 0 {
            return Err(QueueError::argument("cleanup_orphaned", "timeout_hours must be positive"));
        }

        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            CLEANUP_ORPHANED_SQL,
            [timeout_hours.to_string().into()],
        );
        let result = db
            .execute(stmt)
            .await
            .map_err(|e| QueueError::classify_store_error("cleanup_orphaned", e.into()))?;

        let rows = result.rows_affected();
        crate::metrics::record_orphans_reclaimed(rows);
        if rows > 0 {
            tracing::info!(component = "recovery", sweep = "orphan_reclaim", rows, "reclaimed orphaned records");
        }
        Ok(rows)
    }

    /// Reset `failed` records of `flow_name` back to `pending`, provided
    /// they haven't exceeded `max_retries`. Returns the number of rows reset.
    #[instrument(skip(db), fields(flow_name, max_retries))]
    pub async fn reset_failed(db: &DatabaseConnection, flow_name: &str, max_retries: i32) -> Result<u64, QueueError> {
        if flow_name.trim().is_empty() {
            return Err(QueueError::argument("reset_failed", "flow_name must not be empty"));
        }
        if max_retries <= 0 {
            return Err(QueueError::argument("reset_failed", "max_retries must be positive"));
        }

        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            RESET_FAILED_SQL,
            [flow_name.into(), max_retries.into()],
        );
        let result = db
            .execute(stmt)
            .await
            .map_err(|e| QueueError::classify_store_error("reset_failed", e.into()))?;

        let rows = result.rows_affected();
        if rows > 0 {
            tracing::info!(component = "recovery", sweep = "failed_reset", flow_name, rows, "reset failed records");
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn reset_failed_rejects_non_positive_max_retries() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let zero = RecoveryEngine::reset_failed(&db, "demo", 0).await.unwrap_err();
        assert!(matches!(zero, QueueError::Argument { .. }));

        let negative = RecoveryEngine::reset_failed(&db, "demo", -1).await.unwrap_err();
        assert!(matches!(negative, QueueError::Argument { .. }));
    }

    #[tokio::test]
    async fn cleanup_orphaned_rejects_zero_timeout() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let err = RecoveryEngine::cleanup_orphaned(&db, 0).await.unwrap_err();
        assert!(matches!(err, QueueError::Argument { .. }));
    }
}

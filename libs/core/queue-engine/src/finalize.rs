//! Finalizer (C4).
//!
//! Transitions a claimed record to `completed` or `failed`. Both paths are
//! a single authority-checked `UPDATE ... WHERE id = $1 AND status =
//! 'processing' AND flow_instance_id = $2` — if no row matches, the
//! instance has lost authority over the record (it was reclaimed as an
//! orphan) and the caller gets [`QueueError::StaleClaim`] rather than a
//! silent no-op. `complete` persists the task function's result into
//! `payload`, overwriting the record's original input — the same slot
//! the caller read from when it claimed the record. `fail` increments
//! `retry_count`; this is business retry bookkeeping, independent of the
//! network-retry wrapper in [`crate::retry`].

use crate::error::QueueError;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use tracing::instrument;

const COMPLETE_SQL: &str = r#"
UPDATE processing_queue
SET status = 'completed', payload = $3, completed_at = now(), updated_at = now()
WHERE id = $1 AND status = 'processing' AND flow_instance_id = $2
"#;

const FAIL_SQL: &str = r#"
UPDATE processing_queue
SET status = 'failed',
    retry_count = retry_count + 1,
    error_message = $3,
    updated_at = now()
WHERE id = $1 AND status = 'processing' AND flow_instance_id = $2
"#;

pub struct Finalizer;

impl Finalizer {
    #[instrument(skip(db, result), fields(record_id, instance_id))]
    pub async fn complete(
        db: &DatabaseConnection,
        record_id: i64,
        instance_id: &str,
        result: serde_json::Value,
    ) -> Result<(), QueueError> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            COMPLETE_SQL,
            [record_id.into(), instance_id.into(), result.into()],
        );
        let exec_result = db
            .execute(stmt)
            .await
            .map_err(|e| QueueError::classify_store_error("complete", e.into()))?;

        if exec_result.rows_affected() == 0 {
            return Err(QueueError::StaleClaim { operation: "complete", record_id, instance_id: instance_id.to_string() });
        }
        crate::metrics::record_completed();
        Ok(())
    }

    #[instrument(skip(db, error_message), fields(record_id, instance_id))]
    pub async fn fail(
        db: &DatabaseConnection,
        record_id: i64,
        instance_id: &str,
        error_message: &str,
    ) -> Result<(), QueueError> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            FAIL_SQL,
            [record_id.into(), instance_id.into(), error_message.into()],
        );
        let result = db
            .execute(stmt)
            .await
            .map_err(|e| QueueError::classify_store_error("fail", e.into()))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::StaleClaim { operation: "fail", record_id, instance_id: instance_id.to_string() });
        }
        crate::metrics::record_failed();
        Ok(())
    }
}

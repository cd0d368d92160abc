//! Claim Engine (C3).
//!
//! Atomically hands a batch of `pending` records for one flow to the
//! calling worker instance, using the `UPDATE ... WHERE id IN (SELECT ...
//! FOR UPDATE SKIP LOCKED)` pattern so that concurrent claimers never
//! receive overlapping rows (property P1). Grounded directly in
//! `claim_records_batch` (`core/distributed.py`) and the equivalent
//! `claim_ready` query in the seesaw job-queue crate.

use crate::error::QueueError;
use crate::model::ClaimedRecord;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, FromQueryResult, Statement};
use tracing::{debug, instrument};

const CLAIM_SQL: &str = r#"
WITH claimable AS (
    SELECT id FROM processing_queue
    WHERE flow_name = $1 AND status = 'pending'
    ORDER BY created_at ASC, id ASC
    LIMIT $2
    FOR UPDATE SKIP LOCKED
)
UPDATE processing_queue
SET status = 'processing',
    flow_instance_id = $3,
    claimed_at = now(),
    updated_at = now()
WHERE id IN (SELECT id FROM claimable)
RETURNING id, payload, retry_count, created_at
"#;

#[derive(Debug, FromQueryResult)]
struct ClaimRow {
    id: i64,
    payload: serde_json::Value,
    retry_count: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ClaimRow> for ClaimedRecord {
    fn from(row: ClaimRow) -> Self {
        ClaimedRecord { id: row.id, payload: row.payload, retry_count: row.retry_count, created_at: row.created_at }
    }
}

pub struct ClaimEngine;

impl ClaimEngine {
    /// Claim up to `batch_size` pending records of `flow_name` on behalf
    /// of `instance_id`. Returns an empty vec, never an error, when there
    /// is nothing to claim.
    #[instrument(skip(db), fields(flow_name, batch_size, instance_id))]
    pub async fn claim(
        db: &DatabaseConnection,
        flow_name: &str,
        batch_size: i64,
        instance_id: &str,
    ) -> Result<Vec<ClaimedRecord>, QueueError> {
        if flow_name.trim().is_empty() {
            return Err(QueueError::argument("claim", "flow_name must not be empty"));
        }
        if batch_size <= 0 {
            return Err(QueueError::argument("claim", "batch_size must be positive"));
        }

        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            CLAIM_SQL,
            [flow_name.into(), batch_size.into(), instance_id.into()],
        );

        let rows = ClaimRow::find_by_statement(stmt)
            .all(db)
            .await
            .map_err(|e| QueueError::classify_store_error("claim", e.into()))?;

        if rows.is_empty() {
            debug!(flow_name, "no pending records to claim");
        }

        Ok(rows.into_iter().map(ClaimedRecord::from).collect())
    }

    /// Fallback claim path for stores that cannot express `SKIP LOCKED`:
    /// a compare-and-swap loop over individually fetched candidate ids.
    /// Exercised against a `sea_orm::MockDatabase` in this module's tests;
    /// the Postgres path above is what production traffic takes.
    #[instrument(skip(db, candidate_ids), fields(flow_name, instance_id))]
    pub async fn claim_cas_fallback(
        db: &DatabaseConnection,
        flow_name: &str,
        candidate_ids: &[i64],
        instance_id: &str,
    ) -> Result<Vec<i64>, QueueError> {
        if flow_name.trim().is_empty() {
            return Err(QueueError::argument("claim_cas_fallback", "flow_name must not be empty"));
        }

        let mut claimed = Vec::new();
        for &id in candidate_ids {
            let stmt = Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                r#"UPDATE processing_queue
                   SET status = 'processing', flow_instance_id = $1, claimed_at = now(), updated_at = now()
                   WHERE id = $2 AND flow_name = $3 AND status = 'pending'"#,
                [instance_id.into(), id.into(), flow_name.into()],
            );
            let result = db
                .execute(stmt)
                .await
                .map_err(|e| QueueError::classify_store_error("claim_cas_fallback", e.into()))?;
            if result.rows_affected() == 1 {
                claimed.push(id);
            }
        }
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{MockDatabase, MockExecResult};

    #[tokio::test]
    async fn claim_cas_fallback_only_claims_rows_the_update_actually_touched() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 0 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
            ])
            .into_connection();

        let claimed = ClaimEngine::claim_cas_fallback(&db, "demo", &[1, 2, 3], "worker-1").await.unwrap();
        assert_eq!(claimed, vec![1, 3]);
    }

    #[tokio::test]
    async fn claim_cas_fallback_rejects_empty_flow_name() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let err = ClaimEngine::claim_cas_fallback(&db, "", &[1], "worker-1").await.unwrap_err();
        assert!(matches!(err, QueueError::Argument { .. }));
    }
}

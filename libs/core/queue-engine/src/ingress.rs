//! Ingress (C6): enqueue new records.

use crate::error::QueueError;
use sea_orm::{DatabaseBackend, DatabaseConnection, FromQueryResult, Statement};
use tracing::instrument;

const ENQUEUE_SQL: &str = r#"
INSERT INTO processing_queue (flow_name, payload, status, retry_count, created_at, updated_at)
VALUES ($1, $2, 'pending', 0, now(), now())
RETURNING id
"#;

#[derive(Debug, FromQueryResult)]
struct InsertedId {
    id: i64,
}

pub struct Ingress;

impl Ingress {
    /// Enqueue a single record for `flow_name`, returning its assigned id.
    #[instrument(skip(db, payload), fields(flow_name))]
    pub async fn enqueue(
        db: &DatabaseConnection,
        flow_name: &str,
        payload: serde_json::Value,
    ) -> Result<i64, QueueError> {
        if flow_name.trim().is_empty() {
            return Err(QueueError::argument("enqueue", "flow_name must not be empty"));
        }

        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            ENQUEUE_SQL,
            [flow_name.into(), payload.into()],
        );

        let row = InsertedId::find_by_statement(stmt)
            .one(db)
            .await
            .map_err(|e| QueueError::classify_store_error("enqueue", e.into()))?
            .ok_or_else(|| QueueError::argument("enqueue", "insert returned no row"))?;

        Ok(row.id)
    }

    /// Enqueue a batch of payloads for `flow_name` as a single multi-values
    /// `INSERT`, returning the assigned ids in the same order as
    /// `payloads`. A single `INSERT` statement is one transaction: either
    /// every row lands or none do, so a constraint violation partway
    /// through never leaves a partial batch committed.
    #[instrument(skip(db, payloads), fields(flow_name, count = payloads.len()))]
    pub async fn enqueue_batch(
        db: &DatabaseConnection,
        flow_name: &str,
        payloads: Vec<serde_json::Value>,
    ) -> Result<Vec<i64>, QueueError> {
        if flow_name.trim().is_empty() {
            return Err(QueueError::argument("enqueue_batch", "flow_name must not be empty"));
        }
        if payloads.is_empty() {
            return Err(QueueError::argument("enqueue_batch", "payloads must not be empty"));
        }

        let mut values: Vec<sea_orm::Value> = Vec::with_capacity(payloads.len() + 1);
        values.push(flow_name.into());
        let rows_sql: Vec<String> = payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                values.push(payload.into());
                format!("($1, ${}, 'pending', 0, now(), now())", i + 2)
            })
            .collect();

        let sql = format!(
            "INSERT INTO processing_queue (flow_name, payload, status, retry_count, created_at, updated_at) VALUES {} RETURNING id",
            rows_sql.join(", ")
        );

        let stmt = Statement::from_sql_and_values(DatabaseBackend::Postgres, &sql, values);

        let rows = InsertedId::find_by_statement(stmt)
            .all(db)
            .await
            .map_err(|e| QueueError::classify_store_error("enqueue_batch", e.into()))?;

        Ok(rows.into_iter().map(|r| r.id).collect())
    }
}

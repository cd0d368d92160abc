//! Status / Diagnostics (C7).
//!
//! Read-only aggregate queries: overall queue status, orphan analysis,
//! performance and error-frequency analysis, and hourly throughput
//! trends. None of these mutate state.

use crate::error::QueueError;
use crate::model::{FlowCounts, QueueSnapshot};
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseBackend, DatabaseConnection, FromQueryResult, Statement};
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, FromQueryResult)]
struct StatusRow {
    flow_name: String,
    status: String,
    count: i64,
}

const STATUS_SQL: &str = r#"
SELECT flow_name, status, COUNT(*) as count
FROM processing_queue
GROUP BY flow_name, status
"#;

const STATUS_SQL_BY_FLOW: &str = r#"
SELECT flow_name, status, COUNT(*) as count
FROM processing_queue
WHERE flow_name = $1
GROUP BY flow_name, status
"#;

#[derive(Debug, Serialize)]
pub struct OrphanAnalysis {
    pub orphan_count: u64,
    pub oldest_claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromQueryResult)]
struct OrphanRow {
    orphan_count: i64,
    oldest_claimed_at: Option<DateTime<Utc>>,
}

const ORPHAN_ANALYSIS_SQL: &str = r#"
SELECT COUNT(*) as orphan_count, MIN(claimed_at) as oldest_claimed_at
FROM processing_queue
WHERE status = 'processing'
  AND claimed_at < now() - ($1 || ' hours')::interval
"#;

#[derive(Debug, Serialize)]
pub struct HourlyTrend {
    pub hour: DateTime<Utc>,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, FromQueryResult)]
struct HourlyTrendRow {
    hour: DateTime<Utc>,
    completed: i64,
    failed: i64,
}

const HOURLY_TREND_SQL: &str = r#"
SELECT
    date_trunc('hour', updated_at) as hour,
    COUNT(*) FILTER (WHERE status = 'completed') as completed,
    COUNT(*) FILTER (WHERE status = 'failed') as failed
FROM processing_queue
WHERE flow_name = $1 AND updated_at > now() - interval '24 hours'
GROUP BY hour
ORDER BY hour ASC
"#;

#[derive(Debug, Serialize)]
pub struct PerformanceAnalysis {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub avg_processing_minutes: Option<f64>,
    pub success_rate: f64,
}

#[derive(Debug, FromQueryResult)]
struct PerformanceRow {
    total: i64,
    completed: i64,
    failed: i64,
    avg_processing_minutes: Option<f64>,
}

const PERFORMANCE_ANALYSIS_SQL: &str = r#"
SELECT
    COUNT(*) as total,
    COUNT(*) FILTER (WHERE status = 'completed') as completed,
    COUNT(*) FILTER (WHERE status = 'failed') as failed,
    AVG(EXTRACT(EPOCH FROM (completed_at - claimed_at)) / 60.0)
        FILTER (WHERE status = 'completed') as avg_processing_minutes
FROM processing_queue
WHERE status IN ('completed', 'failed')
  AND updated_at > now() - ($1 || ' hours')::interval
"#;

const PERFORMANCE_ANALYSIS_SQL_BY_FLOW: &str = r#"
SELECT
    COUNT(*) as total,
    COUNT(*) FILTER (WHERE status = 'completed') as completed,
    COUNT(*) FILTER (WHERE status = 'failed') as failed,
    AVG(EXTRACT(EPOCH FROM (completed_at - claimed_at)) / 60.0)
        FILTER (WHERE status = 'completed') as avg_processing_minutes
FROM processing_queue
WHERE status IN ('completed', 'failed')
  AND updated_at > now() - ($1 || ' hours')::interval
  AND flow_name = $2
"#;

#[derive(Debug, Serialize)]
pub struct ErrorFrequency {
    pub flow_name: String,
    pub error_message: String,
    pub count: u64,
}

#[derive(Debug, FromQueryResult)]
struct ErrorFrequencyRow {
    flow_name: String,
    error_message: String,
    count: i64,
}

pub struct StatusReporter;

impl StatusReporter {
    #[instrument(skip(db))]
    pub async fn status(db: &DatabaseConnection) -> Result<QueueSnapshot, QueueError> {
        let stmt = Statement::from_string(DatabaseBackend::Postgres, STATUS_SQL);
        Self::snapshot_from_rows(db, stmt).await
    }

    #[instrument(skip(db), fields(flow_name))]
    pub async fn status_for_flow(db: &DatabaseConnection, flow_name: &str) -> Result<QueueSnapshot, QueueError> {
        if flow_name.trim().is_empty() {
            return Err(QueueError::argument("status_for_flow", "flow_name must not be empty"));
        }
        let stmt = Statement::from_sql_and_values(DatabaseBackend::Postgres, STATUS_SQL_BY_FLOW, [flow_name.into()]);
        Self::snapshot_from_rows(db, stmt).await
    }

    async fn snapshot_from_rows(db: &DatabaseConnection, stmt: Statement) -> Result<QueueSnapshot, QueueError> {
        let rows = StatusRow::find_by_statement(stmt)
            .all(db)
            .await
            .map_err(|e| QueueError::classify_store_error("status", e.into()))?;

        let mut snapshot = QueueSnapshot::default();
        for row in rows {
            let count = row.count as u64;
            snapshot.total += count;
            crate::metrics::set_queue_records(&row.flow_name, &row.status, count);
            let entry = snapshot.by_flow.entry(row.flow_name).or_insert_with(FlowCounts::default);
            match row.status.as_str() {
                "pending" => {
                    snapshot.pending += count;
                    entry.pending += count;
                }
                "processing" => {
                    snapshot.processing += count;
                    entry.processing += count;
                }
                "completed" => {
                    snapshot.completed += count;
                    entry.completed += count;
                }
                "failed" => {
                    snapshot.failed += count;
                    entry.failed += count;
                }
                _ => {}
            }
        }
        Ok(snapshot)
    }

    #[instrument(skip(db), fields(timeout_hours))]
    pub async fn orphan_analysis(db: &DatabaseConnection, timeout_hours: u32) -> Result<OrphanAnalysis, QueueError> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            ORPHAN_ANALYSIS_SQL,
            [timeout_hours.to_string().into()],
        );
        let row = OrphanRow::find_by_statement(stmt)
            .one(db)
            .await
            .map_err(|e| QueueError::classify_store_error("orphan_analysis", e.into()))?
            .unwrap_or(OrphanRow { orphan_count: 0, oldest_claimed_at: None });

        Ok(OrphanAnalysis { orphan_count: row.orphan_count as u64, oldest_claimed_at: row.oldest_claimed_at })
    }

    #[instrument(skip(db), fields(flow_name))]
    pub async fn hourly_trend(db: &DatabaseConnection, flow_name: &str) -> Result<Vec<HourlyTrend>, QueueError> {
        if flow_name.trim().is_empty() {
            return Err(QueueError::argument("hourly_trend", "flow_name must not be empty"));
        }
        let stmt = Statement::from_sql_and_values(DatabaseBackend::Postgres, HOURLY_TREND_SQL, [flow_name.into()]);
        let rows = HourlyTrendRow::find_by_statement(stmt)
            .all(db)
            .await
            .map_err(|e| QueueError::classify_store_error("hourly_trend", e.into()))?;

        Ok(rows
            .into_iter()
            .map(|r| HourlyTrend { hour: r.hour, completed: r.completed as u64, failed: r.failed as u64 })
            .collect())
    }

    /// Aggregate throughput over the trailing `window_hours`, grounded in
    /// `_analyze_processing_performance`/`_calculate_performance_metrics`:
    /// completed/failed counts and mean `completed_at - claimed_at` for
    /// completed records, plus the derived success rate.
    #[instrument(skip(db), fields(flow_name, window_hours))]
    pub async fn performance_analysis(
        db: &DatabaseConnection,
        flow_name: Option<&str>,
        window_hours: u32,
    ) -> Result<PerformanceAnalysis, QueueError> {
        if window_hours == 0 {
            return Err(QueueError::argument("performance_analysis", "window_hours must be positive"));
        }

        let stmt = match flow_name {
            None => Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                PERFORMANCE_ANALYSIS_SQL,
                [window_hours.to_string().into()],
            ),
            Some(flow) if !flow.trim().is_empty() => Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                PERFORMANCE_ANALYSIS_SQL_BY_FLOW,
                [window_hours.to_string().into(), flow.into()],
            ),
            Some(_) => return Err(QueueError::argument("performance_analysis", "flow_name must not be empty")),
        };

        let row = PerformanceRow::find_by_statement(stmt)
            .one(db)
            .await
            .map_err(|e| QueueError::classify_store_error("performance_analysis", e.into()))?
            .unwrap_or(PerformanceRow { total: 0, completed: 0, failed: 0, avg_processing_minutes: None });

        let total = row.total as u64;
        let completed = row.completed as u64;
        let success_rate = if total > 0 { completed as f64 / total as f64 } else { 0.0 };

        Ok(PerformanceAnalysis {
            total,
            completed,
            failed: row.failed as u64,
            avg_processing_minutes: row.avg_processing_minutes,
            success_rate,
        })
    }

    /// Top-`top_k` error-message frequencies per flow over the trailing
    /// `window_hours`, grounded in `_analyze_processing_errors`. `flows`
    /// must not be empty; ranking is computed in Rust after one grouped
    /// query rather than a per-flow window function, to stay portable
    /// SQL text like the rest of this module.
    #[instrument(skip(db, flows), fields(window_hours, top_k))]
    pub async fn error_analysis(
        db: &DatabaseConnection,
        flows: &[String],
        window_hours: u32,
        top_k: usize,
    ) -> Result<Vec<ErrorFrequency>, QueueError> {
        if flows.is_empty() {
            return Err(QueueError::argument("error_analysis", "flows must not be empty"));
        }
        if window_hours == 0 {
            return Err(QueueError::argument("error_analysis", "window_hours must be positive"));
        }

        let mut values: Vec<sea_orm::Value> = Vec::with_capacity(flows.len() + 1);
        let placeholders: Vec<String> = flows
            .iter()
            .enumerate()
            .map(|(i, flow)| {
                values.push(flow.clone().into());
                format!("${}", i + 1)
            })
            .collect();
        let window_param = flows.len() + 1;
        values.push(window_hours.to_string().into());

        let sql = format!(
            r#"
            SELECT flow_name, error_message, COUNT(*) as count
            FROM processing_queue
            WHERE status = 'failed'
              AND error_message IS NOT NULL
              AND flow_name IN ({})
              AND updated_at > now() - (${} || ' hours')::interval
            GROUP BY flow_name, error_message
            ORDER BY flow_name, count DESC
            "#,
            placeholders.join(", "),
            window_param
        );

        let stmt = Statement::from_sql_and_values(DatabaseBackend::Postgres, &sql, values);
        let rows = ErrorFrequencyRow::find_by_statement(stmt)
            .all(db)
            .await
            .map_err(|e| QueueError::classify_store_error("error_analysis", e.into()))?;

        let mut result = Vec::new();
        let mut current_flow: Option<String> = None;
        let mut seen_for_flow = 0usize;
        for row in rows {
            if current_flow.as_deref() != Some(row.flow_name.as_str()) {
                current_flow = Some(row.flow_name.clone());
                seen_for_flow = 0;
            }
            if seen_for_flow >= top_k {
                continue;
            }
            seen_for_flow += 1;
            result.push(ErrorFrequency { flow_name: row.flow_name, error_message: row.error_message, count: row.count as u64 });
        }
        Ok(result)
    }
}

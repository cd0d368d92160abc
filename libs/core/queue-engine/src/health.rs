//! Health Monitor (C8).
//!
//! Composite severity aggregation over the store probe (and, optionally, a
//! secondary store) plus an axum router exposing the four-endpoint HTTP
//! surface. Router shape is grounded in `stream_worker::health`'s
//! `health_router`/`full_admin_router` (originally built around a Redis
//! probe); generalized here to a Postgres [`database::postgres::health`]
//! probe and the metrics this crate actually emits.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use database::postgres::{check_health_detailed, check_health_with_query};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

/// A distinct probe from the generic connection ping: confirms the
/// `processing_queue` table itself is reachable, not just that Postgres
/// answers a `SELECT 1`.
const QUEUE_REACHABLE_QUERY: &str = "SELECT 1 FROM processing_queue LIMIT 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Severity {
    fn worst(self, other: Severity) -> Severity {
        use Severity::*;
        match (self, other) {
            (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
            (Degraded, _) | (_, Degraded) => Degraded,
            _ => Healthy,
        }
    }

    fn http_status(self) -> StatusCode {
        match self {
            Severity::Healthy | Severity::Degraded => StatusCode::OK,
            Severity::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

fn severity_for_response_time(healthy: bool, response_time_ms: u64) -> Severity {
    if !healthy {
        return Severity::Unhealthy;
    }
    if response_time_ms > 5_000 {
        Severity::Unhealthy
    } else if response_time_ms > 1_000 {
        Severity::Degraded
    } else {
        Severity::Healthy
    }
}

#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<DatabaseConnection>,
    pub app_name: String,
    pub app_version: String,
    pub started_at: DateTime<Utc>,
}

impl HealthState {
    pub fn new(db: DatabaseConnection, app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self { db: Arc::new(db), app_name: app_name.into(), app_version: app_version.into(), started_at: Utc::now() }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    name: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct DetailedHealthResponse {
    status: &'static str,
    name: String,
    version: String,
    store: StoreCheck,
    queue_reachable: bool,
    uptime_seconds: i64,
}

#[derive(Debug, Serialize)]
struct StoreCheck {
    healthy: bool,
    response_time_ms: u64,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    status_code: u16,
    timestamp: DateTime<Utc>,
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Healthy => "healthy",
        Severity::Degraded => "degraded",
        Severity::Unhealthy => "unhealthy",
    }
}

/// Combines the three signals from spec.md §4.7's aggregation table into
/// one overall [`Severity`]:
///
/// | primary store | secondary store    | queue reachable | overall   |
/// |----------------|--------------------|-----------------|-----------|
/// | unhealthy       | any                | any              | unhealthy |
/// | healthy/degraded| any                | false            | degraded (or worse) |
/// | healthy         | none/healthy       | true             | healthy   |
/// | healthy         | degraded/unhealthy | true             | degraded  |
/// | degraded        | none/healthy       | true             | degraded  |
///
/// An unhealthy primary store always wins outright; everything else is
/// "at least degraded" once either the secondary store or the queue probe
/// reports trouble.
fn aggregate_severity(primary: Severity, secondary: Option<Severity>, queue_reachable: bool) -> Severity {
    if primary == Severity::Unhealthy {
        return Severity::Unhealthy;
    }

    let mut severity = if queue_reachable { primary } else { primary.worst(Severity::Degraded) };

    if severity == Severity::Healthy {
        if let Some(secondary) = secondary {
            if secondary != Severity::Healthy {
                severity = Severity::Degraded;
            }
        }
    }

    severity
}

/// Probes that the `processing_queue` table itself answers, distinct from
/// the generic connection ping `check_health_detailed` performs.
async fn check_queue_reachable(db: &DatabaseConnection) -> bool {
    check_health_with_query(db, QUEUE_REACHABLE_QUERY).await.is_ok()
}

async fn composite_severity(state: &HealthState) -> (Severity, StoreCheck, bool) {
    let status = check_health_detailed(&state.db).await;
    let primary = severity_for_response_time(status.healthy, status.response_time_ms);
    crate::metrics::set_store_response_time_ms("postgres", status.response_time_ms);
    crate::metrics::set_store_health("postgres", status.healthy);

    let queue_reachable = check_queue_reachable(&state.db).await;
    // Single-store deployment: no secondary store is configured, so this
    // signal never contributes anything beyond `Healthy`.
    let severity = aggregate_severity(primary, None, queue_reachable);

    let overall_score = match severity {
        Severity::Healthy => 1.0,
        Severity::Degraded => 0.5,
        Severity::Unhealthy => 0.0,
    };
    crate::metrics::set_overall_health(overall_score);
    crate::metrics::record_health_check();

    (
        severity,
        StoreCheck { healthy: status.healthy, response_time_ms: status.response_time_ms, message: status.message },
        queue_reachable,
    )
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (severity, _, _) = composite_severity(&state).await;
    let body = HealthResponse { status: severity_str(severity), name: state.app_name.clone(), version: state.app_version.clone() };
    (severity.http_status(), Json(body))
}

async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (severity, check, _) = composite_severity(&state).await;
    if severity == Severity::Unhealthy {
        let body = ErrorResponse {
            error: "System is unhealthy".to_string(),
            status_code: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            timestamp: Utc::now(),
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({
            "status": severity_str(severity),
            "store": check,
            "error": body.error,
            "status_code": body.status_code,
            "timestamp": body.timestamp,
        })))
            .into_response();
    }

    (StatusCode::OK, Json(serde_json::json!({ "status": severity_str(severity) }))).into_response()
}

/// Liveness never touches the store: it only confirms the process is
/// scheduling work.
async fn live_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}

async fn detailed_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (severity, check, queue_reachable) = composite_severity(&state).await;
    let uptime_seconds = (Utc::now() - state.started_at).num_seconds();

    if severity == Severity::Unhealthy && !check.healthy {
        let body = ErrorResponse {
            error: check.message.clone().unwrap_or_else(|| "store unreachable".to_string()),
            status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            timestamp: Utc::now(),
        };
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    }

    let body = DetailedHealthResponse {
        status: severity_str(severity),
        name: state.app_name.clone(),
        version: state.app_version.clone(),
        store: check,
        queue_reachable,
        uptime_seconds,
    };
    (severity.http_status(), Json(body)).into_response()
}

async fn metrics_handler() -> impl IntoResponse {
    let body = crate::metrics::render();
    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

/// Router with `/health`, `/health/ready`, `/health/live`, `/health/detailed`, `/metrics`.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/ready", get(ready_handler))
        .route("/health/live", get(live_handler))
        .route("/health/detailed", get(detailed_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_thresholds_match_the_documented_contract() {
        assert_eq!(severity_for_response_time(true, 100), Severity::Healthy);
        assert_eq!(severity_for_response_time(true, 1_500), Severity::Degraded);
        assert_eq!(severity_for_response_time(true, 6_000), Severity::Unhealthy);
        assert_eq!(severity_for_response_time(false, 10), Severity::Unhealthy);
    }

    #[test]
    fn worst_of_picks_the_most_severe() {
        assert_eq!(Severity::Healthy.worst(Severity::Degraded), Severity::Degraded);
        assert_eq!(Severity::Degraded.worst(Severity::Unhealthy), Severity::Unhealthy);
        assert_eq!(Severity::Healthy.worst(Severity::Healthy), Severity::Healthy);
    }

    #[test]
    fn http_status_follows_severity() {
        assert_eq!(Severity::Healthy.http_status(), StatusCode::OK);
        assert_eq!(Severity::Degraded.http_status(), StatusCode::OK);
        assert_eq!(Severity::Unhealthy.http_status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unhealthy_primary_store_wins_outright() {
        assert_eq!(aggregate_severity(Severity::Unhealthy, None, true), Severity::Unhealthy);
        assert_eq!(aggregate_severity(Severity::Unhealthy, Some(Severity::Healthy), false), Severity::Unhealthy);
    }

    #[test]
    fn unreachable_queue_degrades_a_healthy_store() {
        assert_eq!(aggregate_severity(Severity::Healthy, None, false), Severity::Degraded);
    }

    #[test]
    fn degraded_secondary_store_degrades_a_healthy_primary() {
        assert_eq!(aggregate_severity(Severity::Healthy, Some(Severity::Degraded), true), Severity::Degraded);
        assert_eq!(aggregate_severity(Severity::Healthy, Some(Severity::Unhealthy), true), Severity::Degraded);
    }

    #[test]
    fn degraded_primary_stays_degraded_when_everything_else_is_fine() {
        assert_eq!(aggregate_severity(Severity::Degraded, None, true), Severity::Degraded);
    }

    #[test]
    fn fully_healthy_signals_yield_healthy() {
        assert_eq!(aggregate_severity(Severity::Healthy, None, true), Severity::Healthy);
        assert_eq!(aggregate_severity(Severity::Healthy, Some(Severity::Healthy), true), Severity::Healthy);
    }
}

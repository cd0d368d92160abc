//! Error taxonomy for the queue engine.
//!
//! Mirrors the categorization `stream_worker::error::ErrorCategory` used to
//! apply in the Redis-stream worker this crate replaces: every failure is
//! one of a small number of kinds, and the kind alone decides whether a
//! caller should retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Caller passed a bad argument (empty flow name, zero batch size, ...).
    /// Never retried — retrying would reproduce the same bug.
    #[error("invalid argument in {operation}: {message}")]
    Argument { operation: &'static str, message: String },

    /// A finalize/complete/fail call targeted a record this instance no
    /// longer has authority over (already reclaimed, already finalized).
    /// Not retried; surfaced to the operator.
    #[error("stale claim in {operation}: record {record_id} is no longer owned by {instance_id}")]
    StaleClaim {
        operation: &'static str,
        record_id: i64,
        instance_id: String,
    },

    /// Connection drop, timeout, or other infrastructure hiccup. Safe to
    /// retry with backoff up to `max_attempts`.
    #[error("transient store failure in {operation}: {source}")]
    Transient {
        operation: &'static str,
        #[source]
        source: database::DatabaseError,
    },

    /// The store rejected the operation for a reason that retrying will
    /// not fix (constraint violation, malformed SQL, schema mismatch).
    #[error("store error in {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: database::DatabaseError,
    },

    /// The caller's task function raised; recorded verbatim as the
    /// failed record's `error_message`.
    #[error("task error: {0}")]
    Task(String),
}

impl QueueError {
    pub fn argument(operation: &'static str, message: impl Into<String>) -> Self {
        QueueError::Argument { operation, message: message.into() }
    }

    /// Whether a network-level retry loop (see [`crate::retry::Retrier`])
    /// should attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Transient { .. })
    }

    /// Classify a raw store error as transient or permanent, the same
    /// distinction `stream_worker::error::StreamError::category` draws for
    /// Redis errors, generalized to `sea_orm`/`sqlx` failures.
    pub fn classify_store_error(operation: &'static str, err: database::DatabaseError) -> Self {
        let transient = match &err {
            database::DatabaseError::Postgres(db_err) => is_transient_db_err(db_err),
            database::DatabaseError::ConnectionFailed(_) => true,
            database::DatabaseError::HealthCheckFailed(_) => true,
            _ => false,
        };

        if transient {
            QueueError::Transient { operation, source: err }
        } else {
            QueueError::Store { operation, source: err }
        }
    }
}

fn is_transient_db_err(err: &sea_orm::DbErr) -> bool {
    let text = err.to_string().to_lowercase();
    text.contains("connection")
        || text.contains("timeout")
        || text.contains("timed out")
        || text.contains("pool")
        || text.contains("closed")
}

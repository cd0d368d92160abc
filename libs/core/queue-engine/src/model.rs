//! Data model shared by every component: the queue record, its status, and
//! the aggregate counts reported by the status/diagnostics surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of a queue record.
///
/// Stored as `text` in `processing_queue.status`; the four values are the
/// only ones the schema or any operation here ever writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Processing => "processing",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RecordStatus::Pending),
            "processing" => Some(RecordStatus::Processing),
            "completed" => Some(RecordStatus::Completed),
            "failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }
}

/// A single row of `processing_queue`.
///
/// `payload` is an opaque structured document: the engine never inspects
/// its shape, only moves it between the caller and the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub flow_name: String,
    pub payload: serde_json::Value,
    pub status: RecordStatus,
    pub flow_instance_id: Option<String>,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A record handed back by the Claim Engine: the slice of columns the
/// claiming worker actually needs, nothing from the authority fields it
/// must not assume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedRecord {
    pub id: i64,
    pub payload: serde_json::Value,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts across the whole queue or a single flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
    pub by_flow: HashMap<String, FlowCounts>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

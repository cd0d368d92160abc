//! Distributed work-queue processor.
//!
//! ## Architecture
//!
//! ```text
//! Ingress (C6)
//!   ↓ INSERT
//! processing_queue (Postgres, C1)
//!   ↓ claim (C3, FOR UPDATE SKIP LOCKED)
//! Worker Instance (C9) ──→ caller's task fn ──→ Finalizer (C4)
//!   ↑                                               ↓
//!   └──────────────── Recovery Engine (C5) ←────────┘
//!
//! Status (C7) and Health Monitor (C8) read the table without mutating it.
//! ```
//!
//! Many workers, each with its own `instance_id`, claim from and finalize
//! into the same table concurrently. No record is ever processed by two
//! instances at once, and no record is silently dropped: it ends in
//! `completed`, `failed`, or back in `pending` for another attempt.

pub mod claim;
pub mod config;
pub mod error;
pub mod finalize;
pub mod health;
pub mod ingress;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod recovery;
pub mod retry;
pub mod status;
pub mod worker;

pub use claim::ClaimEngine;
pub use config::WorkerSettings;
pub use error::QueueError;
pub use finalize::Finalizer;
pub use health::{health_router, HealthState, Severity};
pub use ingress::Ingress;
pub use model::{ClaimedRecord, FlowCounts, QueueSnapshot, Record, RecordStatus};
pub use recovery::RecoveryEngine;
pub use retry::{retry_transient, RetrierConfig};
pub use status::StatusReporter;
pub use worker::{new_instance_id, TaskOutcome, Worker};

pub type QueueResult<T> = Result<T, QueueError>;

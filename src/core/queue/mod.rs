// src/core/queue/mod.rs

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::core::error::QueueError;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

/// Lifecycle state of a queued scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

/// One job in the crawl frontier: a `(domain, depth)` pair plus claim
/// bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: i64,
    pub domain: String,
    pub depth: u32,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub failure_reason: Option<String>,
}

/// Capability interface over the two queue variants.
///
/// The ephemeral [`MemoryQueue`] serves single-process crawls; the durable
/// [`SqliteQueue`] is shared between worker processes and guarantees that
/// `claim` hands any given job to exactly one caller. Workers never talk
/// to each other; the atomic claim is the only synchronization point.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Adds a `(domain, depth)` job in `queued` state, returning its id.
    async fn enqueue(&self, domain: &str, depth: u32) -> Result<i64, QueueError>;

    /// Claims the oldest `queued` job (FIFO by enqueue time): transitions
    /// it to `processing` and stamps the lock fields in one indivisible
    /// operation. Returns `None` when nothing is queued.
    async fn claim(&self) -> Result<Option<QueueJob>, QueueError>;

    /// Marks a claimed job terminal-successful.
    async fn mark_done(&self, job_id: i64) -> Result<(), QueueError>;

    /// Marks a claimed job terminal-failed with a reason.
    async fn mark_failed(&self, job_id: i64, reason: &str) -> Result<(), QueueError>;

    /// Number of jobs still in `queued` state.
    async fn count(&self) -> Result<u64, QueueError>;

    async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.count().await? == 0)
    }
}

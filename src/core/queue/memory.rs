// src/core/queue/memory.rs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::trace;

use crate::core::error::QueueError;
use crate::core::queue::{JobQueue, JobStatus, QueueJob};

/// Ephemeral single-process queue: a FIFO behind a mutex.
///
/// No persistence and no lock bookkeeping; `claim` simply pops the front.
/// Claimed jobs leave the queue entirely, so the terminal-state markers
/// have nothing left to update and are no-ops.
#[derive(Default)]
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<QueueJob>>,
    next_id: AtomicI64,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, domain: &str, depth: u32) -> Result<i64, QueueError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job = QueueJob {
            id,
            domain: domain.to_string(),
            depth,
            status: JobStatus::Queued,
            enqueued_at: Utc::now(),
            locked_at: None,
            locked_by: None,
            failure_reason: None,
        };
        trace!(domain, depth, id, "Enqueued job in memory queue.");
        self.jobs.lock().await.push_back(job);
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<QueueJob>, QueueError> {
        let mut jobs = self.jobs.lock().await;
        Ok(jobs.pop_front().map(|mut job| {
            job.status = JobStatus::Processing;
            job
        }))
    }

    async fn mark_done(&self, _job_id: i64) -> Result<(), QueueError> {
        Ok(())
    }

    async fn mark_failed(&self, _job_id: i64, _reason: &str) -> Result<(), QueueError> {
        Ok(())
    }

    async fn count(&self) -> Result<u64, QueueError> {
        Ok(self.jobs.lock().await.len() as u64)
    }
}

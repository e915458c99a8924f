// src/core/queue/sqlite.rs

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::core::error::QueueError;
use crate::core::queue::{JobQueue, JobStatus, QueueJob};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scan_jobs (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    domain         TEXT NOT NULL,
    depth          INTEGER NOT NULL DEFAULT 0,
    status         TEXT NOT NULL DEFAULT 'queued',
    enqueued_at    TEXT NOT NULL,
    locked_at      TEXT,
    locked_by      TEXT,
    failure_reason TEXT
);
CREATE INDEX IF NOT EXISTS idx_scan_jobs_claim ON scan_jobs (status, enqueued_at);
"#;

/// Durable multi-worker queue backed by a shared SQLite database.
///
/// The claim is a single `UPDATE ... RETURNING` statement selecting the
/// oldest `queued` row; SQLite's writer lock makes the select-and-update
/// indivisible, so under concurrent claimants exactly one receives any
/// given job. There is no automatic lease expiry: a worker that crashes
/// after claiming leaves its job in `processing` until an operator runs
/// [`SqliteQueue::requeue_stale`].
pub struct SqliteQueue {
    pool: SqlitePool,
    worker_id: String,
}

impl SqliteQueue {
    /// Opens (creating if missing) the queue database at `path`.
    pub async fn connect(path: &Path, worker_id: impl Into<String>) -> Result<Self, QueueError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;

        let worker_id = worker_id.into();
        info!(worker_id, path = %path.display(), "Connected to SQLite job queue.");
        Ok(Self { pool, worker_id })
    }

    fn map_row(row: &SqliteRow) -> Result<QueueJob, QueueError> {
        let status_raw: String = row.try_get("status")?;
        let status = status_raw
            .parse::<JobStatus>()
            .map_err(|_| QueueError::InvalidJob(format!("unknown job status {status_raw:?}")))?;
        let depth: i64 = row.try_get("depth")?;
        Ok(QueueJob {
            id: row.try_get("id")?,
            domain: row.try_get("domain")?,
            depth: depth as u32,
            status,
            enqueued_at: row.try_get("enqueued_at")?,
            locked_at: row.try_get("locked_at")?,
            locked_by: row.try_get("locked_by")?,
            failure_reason: row.try_get("failure_reason")?,
        })
    }

    /// Moves `processing` jobs whose lock is older than `older_than` back
    /// to `queued`. Explicit maintenance for jobs orphaned by crashed
    /// workers; never runs automatically. Returns the number requeued.
    pub async fn requeue_stale(&self, older_than: Duration) -> Result<u64, QueueError> {
        let cutoff: DateTime<Utc> = Utc::now()
            - chrono::Duration::from_std(older_than)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let result = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'queued', locked_at = NULL, locked_by = NULL
            WHERE status = 'processing' AND locked_at <= ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        let requeued = result.rows_affected();
        if requeued > 0 {
            info!(requeued, "Requeued stale processing jobs.");
        }
        Ok(requeued)
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn enqueue(&self, domain: &str, depth: u32) -> Result<i64, QueueError> {
        let row = sqlx::query(
            r#"
            INSERT INTO scan_jobs (domain, depth, status, enqueued_at)
            VALUES (?1, ?2, 'queued', ?3)
            RETURNING id
            "#,
        )
        .bind(domain)
        .bind(depth as i64)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        let id: i64 = row.try_get("id")?;
        debug!(domain, depth, id, "Enqueued job.");
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<QueueJob>, QueueError> {
        // Single-statement find-and-lock. The inner select and the update
        // happen under one writer lock, so no two claimants can both see
        // the same row in `queued`.
        let row = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'processing', locked_at = ?1, locked_by = ?2
            WHERE id = (
                SELECT id FROM scan_jobs
                WHERE status = 'queued'
                ORDER BY enqueued_at ASC, id ASC
                LIMIT 1
            )
            RETURNING id, domain, depth, status, enqueued_at,
                      locked_at, locked_by, failure_reason
            "#,
        )
        .bind(Utc::now())
        .bind(&self.worker_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let job = Self::map_row(&row)?;
                debug!(job_id = job.id, domain = %job.domain, "Claimed job.");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn mark_done(&self, job_id: i64) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'done', locked_at = NULL, locked_by = NULL
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: i64, reason: &str) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'failed', failure_reason = ?2,
                locked_at = NULL, locked_by = NULL
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM scan_jobs WHERE status = 'queued'")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    async fn queue_at(dir: &tempfile::TempDir, worker: &str) -> SqliteQueue {
        SqliteQueue::connect(&dir.path().join("queue.db"), worker)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn claim_is_fifo_and_stamps_lock_fields() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_at(&dir, "worker_test").await;

        queue.enqueue("a.com", 0).await.unwrap();
        queue.enqueue("b.com", 1).await.unwrap();

        let first = queue.claim().await.unwrap().unwrap();
        assert_eq!(first.domain, "a.com");
        assert_eq!(first.status, JobStatus::Processing);
        assert_eq!(first.locked_by.as_deref(), Some("worker_test"));
        assert!(first.locked_at.is_some());

        let second = queue.claim().await.unwrap().unwrap();
        assert_eq!(second.domain, "b.com");
        assert_eq!(second.depth, 1);

        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn terminal_transitions_update_status() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_at(&dir, "worker_test").await;

        let done_id = queue.enqueue("a.com", 0).await.unwrap();
        let failed_id = queue.enqueue("b.com", 0).await.unwrap();
        queue.claim().await.unwrap();
        queue.claim().await.unwrap();

        queue.mark_done(done_id).await.unwrap();
        queue.mark_failed(failed_id, "scan error").await.unwrap();

        let row = sqlx::query("SELECT status, failure_reason FROM scan_jobs WHERE id = ?1")
            .bind(failed_id)
            .fetch_one(&queue.pool)
            .await
            .unwrap();
        let status: String = row.try_get("status").unwrap();
        let reason: Option<String> = row.try_get("failure_reason").unwrap();
        assert_eq!(status, "failed");
        assert_eq!(reason.as_deref(), Some("scan error"));

        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claimants_each_get_a_job_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(queue_at(&dir, "worker_shared").await);

        let total = 20;
        for i in 0..total {
            queue.enqueue(&format!("d{i}.com"), 0).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                while let Some(job) = queue.claim().await.unwrap() {
                    ids.push(job.id);
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        let mut claimed = 0;
        for handle in handles {
            for id in handle.await.unwrap() {
                claimed += 1;
                assert!(seen.insert(id), "job {id} claimed twice");
            }
        }
        assert_eq!(claimed, total);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn requeue_stale_recovers_orphaned_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_at(&dir, "worker_crashed").await;

        queue.enqueue("a.com", 0).await.unwrap();
        let job = queue.claim().await.unwrap().unwrap();
        assert_eq!(queue.count().await.unwrap(), 0);

        // Zero age requeues anything currently locked.
        let requeued = queue.requeue_stale(Duration::ZERO).await.unwrap();
        assert_eq!(requeued, 1);
        assert_eq!(queue.count().await.unwrap(), 1);

        let reclaimed = queue.claim().await.unwrap().unwrap();
        assert_eq!(reclaimed.id, job.id);
    }
}

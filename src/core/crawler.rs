// src/core/crawler.rs

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::error::QueueError;
use crate::core::models::{CrawlStats, ScanReport};
use crate::core::orchestrator::{ScanOptions, ScanOrchestrator};
use crate::core::queue::JobQueue;
use crate::core::sink::ResultSink;

/// Emit a progress snapshot every this many scans (and always at the end).
const PROGRESS_EVERY: u64 = 10;

/// How long an idle worker waits before polling the durable queue again.
const IDLE_WAIT: Duration = Duration::from_secs(15);

/// Crawl bounds and behavior.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Expand the frontier with domains discovered by the `page` check.
    pub crawl: bool,
    /// Jobs deeper than this are never processed.
    pub max_depth: u32,
    /// Stop after this many successful scans, regardless of queue size.
    pub max_domains: Option<u64>,
    /// Pause between successive scans to throttle outbound load.
    pub interval: Duration,
    /// Worker mode: wait on an empty queue instead of exiting.
    pub loop_mode: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            crawl: false,
            max_depth: 0,
            max_domains: None,
            interval: Duration::ZERO,
            loop_mode: false,
        }
    }
}

/// Drives the crawl frontier through the orchestrator.
///
/// Claims `(domain, depth)` jobs from the queue, scans each domain once,
/// and feeds newly discovered link domains back into the frontier under
/// the depth and count limits. Works identically over the ephemeral and
/// the durable queue; in worker mode several processes run this loop
/// against the same durable queue, synchronized only by the atomic claim.
pub struct CrawlController<'a> {
    queue: Arc<dyn JobQueue>,
    orchestrator: &'a ScanOrchestrator<'a>,
    sink: &'a ResultSink,
    opts: CrawlOptions,
    scan_opts: ScanOptions,
    scanned: HashSet<String>,
    failed: HashSet<String>,
}

impl<'a> CrawlController<'a> {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        orchestrator: &'a ScanOrchestrator<'a>,
        sink: &'a ResultSink,
        opts: CrawlOptions,
        scan_opts: ScanOptions,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            sink,
            opts,
            scan_opts,
            scanned: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// Seeds the frontier with depth-0 jobs.
    pub async fn seed(&self, domains: &[String]) -> Result<(), QueueError> {
        for domain in domains {
            self.queue.enqueue(domain, 0).await?;
        }
        info!(count = domains.len(), "Seeded crawl frontier.");
        Ok(())
    }

    async fn snapshot(&self) -> CrawlStats {
        let queued = self.queue.count().await.unwrap_or(0);
        CrawlStats {
            queued,
            scanned: self.scanned.len() as u64,
            failed: self.failed.len() as u64,
        }
    }

    /// Runs the crawl loop to completion and returns the final stats.
    ///
    /// Only queue infrastructure failures abort the loop; scan failures
    /// mark the job failed and move on.
    pub async fn run(&mut self) -> Result<CrawlStats, QueueError> {
        let mut iteration: u64 = 0;
        loop {
            let Some(job) = self.queue.claim().await? else {
                if self.opts.loop_mode {
                    debug!("Queue empty, waiting for work.");
                    tokio::time::sleep(IDLE_WAIT).await;
                    continue;
                }
                break;
            };

            if job.depth > self.opts.max_depth {
                debug!(domain = %job.domain, depth = job.depth, "Job exceeds max depth, rejecting.");
                self.queue
                    .mark_failed(job.id, "depth exceeds max_depth")
                    .await?;
                continue;
            }

            if self.scanned.contains(&job.domain) {
                debug!(domain = %job.domain, "Domain already scanned, skipping.");
                self.queue.mark_done(job.id).await?;
                continue;
            }

            iteration += 1;
            let stats = self.snapshot().await;
            info!(
                iteration,
                domain = %job.domain,
                depth = job.depth,
                queued = stats.queued,
                scanned = stats.scanned,
                failed = stats.failed,
                "Scanning domain."
            );

            match self.orchestrator.scan_domain(&job.domain, &self.scan_opts).await {
                Ok(report) => {
                    self.scanned.insert(job.domain.clone());
                    self.queue.mark_done(job.id).await?;
                    self.expand_frontier(&job.domain, job.depth, &report).await?;
                }
                Err(e) => {
                    warn!(domain = %job.domain, error = %e, "Domain scan failed.");
                    self.failed.insert(job.domain.clone());
                    self.queue.mark_failed(job.id, &e.to_string()).await?;
                }
            }

            let queue_empty = self.queue.is_empty().await?;
            if iteration % PROGRESS_EVERY == 0 || queue_empty {
                let stats = self.snapshot().await;
                info!(
                    queued = stats.queued,
                    scanned = stats.scanned,
                    failed = stats.failed,
                    "Crawl progress."
                );
                self.sink.write_progress(&stats);
            }

            if let Some(max) = self.opts.max_domains {
                if self.scanned.len() as u64 >= max {
                    info!(max, "Reached max crawl domains limit, stopping further scans.");
                    break;
                }
            }

            if !queue_empty && !self.opts.interval.is_zero() {
                debug!(secs = self.opts.interval.as_secs(), "Waiting before next scan.");
                tokio::time::sleep(self.opts.interval).await;
            }
        }

        let stats = self.snapshot().await;
        self.sink.write_progress(&stats);
        self.sink.dump_domain_lists(&self.scanned, &self.failed);
        info!(
            scanned = stats.scanned,
            failed = stats.failed,
            "Crawl finished."
        );
        Ok(stats)
    }

    /// Enqueues the domains linked from a completed scan's rendered page.
    ///
    /// A malformed or missing `page` output only skips expansion for this
    /// domain; the scan's own result is already complete and saved.
    async fn expand_frontier(
        &mut self,
        domain: &str,
        depth: u32,
        report: &ScanReport,
    ) -> Result<(), QueueError> {
        if !self.opts.crawl || depth >= self.opts.max_depth {
            return Ok(());
        }
        let Some(discovered) = linked_domains(report) else {
            debug!(domain, "No page link data in scan result, skipping frontier expansion.");
            return Ok(());
        };

        for linked in discovered {
            if self.scanned.contains(&linked) {
                debug!(domain = %linked, "Linked domain already scanned, not re-enqueueing.");
                continue;
            }
            info!(from = domain, domain = %linked, depth = depth + 1, "Found linked domain.");
            self.queue.enqueue(&linked, depth + 1).await?;
        }
        Ok(())
    }
}

/// Pulls `parsed.linkDomains` out of the `page` check output.
fn linked_domains(report: &ScanReport) -> Option<Vec<String>> {
    let domains = report
        .check_output("page")?
        .get("parsed")?
        .get("linkDomains")?
        .as_array()?;
    Some(
        domains
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

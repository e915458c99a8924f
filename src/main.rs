// src/main.rs

mod config;
mod core;
mod logging;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use tracing::info;

use crate::config::{Config, QueueEngine};
use crate::core::cache::FileCacheStore;
use crate::core::crawler::{CrawlController, CrawlOptions};
use crate::core::orchestrator::{ScanOptions, ScanOrchestrator};
use crate::core::queue::{JobQueue, MemoryQueue, SqliteQueue};
use crate::core::sink::ResultSink;

/// Domain scanner and crawler.
///
/// Scans one or more domains through the full check battery, optionally
/// following discovered link domains breadth-first. With the sqlite queue
/// engine several worker processes can drain the same frontier.
#[derive(Debug, Parser)]
#[command(name = "webcheck", version, about)]
struct Cli {
    /// Domain to scan, a comma-separated list, or @file with one domain
    /// per line. Optional when draining an already-seeded sqlite queue.
    targets: Option<String>,

    /// Only run these checks (comma-separated names).
    #[arg(long)]
    checks: Option<String>,

    /// Probe targets over plain http instead of https.
    #[arg(long)]
    no_tls: bool,

    /// Re-run every check, ignoring cached results.
    #[arg(long)]
    force: bool,

    /// Follow link domains discovered by the page check.
    #[arg(long)]
    crawl: bool,

    /// Maximum crawl depth; seeds are depth 0.
    #[arg(long, default_value_t = 1)]
    crawl_max_depth: u32,

    /// Stop after this many successfully scanned domains.
    #[arg(long)]
    crawl_max_domains: Option<u64>,

    /// Seconds to wait between successive scans.
    #[arg(long, default_value_t = 0)]
    crawl_interval: u64,

    /// Queue engine override (memory or sqlite).
    #[arg(long)]
    queue: Option<QueueEngine>,

    /// Identity stamped on claimed jobs in the sqlite queue.
    #[arg(long)]
    worker_id: Option<String>,

    /// Keep waiting for new work when the queue runs empty.
    #[arg(long = "loop")]
    loop_mode: bool,

    /// Enqueue the targets and exit without scanning.
    #[arg(long)]
    no_scan: bool,

    /// Requeue sqlite jobs stuck in processing longer than this many
    /// seconds before starting.
    #[arg(long)]
    requeue_stale_secs: Option<u64>,
}

impl Cli {
    fn seed_domains(&self) -> Result<Vec<String>> {
        let Some(raw) = &self.targets else {
            return Ok(Vec::new());
        };
        let entries: Vec<String> = if let Some(path) = raw.strip_prefix('@') {
            fs::read_to_string(path)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect()
        } else {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        Ok(entries)
    }

    fn check_filter(&self) -> Option<Vec<String>> {
        self.checks.as_ref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

async fn build_queue(config: &Config, cli: &Cli) -> Result<Arc<dyn JobQueue>> {
    match config.queue_engine {
        QueueEngine::Memory => Ok(Arc::new(MemoryQueue::new())),
        QueueEngine::Sqlite => {
            let worker_id = cli
                .worker_id
                .clone()
                .unwrap_or_else(|| format!("worker_{}", Utc::now().timestamp_millis()));
            let queue = SqliteQueue::connect(&config.queue_db_path, worker_id).await?;
            if let Some(secs) = cli.requeue_stale_secs {
                let requeued = queue.requeue_stale(Duration::from_secs(secs)).await?;
                info!(requeued, older_than_secs = secs, "Stale job recovery finished.");
            }
            Ok(Arc::new(queue))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::initialize_logging()?;

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(engine) = cli.queue {
        config.queue_engine = engine;
    }

    let seeds = cli.seed_domains()?;
    if seeds.is_empty() && config.queue_engine == QueueEngine::Memory {
        return Err(eyre!(
            "no domains given; pass a domain, a comma-separated list, or @file \
             (only the sqlite queue can carry work between runs)"
        ));
    }

    let queue = build_queue(&config, &cli).await?;

    if !seeds.is_empty() {
        for domain in &seeds {
            queue.enqueue(domain, 0).await?;
        }
        info!(count = seeds.len(), "Enqueued seed domains.");
    }

    if cli.no_scan {
        let queued = queue.count().await?;
        info!(queued, "Seed-only run, exiting without scanning.");
        return Ok(());
    }

    let cache = FileCacheStore::new(config.cache_dir());
    let sink = ResultSink::new(config.scans_dir());
    let orchestrator = ScanOrchestrator::new(&config, &cache, &sink);

    let crawl_opts = CrawlOptions {
        crawl: cli.crawl,
        max_depth: cli.crawl_max_depth,
        max_domains: cli.crawl_max_domains,
        interval: Duration::from_secs(cli.crawl_interval),
        loop_mode: cli.loop_mode,
    };
    let scan_opts = ScanOptions {
        use_tls: !cli.no_tls,
        force: cli.force,
        checks: cli.check_filter(),
    };

    let mut controller =
        CrawlController::new(queue, &orchestrator, &sink, crawl_opts, scan_opts);
    let stats = controller.run().await?;

    info!(
        scanned = stats.scanned,
        failed = stats.failed,
        queued = stats.queued,
        "All done."
    );
    Ok(())
}

// src/core/sink.rs

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::core::models::{CrawlStats, HistoryRecord, ScanReport};

/// Persists scan artifacts: the per-domain aggregated report, the
/// append-only scan history, the crawl progress snapshot and the
/// end-of-run domain lists.
///
/// The report write is the one operation allowed to fail the scan; the
/// auxiliary records are best-effort and merely logged on failure.
#[derive(Debug, Clone)]
pub struct ResultSink {
    scans_dir: PathBuf,
}

impl ResultSink {
    pub fn new(scans_dir: impl Into<PathBuf>) -> Self {
        Self {
            scans_dir: scans_dir.into(),
        }
    }

    /// Writes the aggregated report to `<scans_dir>/<domain>/scan_result.json`.
    pub fn save_scan_result(&self, report: &ScanReport) -> std::io::Result<PathBuf> {
        let path = self.scans_dir.join(&report.domain).join("scan_result.json");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(report)?;
        fs::write(&path, raw)?;
        info!(domain = %report.domain, path = %path.display(), "Saved scan result.");
        Ok(path)
    }

    /// Appends one `(scanner, target, timestamp)` line to the history log.
    pub fn record_history(&self, scanner: &str, target: &str) {
        let record = HistoryRecord {
            scanner: scanner.to_string(),
            target: target.to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.append_history(&record) {
            warn!(target, error = %e, "Failed to append scan history entry.");
        }
    }

    fn append_history(&self, record: &HistoryRecord) -> std::io::Result<()> {
        fs::create_dir_all(&self.scans_dir)?;
        let path = self.scans_dir.join("scan_history.jsonl");
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)
    }

    /// Overwrites the crawl progress snapshot file.
    pub fn write_progress(&self, stats: &CrawlStats) {
        let path = self.scans_dir.join("scan_progress.json");
        if let Err(e) = self.try_write_json(&path, stats) {
            warn!(error = %e, "Failed to write progress snapshot.");
        }
    }

    /// Dumps the scanned/failed domain sets at the end of a crawl.
    pub fn dump_domain_lists(&self, scanned: &HashSet<String>, failed: &HashSet<String>) {
        if !scanned.is_empty() {
            self.dump_list("scanned_domains.txt", scanned);
        }
        if !failed.is_empty() {
            self.dump_list("failed_domains.txt", failed);
        }
    }

    fn dump_list(&self, name: &str, domains: &HashSet<String>) {
        let path = self.scans_dir.join(name);
        let mut lines: Vec<&str> = domains.iter().map(String::as_str).collect();
        lines.sort_unstable();
        if let Err(e) = fs::create_dir_all(&self.scans_dir)
            .and_then(|_| fs::write(&path, lines.join("\n") + "\n"))
        {
            warn!(path = %path.display(), error = %e, "Failed to dump domain list.");
        }
    }

    fn try_write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> std::io::Result<()> {
        fs::create_dir_all(&self.scans_dir)?;
        fs::write(path, serde_json::to_string_pretty(value)?)
    }
}

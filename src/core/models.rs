// src/core/models.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// --- Scan Report Models ---

/// Metadata block attached to every completed scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetadata {
    #[serde(rename = "type")]
    pub scan_type: String,
    pub target: String,
    pub status: String,
    pub message: String,
    pub started_at: i64,
    pub ended_at: i64,
    pub duration_ms: i64,
}

/// Aggregated result of one orchestrator run: one entry per executed check
/// (its raw JSON output, or `{"error": ...}`), plus the `scan` metadata.
///
/// Immutable once handed to the result sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub domain: String,
    pub url: String,
    #[serde(flatten)]
    pub checks: Map<String, Value>,
    pub scan: ScanMetadata,
}

impl ScanReport {
    /// Output of a named check, if it ran and did not fail.
    pub fn check_output(&self, name: &str) -> Option<&Value> {
        self.checks.get(name).filter(|v| v.get("error").is_none())
    }
}

// --- Crawl Progress Models ---

/// Progress snapshot emitted periodically by the crawl controller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrawlStats {
    pub queued: u64,
    pub scanned: u64,
    pub failed: u64,
}

// --- Scan History Models ---

/// One line of the append-only scan history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub scanner: String,
    pub target: String,
    pub timestamp_ms: i64,
}

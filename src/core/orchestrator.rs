// src/core/orchestrator.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::core::cache::FileCacheStore;
use crate::core::content::RequestCache;
use crate::core::error::ScanError;
use crate::core::invoker::MemoizedInvoker;
use crate::core::models::{ScanMetadata, ScanReport};
use crate::core::registry::{
    CheckRequest, CheckScope, CheckSpec, CHECK_REGISTRY, LIVENESS_CHECK,
};
use crate::core::sink::ResultSink;

/// Per-scan options, mostly mirrors of the CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub use_tls: bool,
    /// Force-refresh: bypass the result cache for every check.
    pub force: bool,
    /// When set, only checks with these names run.
    pub checks: Option<Vec<String>>,
}

impl ScanOptions {
    fn includes(&self, name: &str) -> bool {
        match &self.checks {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }
}

/// Runs the full check battery for one domain and aggregates the outputs
/// into a [`ScanReport`].
///
/// Host-scoped checks run first against the bare domain, then
/// target-scoped checks against the full URL, all in registration order
/// and strictly sequentially. A failed check is recorded under its name as
/// `{"error": ...}` and never stops the phase, with one exception: a
/// failed liveness check skips the remaining target-scoped checks, since
/// there is no point probing content or security on an unreachable host.
pub struct ScanOrchestrator<'a> {
    config: &'a Config,
    cache: &'a FileCacheStore,
    sink: &'a ResultSink,
    specs: &'a [CheckSpec],
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(config: &'a Config, cache: &'a FileCacheStore, sink: &'a ResultSink) -> Self {
        Self::with_registry(config, cache, sink, &CHECK_REGISTRY)
    }

    /// Same orchestrator over a custom check battery.
    pub fn with_registry(
        config: &'a Config,
        cache: &'a FileCacheStore,
        sink: &'a ResultSink,
        specs: &'a [CheckSpec],
    ) -> Self {
        Self {
            config,
            cache,
            sink,
            specs,
        }
    }

    fn in_scope(&self, scope: CheckScope) -> impl Iterator<Item = &'a CheckSpec> {
        self.specs.iter().filter(move |c| c.scope == scope)
    }

    /// Scans one domain end to end and hands the report to the sink.
    pub async fn scan_domain(
        &self,
        domain: &str,
        opts: &ScanOptions,
    ) -> Result<ScanReport, ScanError> {
        let domain = normalize_domain(domain);
        let scheme = if opts.use_tls { "https" } else { "http" };
        let url = format!("{scheme}://{domain}");
        let ttl = if opts.force {
            Duration::ZERO
        } else {
            self.config.cache_ttl
        };

        let started_at = Utc::now().timestamp_millis();
        info!(domain = %domain, url = %url, force = opts.force, "Starting domain scan.");

        let http = Arc::new(RequestCache::new(&self.config.user_agent)?);
        let invoker = MemoizedInvoker::new(self.cache);
        let mut checks = Map::new();

        // Host-scoped phase: every failure is isolated.
        for spec in self.in_scope(CheckScope::Host) {
            if !opts.includes(spec.name) {
                continue;
            }
            let request = CheckRequest {
                target: domain.clone(),
                http: Arc::clone(&http),
                data_dir: self.config.data_dir.clone(),
            };
            match invoker.invoke(&domain, spec, request, ttl).await {
                Ok(value) => {
                    checks.insert(spec.name.to_string(), value);
                }
                Err(e) => {
                    warn!(check = spec.name, domain = %domain, error = %e, "Host check failed.");
                    checks.insert(spec.name.to_string(), json!({ "error": e.to_string() }));
                }
            }
        }

        // Target-scoped phase: same isolation, except the liveness check.
        for spec in self.in_scope(CheckScope::Target) {
            if !opts.includes(spec.name) {
                continue;
            }
            let request = CheckRequest {
                target: url.clone(),
                http: Arc::clone(&http),
                data_dir: self.config.data_dir.clone(),
            };
            match invoker.invoke(&domain, spec, request, ttl).await {
                Ok(value) => {
                    let reachable = spec.name != LIVENESS_CHECK || is_up(&value);
                    checks.insert(spec.name.to_string(), value);
                    if !reachable {
                        info!(domain = %domain, "Liveness check reports target down, skipping remaining target checks.");
                        break;
                    }
                }
                Err(e) => {
                    warn!(check = spec.name, url = %url, error = %e, "Target check failed.");
                    checks.insert(spec.name.to_string(), json!({ "error": e.to_string() }));
                    if spec.name == LIVENESS_CHECK {
                        info!(domain = %domain, "Liveness check failed, skipping remaining target checks.");
                        break;
                    }
                }
            }
        }

        let ended_at = Utc::now().timestamp_millis();
        let duration_ms = ended_at - started_at;
        let report = ScanReport {
            domain: domain.clone(),
            url,
            checks,
            scan: ScanMetadata {
                scan_type: "domain".to_string(),
                target: domain.clone(),
                status: "completed".to_string(),
                message: format!("Scan completed successfully. Took {duration_ms} ms"),
                started_at,
                ended_at,
                duration_ms,
            },
        };

        // The request cache is scoped to this scan; drop its entries so a
        // later scan never observes them.
        http.clear().await;

        self.sink.save_scan_result(&report)?;
        self.sink.record_history("domain", &domain);
        info!(domain = %domain, duration_ms, "Domain scan finished.");
        Ok(report)
    }
}

/// Strips any scheme and path, leaving the bare domain.
fn normalize_domain(input: &str) -> String {
    let rest = match input.split_once("://") {
        Some((_, rest)) => rest,
        None => input,
    };
    rest.split('/').next().unwrap_or(rest).trim().to_string()
}

/// A cached liveness result counts as "up" unless it says otherwise.
fn is_up(value: &Value) -> bool {
    value.get("isUp").and_then(Value::as_bool).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueEngine;
    use crate::core::registry::CheckFuture;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            data_dir: dir.path().to_path_buf(),
            user_agent: "webcheck-test".to_string(),
            cache_ttl: Duration::from_secs(60),
            queue_engine: QueueEngine::Memory,
            queue_db_path: dir.path().join("queue.db"),
        }
    }

    fn ok_host(req: CheckRequest) -> CheckFuture {
        Box::pin(async move { Ok(json!({ "domain": req.target })) })
    }

    fn failing_host(_req: CheckRequest) -> CheckFuture {
        Box::pin(async { Err(crate::core::error::CheckError::failed("dns timeout")) })
    }

    fn ok_status(req: CheckRequest) -> CheckFuture {
        Box::pin(async move { Ok(json!({ "url": req.target, "isUp": true })) })
    }

    fn refused_status(_req: CheckRequest) -> CheckFuture {
        Box::pin(async {
            Err(crate::core::error::CheckError::failed(
                "Target unreachable: connection refused",
            ))
        })
    }

    fn ok_target(_req: CheckRequest) -> CheckFuture {
        Box::pin(async { Ok(json!({ "found": true })) })
    }

    fn spec(
        name: &'static str,
        scope: CheckScope,
        handler: fn(CheckRequest) -> CheckFuture,
    ) -> CheckSpec {
        CheckSpec {
            name,
            scope,
            handler,
            ttl_override: None,
        }
    }

    fn battery(status_handler: fn(CheckRequest) -> CheckFuture) -> Vec<CheckSpec> {
        vec![
            spec("ip", CheckScope::Host, ok_host),
            spec("whois", CheckScope::Host, failing_host),
            spec(LIVENESS_CHECK, CheckScope::Target, status_handler),
            spec("http_headers", CheckScope::Target, ok_target),
            spec("robotstxt", CheckScope::Target, ok_target),
        ]
    }

    #[tokio::test]
    async fn per_check_failures_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let cache = FileCacheStore::new(config.cache_dir());
        let sink = ResultSink::new(config.scans_dir());
        let specs = battery(ok_status);
        let orchestrator = ScanOrchestrator::with_registry(&config, &cache, &sink, &specs);

        let report = orchestrator
            .scan_domain("example.com", &ScanOptions { use_tls: true, ..Default::default() })
            .await
            .unwrap();

        assert_eq!(report.checks["whois"]["error"], "dns timeout");
        // The failure did not stop the later checks.
        assert!(report.checks.contains_key("http_headers"));
        assert!(report.checks.contains_key("robotstxt"));
        assert_eq!(report.scan.status, "completed");
    }

    #[tokio::test]
    async fn failed_liveness_short_circuits_target_phase_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let cache = FileCacheStore::new(config.cache_dir());
        let sink = ResultSink::new(config.scans_dir());
        let specs = battery(refused_status);
        let orchestrator = ScanOrchestrator::with_registry(&config, &cache, &sink, &specs);

        let report = orchestrator
            .scan_domain("example.com", &ScanOptions { use_tls: true, ..Default::default() })
            .await
            .unwrap();

        // Host checks are all present.
        assert!(report.checks.contains_key("ip"));
        assert!(report.checks.contains_key("whois"));
        // The liveness failure is recorded, everything after it is absent.
        assert!(report.checks[LIVENESS_CHECK]["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
        assert!(!report.checks.contains_key("http_headers"));
        assert!(!report.checks.contains_key("robotstxt"));
        // Short-circuiting is not a scan failure.
        assert_eq!(report.scan.status, "completed");
    }

    #[tokio::test]
    async fn check_filter_limits_execution() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let cache = FileCacheStore::new(config.cache_dir());
        let sink = ResultSink::new(config.scans_dir());
        let specs = battery(ok_status);
        let orchestrator = ScanOrchestrator::with_registry(&config, &cache, &sink, &specs);

        let opts = ScanOptions {
            use_tls: true,
            checks: Some(vec!["ip".to_string()]),
            ..Default::default()
        };
        let report = orchestrator.scan_domain("example.com", &opts).await.unwrap();

        assert!(report.checks.contains_key("ip"));
        assert_eq!(report.checks.len(), 1);
    }

    #[tokio::test]
    async fn input_is_normalized_to_bare_domain() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let cache = FileCacheStore::new(config.cache_dir());
        let sink = ResultSink::new(config.scans_dir());
        let specs = battery(ok_status);
        let orchestrator = ScanOrchestrator::with_registry(&config, &cache, &sink, &specs);

        let report = orchestrator
            .scan_domain(
                "https://example.com/some/path",
                &ScanOptions { use_tls: true, ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(report.domain, "example.com");
        assert_eq!(report.url, "https://example.com");

        let saved = config.scans_dir().join("example.com/scan_result.json");
        assert!(saved.exists());
    }

    #[tokio::test]
    async fn no_tls_builds_plain_http_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let cache = FileCacheStore::new(config.cache_dir());
        let sink = ResultSink::new(config.scans_dir());
        let specs = battery(ok_status);
        let orchestrator = ScanOrchestrator::with_registry(&config, &cache, &sink, &specs);

        let report = orchestrator
            .scan_domain("example.com", &ScanOptions::default())
            .await
            .unwrap();
        assert_eq!(report.url, "http://example.com");
    }

    #[test]
    fn normalize_strips_scheme_and_path() {
        assert_eq!(normalize_domain("example.com"), "example.com");
        assert_eq!(normalize_domain("https://example.com"), "example.com");
        assert_eq!(normalize_domain("http://example.com/a/b?c=d"), "example.com");
    }
}

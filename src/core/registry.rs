// src/core/registry.rs

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::core::checks;
use crate::core::content::RequestCache;
use crate::core::error::CheckError;

/// The distinguished liveness check. When it fails, the orchestrator
/// short-circuits every remaining target-scoped check.
pub const LIVENESS_CHECK: &str = "status";

/// What a check operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckScope {
    /// Bare domain name, e.g. `example.com`.
    Host,
    /// Fully qualified URL, e.g. `https://example.com`.
    Target,
}

/// Input handed to every check handler.
#[derive(Clone)]
pub struct CheckRequest {
    /// Bare domain for host-scoped checks, full URL for target-scoped ones.
    pub target: String,
    /// Per-scan request cache shared by the target-scoped checks.
    pub http: Arc<RequestCache>,
    /// Root of the data directory, for checks that persist artifacts.
    pub data_dir: PathBuf,
}

pub type CheckFuture = Pin<Box<dyn Future<Output = Result<Value, CheckError>> + Send>>;

/// A check handler: takes the request, returns JSON-serializable output or
/// a descriptive error. May suspend internally; the invoker always awaits
/// it to completion before moving on.
pub type CheckHandler = fn(CheckRequest) -> CheckFuture;

/// One registered check.
pub struct CheckSpec {
    pub name: &'static str,
    pub scope: CheckScope,
    pub handler: CheckHandler,
    /// Overrides the configured default cache TTL for this check.
    pub ttl_override: Option<Duration>,
}

/// The full check battery, in execution order, partitioned by scope.
///
/// A static registry resolved once at startup; dispatch stays name-based
/// (the `--checks` filter matches on these names) but every handler is
/// bound at compile time.
pub static CHECK_REGISTRY: Lazy<Vec<CheckSpec>> = Lazy::new(|| {
    vec![
        // Host-scoped checks, run first against the bare domain.
        check("ip", CheckScope::Host, |req| {
            Box::pin(checks::host::ip(req))
        }),
        check("dns", CheckScope::Host, |req| {
            Box::pin(checks::dns::dns_records(req))
        }),
        check("mx", CheckScope::Host, |req| {
            Box::pin(checks::host::mail_config(req))
        }),
        check("whois", CheckScope::Host, |req| {
            Box::pin(checks::host::whois(req))
        }),
        // Target-scoped checks, run against the full URL. `status` comes
        // first so an unreachable target skips the rest of the phase.
        CheckSpec {
            name: LIVENESS_CHECK,
            scope: CheckScope::Target,
            handler: |req| Box::pin(checks::http::status(req)),
            // Liveness goes stale much faster than the rest of the battery.
            ttl_override: Some(Duration::from_secs(60 * 60)),
        },
        check("content", CheckScope::Target, |req| {
            Box::pin(checks::http::content(req))
        }),
        check("http_headers", CheckScope::Target, |req| {
            Box::pin(checks::http::http_headers(req))
        }),
        check("http_security", CheckScope::Target, |req| {
            Box::pin(checks::http::http_security(req))
        }),
        check("ssl", CheckScope::Target, |req| {
            Box::pin(checks::tls::ssl(req))
        }),
        check("hsts", CheckScope::Target, |req| {
            Box::pin(checks::http::hsts(req))
        }),
        check("redirects", CheckScope::Target, |req| {
            Box::pin(checks::http::redirects(req))
        }),
        check("robotstxt", CheckScope::Target, |req| {
            Box::pin(checks::http::robotstxt(req))
        }),
        check("securitytxt", CheckScope::Target, |req| {
            Box::pin(checks::http::securitytxt(req))
        }),
        check("social_tags", CheckScope::Target, |req| {
            Box::pin(checks::http::social_tags(req))
        }),
        check("page", CheckScope::Target, |req| {
            Box::pin(checks::page::page(req))
        }),
    ]
});

fn check(name: &'static str, scope: CheckScope, handler: CheckHandler) -> CheckSpec {
    CheckSpec {
        name,
        scope,
        handler,
        ttl_override: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn checks_in_scope(scope: CheckScope) -> impl Iterator<Item = &'static CheckSpec> {
        CHECK_REGISTRY.iter().filter(move |c| c.scope == scope)
    }

    #[test]
    fn check_names_are_unique() {
        let mut seen = HashSet::new();
        for spec in CHECK_REGISTRY.iter() {
            assert!(seen.insert(spec.name), "duplicate check name {}", spec.name);
        }
    }

    #[test]
    fn liveness_check_runs_first_in_target_phase() {
        let first = checks_in_scope(CheckScope::Target).next().unwrap();
        assert_eq!(first.name, LIVENESS_CHECK);
    }

    #[test]
    fn host_checks_precede_target_checks() {
        let last_host = CHECK_REGISTRY
            .iter()
            .rposition(|c| c.scope == CheckScope::Host)
            .unwrap();
        let first_target = CHECK_REGISTRY
            .iter()
            .position(|c| c.scope == CheckScope::Target)
            .unwrap();
        assert!(last_host < first_target);
    }
}

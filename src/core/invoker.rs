// src/core/invoker.rs

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::core::cache::{cache_key, CacheEnvelope, FileCacheStore};
use crate::core::error::CheckError;
use crate::core::registry::{CheckRequest, CheckSpec};

/// Wraps check execution with CacheStore-backed memoization.
///
/// On a hit within the TTL the handler is never invoked, so none of its
/// side effects (network calls, sockets, artifact writes) occur. On a miss
/// the handler is awaited to completion, its result wrapped in a
/// `{data, timestamp}` envelope and written back with the same key.
/// Handler failures propagate untouched and are never cached.
pub struct MemoizedInvoker<'a> {
    cache: &'a FileCacheStore,
}

impl<'a> MemoizedInvoker<'a> {
    pub fn new(cache: &'a FileCacheStore) -> Self {
        Self { cache }
    }

    /// Runs `spec` for `domain`, consulting the cache first.
    ///
    /// `ttl` is the scan-level default; a zero `ttl` is force-refresh mode
    /// and wins over any per-check override.
    pub async fn invoke(
        &self,
        domain: &str,
        spec: &CheckSpec,
        request: CheckRequest,
        ttl: Duration,
    ) -> Result<Value, CheckError> {
        let key = cache_key(domain, spec.name);
        let effective_ttl = if ttl.is_zero() {
            Duration::ZERO
        } else {
            spec.ttl_override.unwrap_or(ttl)
        };

        if let Some(envelope) = self.cache.read(&key, effective_ttl) {
            info!(check = spec.name, key, "Cache hit, skipping check execution.");
            return Ok(envelope.data);
        }

        debug!(check = spec.name, target = %request.target, "Cache miss, executing check.");
        let result = (spec.handler)(request).await?;

        self.cache.write(&key, &CacheEnvelope::now(result.clone()));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::content::RequestCache;
    use crate::core::registry::{CheckFuture, CheckScope};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static COUNTING_CALLS: AtomicUsize = AtomicUsize::new(0);
    static FAILING_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_handler(_req: CheckRequest) -> CheckFuture {
        Box::pin(async {
            let n = COUNTING_CALLS.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "invocation": n }))
        })
    }

    fn failing_handler(_req: CheckRequest) -> CheckFuture {
        Box::pin(async {
            FAILING_CALLS.fetch_add(1, Ordering::SeqCst);
            Err(CheckError::failed("connection refused"))
        })
    }

    fn spec(name: &'static str, handler: fn(CheckRequest) -> CheckFuture) -> CheckSpec {
        CheckSpec {
            name,
            scope: CheckScope::Host,
            handler,
            ttl_override: None,
        }
    }

    fn request() -> CheckRequest {
        CheckRequest {
            target: "example.com".to_string(),
            http: Arc::new(RequestCache::new("webcheck-test").unwrap()),
            data_dir: PathBuf::from("."),
        }
    }

    #[tokio::test]
    async fn second_invocation_within_ttl_returns_cached_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCacheStore::new(dir.path());
        let invoker = MemoizedInvoker::new(&cache);
        let spec = spec("counting", counting_handler);
        let ttl = Duration::from_secs(60);

        COUNTING_CALLS.store(0, Ordering::SeqCst);
        let first = invoker
            .invoke("example.com", &spec, request(), ttl)
            .await
            .unwrap();
        let second = invoker
            .invoke("example.com", &spec, request(), ttl)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(COUNTING_CALLS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_ttl_reexecutes_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCacheStore::new(dir.path());
        let invoker = MemoizedInvoker::new(&cache);
        let spec = spec("counting_forced", counting_handler);

        COUNTING_CALLS.store(0, Ordering::SeqCst);
        let before = COUNTING_CALLS.load(Ordering::SeqCst);
        invoker
            .invoke("example.com", &spec, request(), Duration::ZERO)
            .await
            .unwrap();
        invoker
            .invoke("example.com", &spec, request(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(COUNTING_CALLS.load(Ordering::SeqCst), before + 2);
    }

    #[tokio::test]
    async fn zero_ttl_wins_over_per_check_override() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCacheStore::new(dir.path());
        let invoker = MemoizedInvoker::new(&cache);
        let mut spec = spec("counting_override", counting_handler);
        spec.ttl_override = Some(Duration::from_secs(3600));

        COUNTING_CALLS.store(0, Ordering::SeqCst);
        let before = COUNTING_CALLS.load(Ordering::SeqCst);
        invoker
            .invoke("example.com", &spec, request(), Duration::ZERO)
            .await
            .unwrap();
        invoker
            .invoke("example.com", &spec, request(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(COUNTING_CALLS.load(Ordering::SeqCst), before + 2);
    }

    #[tokio::test]
    async fn failures_propagate_and_are_never_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCacheStore::new(dir.path());
        let invoker = MemoizedInvoker::new(&cache);
        let spec = spec("failing", failing_handler);
        let ttl = Duration::from_secs(60);

        FAILING_CALLS.store(0, Ordering::SeqCst);
        for _ in 0..2 {
            let err = invoker
                .invoke("example.com", &spec, request(), ttl)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("connection refused"));
        }
        // Both attempts reached the handler: the failure was not memoized.
        assert_eq!(FAILING_CALLS.load(Ordering::SeqCst), 2);
        assert!(cache.read("com/example/failing", ttl).is_none());
    }
}

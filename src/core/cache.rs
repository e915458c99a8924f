// src/core/cache.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Reverses a domain's labels into a path, so related domains cluster
/// under a common prefix: `example.com` -> `com/example`.
pub fn reverse_domain_path(domain: &str) -> String {
    let mut parts: Vec<&str> = domain.split('.').collect();
    parts.reverse();
    parts.join("/")
}

/// Cache key for a `(domain, check)` pair: reversed-domain path plus the
/// check name, e.g. `com/example/dns`.
pub fn cache_key(domain: &str, check_name: &str) -> String {
    format!("{}/{}", reverse_domain_path(domain), check_name)
}

/// On-disk wrapper around a memoized check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub data: Value,
    /// Seconds since the Unix epoch at the time the result was produced.
    pub timestamp: f64,
}

impl CacheEnvelope {
    pub fn now(data: Value) -> Self {
        Self {
            data,
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }

    fn age(&self) -> Duration {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        Duration::from_secs_f64((now - self.timestamp).max(0.0))
    }
}

/// File-backed key/value store with lazy per-entry TTL expiry.
///
/// Entries live under `<root>/<key>.cache` and are only ever overwritten
/// wholesale. Expiry is checked on read; nothing sweeps the directory.
/// Every I/O failure is fail-open: a read error is a miss, a write error
/// is logged and swallowed, since the cache is an optimization and must
/// never abort the check that consults it.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.cache"))
    }

    /// Returns the stored envelope if present and younger than `ttl`.
    ///
    /// A `ttl` of zero disables caching for this read and always misses.
    pub fn read(&self, key: &str, ttl: Duration) -> Option<CacheEnvelope> {
        if ttl.is_zero() {
            return None;
        }
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache entry, treating as miss.");
                return None;
            }
        };
        let envelope: CacheEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key, error = %e, "Malformed cache entry, treating as miss.");
                return None;
            }
        };
        if envelope.age() >= ttl {
            debug!(key, "Cache entry expired.");
            return None;
        }
        debug!(key, "Cache hit.");
        Some(envelope)
    }

    /// Unconditionally overwrites the entry for `key`, creating parent
    /// directories as needed. Failures are logged and swallowed.
    pub fn write(&self, key: &str, envelope: &CacheEnvelope) {
        let path = self.entry_path(key);
        if let Err(e) = self.try_write(&path, envelope) {
            warn!(key, error = %e, "Failed to write cache entry, continuing without.");
        }
    }

    fn try_write(&self, path: &Path, envelope: &CacheEnvelope) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(envelope)?;
        fs::write(path, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, FileCacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn reverses_domain_labels() {
        assert_eq!(reverse_domain_path("example.com"), "com/example");
        assert_eq!(reverse_domain_path("a.b.example.org"), "org/example/b/a");
        assert_eq!(cache_key("example.com", "dns"), "com/example/dns");
    }

    #[test]
    fn read_returns_fresh_entry() {
        let (_dir, store) = store();
        let envelope = CacheEnvelope::now(json!({"answer": 42}));
        store.write("com/example/dns", &envelope);

        let hit = store
            .read("com/example/dns", Duration::from_secs(60))
            .expect("fresh entry should hit");
        assert_eq!(hit.data, json!({"answer": 42}));
    }

    #[test]
    fn read_misses_on_expired_entry() {
        let (_dir, store) = store();
        let stale = CacheEnvelope {
            data: json!("old"),
            timestamp: (Utc::now().timestamp_millis() as f64 / 1000.0) - 120.0,
        };
        store.write("com/example/whois", &stale);

        assert!(store.read("com/example/whois", Duration::from_secs(60)).is_none());
    }

    #[test]
    fn zero_ttl_disables_the_read() {
        let (_dir, store) = store();
        store.write("com/example/ip", &CacheEnvelope::now(json!("1.2.3.4")));
        assert!(store.read("com/example/ip", Duration::ZERO).is_none());
    }

    #[test]
    fn missing_and_corrupt_entries_are_misses() {
        let (dir, store) = store();
        assert!(store.read("com/example/mx", Duration::from_secs(60)).is_none());

        let path = dir.path().join("com/example/mx.cache");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();
        assert!(store.read("com/example/mx", Duration::from_secs(60)).is_none());
    }

    #[test]
    fn write_overwrites_wholesale() {
        let (_dir, store) = store();
        store.write("com/example/dns", &CacheEnvelope::now(json!("first")));
        store.write("com/example/dns", &CacheEnvelope::now(json!("second")));

        let hit = store.read("com/example/dns", Duration::from_secs(60)).unwrap();
        assert_eq!(hit.data, json!("second"));
    }
}

// src/config.rs

use std::path::PathBuf;
use std::time::Duration;

use strum::{Display, EnumString};

use crate::logging::get_data_dir;

/// Default TTL for memoized check results: 7 days.
const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60 * 24 * 7;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:146.0) Gecko/20100101 Firefox/146.0";

/// Which `JobQueue` implementation backs the crawl frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum QueueEngine {
    /// Ephemeral in-process queue, single worker.
    Memory,
    /// Durable SQLite-backed queue shared between worker processes.
    Sqlite,
}

/// Runtime configuration, resolved once at startup from the environment.
///
/// An explicit value passed down to the components that need it; nothing
/// reads the environment after this point.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub user_agent: String,
    pub cache_ttl: Duration,
    pub queue_engine: QueueEngine,
    pub queue_db_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("WEBCHECK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| get_data_dir());

        let user_agent = std::env::var("WEBCHECK_USER_AGENT")
            .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        let cache_ttl = std::env::var("WEBCHECK_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_CACHE_TTL_SECS));

        let queue_engine = std::env::var("WEBCHECK_QUEUE_ENGINE")
            .ok()
            .and_then(|v| v.parse::<QueueEngine>().ok())
            .unwrap_or(QueueEngine::Memory);

        let queue_db_path = std::env::var("WEBCHECK_QUEUE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("queue.db"));

        Self {
            data_dir,
            user_agent,
            cache_ttl,
            queue_engine,
            queue_db_path,
        }
    }

    /// Directory where per-domain scan artifacts are written.
    pub fn scans_dir(&self) -> PathBuf {
        self.data_dir.join("webcheck")
    }

    /// Directory backing the check result cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

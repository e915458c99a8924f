// src/core/content.rs

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::core::error::CheckError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One fetched URL: status, lowercased headers, body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Request-level fetch cache scoped to a single scan.
///
/// Several target-scoped checks inspect the same index page; memoizing the
/// fetch keeps the scan at one request per URL. The orchestrator owns one
/// instance per run and clears it on completion, so unrelated scans never
/// observe each other's entries. Failed fetches are not cached.
pub struct RequestCache {
    client: reqwest::Client,
    entries: Mutex<HashMap<String, FetchedPage>>,
}

impl RequestCache {
    pub fn new(user_agent: &str) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Fetches `url`, memoizing the response for the rest of the scan.
    pub async fn get(&self, url: &str) -> Result<FetchedPage, CheckError> {
        {
            let entries = self.entries.lock().await;
            if let Some(page) = entries.get(url) {
                debug!(url, "Request cache hit.");
                return Ok(page.clone());
            }
        }

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_lowercase(),
                    v.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();
        let body = response.text().await?;

        let page = FetchedPage {
            status,
            headers,
            body,
        };
        self.entries
            .lock()
            .await
            .insert(url.to_string(), page.clone());
        debug!(url, status, "Fetched and cached URL content.");
        Ok(page)
    }

    /// Drops every memoized fetch. Called by the orchestrator at the end
    /// of each scan.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        debug!("Cleared request cache.");
    }
}

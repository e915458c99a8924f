// src/core/checks/http.rs

use std::path::PathBuf;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::error::CheckError;
use crate::core::registry::CheckRequest;

/// HSTS preload requires a max-age of at least 18 weeks.
const HSTS_MIN_MAX_AGE: u64 = 10_886_400;

const MAX_REDIRECT_HOPS: usize = 10;

/// The `status` liveness check: fetches the target URL and reports
/// reachability. Fails (and thereby short-circuits the remaining
/// target-scoped checks) when the target is unreachable or responds with
/// a non-success code.
pub async fn status(req: CheckRequest) -> Result<Value, CheckError> {
    let url = req.target;
    let started = Instant::now();
    let page = req
        .http
        .get(&url)
        .await
        .map_err(|e| CheckError::failed(format!("Target unreachable: {e}")))?;
    let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

    if !(200..400).contains(&page.status) {
        return Err(CheckError::failed(format!(
            "Received non-success response code: {}",
            page.status
        )));
    }

    info!(url, code = page.status, "Target is up.");
    Ok(json!({
        "url": url,
        "isUp": true,
        "responseCode": page.status,
        "responseTime": response_time_ms,
        "responseSize": page.body.len(),
    }))
}

/// The `content` check: fetches the index page and persists the body as a
/// per-domain artifact.
pub async fn content(req: CheckRequest) -> Result<Value, CheckError> {
    let url = req.target.clone();
    let page = req.http.get(&url).await?;

    let hostname = Url::parse(&url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .ok_or_else(|| CheckError::failed(format!("Cannot extract hostname from {url}")))?;

    let file: PathBuf = req
        .data_dir
        .join("webcheck")
        .join(&hostname)
        .join("content.txt");
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&file, &page.body)?;
    debug!(url, file = %file.display(), "Persisted page content.");

    Ok(json!({
        "url": url,
        "status_code": page.status,
        "headers": page.headers,
        "content_length": page.body.len(),
        "file": file.to_string_lossy(),
    }))
}

/// The `http_headers` check: returns every response header, lowercased.
pub async fn http_headers(req: CheckRequest) -> Result<Value, CheckError> {
    let page = req.http.get(&req.target).await?;
    Ok(json!(page.headers))
}

/// The `http_security` check: presence flags for the standard security
/// headers.
pub async fn http_security(req: CheckRequest) -> Result<Value, CheckError> {
    let page = req.http.get(&req.target).await?;
    let has = |name: &str| page.headers.contains_key(name);
    Ok(json!({
        "strictTransportPolicy": has("strict-transport-security"),
        "xFrameOptions": has("x-frame-options"),
        "xContentTypeOptions": has("x-content-type-options"),
        "xXSSProtection": has("x-xss-protection"),
        "contentSecurityPolicy": has("content-security-policy"),
    }))
}

static MAX_AGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"max-age=(\d+)").expect("static regex"));

/// The `hsts` check: evaluates the Strict-Transport-Security header
/// against the preload-list requirements.
pub async fn hsts(req: CheckRequest) -> Result<Value, CheckError> {
    let page = req.http.get(&req.target).await?;
    let Some(header) = page.headers.get("strict-transport-security") else {
        return Ok(hsts_verdict("Site does not serve any HSTS headers.", false, None));
    };

    let max_age = MAX_AGE
        .captures(header)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok());
    let includes_sub_domains = header.contains("includeSubDomains");
    let preload = header.contains("preload");

    let verdict = match max_age {
        Some(age) if age >= HSTS_MIN_MAX_AGE => {
            if !includes_sub_domains {
                hsts_verdict(
                    "HSTS header does not include all subdomains.",
                    false,
                    Some(header),
                )
            } else if !preload {
                hsts_verdict(
                    "HSTS header does not contain the preload directive.",
                    false,
                    Some(header),
                )
            } else {
                hsts_verdict(
                    "Site is compatible with the HSTS preload list!",
                    true,
                    Some(header),
                )
            }
        }
        _ => hsts_verdict(
            "HSTS max-age is less than 10886400.",
            false,
            Some(header),
        ),
    };
    Ok(verdict)
}

fn hsts_verdict(message: &str, compatible: bool, header: Option<&str>) -> Value {
    json!({
        "message": message,
        "compatible": compatible,
        "hstsHeader": header,
    })
}

/// The `redirects` check: follows the Location chain manually (up to
/// [`MAX_REDIRECT_HOPS`]) and reports every hop.
pub async fn redirects(req: CheckRequest) -> Result<Value, CheckError> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut trail = vec![req.target.clone()];
    let mut current = Url::parse(&req.target)
        .map_err(|e| CheckError::failed(format!("Invalid URL {}: {e}", req.target)))?;

    for _ in 0..MAX_REDIRECT_HOPS {
        let response = client.get(current.clone()).send().await?;
        if !response.status().is_redirection() {
            break;
        }
        let Some(location) = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            break;
        };
        current = current
            .join(location)
            .map_err(|e| CheckError::failed(format!("Invalid redirect location {location}: {e}")))?;
        trail.push(current.to_string());
    }

    Ok(json!({
        "url": req.target,
        "redirects": trail,
        "count": trail.len() - 1,
    }))
}

/// The `robotstxt` check: fetches and parses `/robots.txt`.
pub async fn robotstxt(req: CheckRequest) -> Result<Value, CheckError> {
    let robots_url = join_path(&req.target, "/robots.txt")?;
    let page = req.http.get(&robots_url).await?;
    if page.status == 404 {
        return Ok(json!({ "found": false, "url": robots_url }));
    }

    let mut rules = Vec::new();
    let mut sitemaps = Vec::new();
    for line in page.body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();
        match field.as_str() {
            "sitemap" => sitemaps.push(value.to_string()),
            "user-agent" | "allow" | "disallow" | "crawl-delay" => {
                rules.push(json!({ "lvl": field, "val": value }));
            }
            _ => {}
        }
    }

    Ok(json!({
        "found": true,
        "url": robots_url,
        "rules": rules,
        "sitemaps": sitemaps,
    }))
}

/// The `securitytxt` check: probes the well-known locations for
/// `security.txt` and parses its fields.
pub async fn securitytxt(req: CheckRequest) -> Result<Value, CheckError> {
    for path in ["/.well-known/security.txt", "/security.txt"] {
        let candidate = join_path(&req.target, path)?;
        let page = match req.http.get(&candidate).await {
            Ok(page) => page,
            Err(e) => {
                debug!(url = candidate, error = %e, "security.txt probe failed.");
                continue;
            }
        };
        if page.status != 200 {
            continue;
        }

        let mut fields = Map::new();
        for line in page.body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((field, value)) = line.split_once(':') {
                fields.insert(
                    field.trim().to_string(),
                    Value::String(value.trim().to_string()),
                );
            }
        }
        return Ok(json!({
            "isPresent": true,
            "foundIn": path,
            "fields": fields,
        }));
    }

    Ok(json!({ "isPresent": false }))
}

/// The `social_tags` check: extracts title/description and the OpenGraph
/// and Twitter card metadata from the index page.
pub async fn social_tags(req: CheckRequest) -> Result<Value, CheckError> {
    let page = req.http.get(&req.target).await?;
    Ok(parse_social_tags(&page.body))
}

fn parse_social_tags(body: &str) -> Value {
    let document = Html::parse_document(body);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|t| t.text().collect::<String>().trim().to_string())
        });

    let mut meta = Map::new();
    if let Ok(sel) = Selector::parse("meta") {
        for element in document.select(&sel) {
            let name = element
                .value()
                .attr("name")
                .or_else(|| element.value().attr("property"));
            if let (Some(name), Some(content)) = (name, element.value().attr("content")) {
                meta.insert(
                    name.trim().to_lowercase(),
                    Value::String(content.trim().to_string()),
                );
            }
        }
    }

    let pick = |key: &str| meta.get(key).cloned().unwrap_or(Value::Null);
    json!({
        "title": title,
        "description": pick("description"),
        "keywords": pick("keywords"),
        "ogTitle": pick("og:title"),
        "ogDescription": pick("og:description"),
        "ogImage": pick("og:image"),
        "ogSiteName": pick("og:site_name"),
        "twitterCard": pick("twitter:card"),
        "twitterSite": pick("twitter:site"),
    })
}

fn join_path(base: &str, path: &str) -> Result<String, CheckError> {
    let base = Url::parse(base)
        .map_err(|e| CheckError::failed(format!("Invalid URL {base}: {e}")))?;
    base.join(path)
        .map(|u| u.to_string())
        .map_err(|e| {
            warn!(base = %base, path, error = %e, "Failed to join URL path.");
            CheckError::failed(format!("Invalid path {path}: {e}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn social_tags_parse_title_and_meta() {
        let html = r#"<html><head>
            <title> Example Site </title>
            <meta name="description" content="A test page">
            <meta property="og:title" content="Example OG">
            <meta property="og:image" content="https://example.com/img.png">
        </head><body></body></html>"#;

        let tags = parse_social_tags(html);
        assert_eq!(tags["title"], "Example Site");
        assert_eq!(tags["description"], "A test page");
        assert_eq!(tags["ogTitle"], "Example OG");
        assert_eq!(tags["twitterCard"], Value::Null);
    }

    #[test]
    fn join_path_resolves_against_root() {
        assert_eq!(
            join_path("https://example.com", "/robots.txt").unwrap(),
            "https://example.com/robots.txt"
        );
        assert!(join_path("not a url", "/robots.txt").is_err());
    }
}

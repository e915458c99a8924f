// src/core/checks/page.rs

use std::collections::BTreeSet;
use std::time::Instant;

use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use tracing::info;
use url::Url;

use crate::core::error::CheckError;
use crate::core::registry::CheckRequest;

/// The `page` check: fetches the index page and parses it into structured
/// page facts (title, meta, headings, links, resources).
///
/// `parsed.linkDomains` is the crawl expansion source: the crawl
/// controller reads it to discover linked domains.
pub async fn page(req: CheckRequest) -> Result<Value, CheckError> {
    let url = req.target.clone();
    let started = Instant::now();
    let fetched = req.http.get(&url).await?;
    let load_ms = started.elapsed().as_secs_f64() * 1000.0;

    if fetched.status >= 400 {
        return Err(CheckError::failed(format!(
            "Failed to load the page: status {}",
            fetched.status
        )));
    }

    let parsed = parse_page(&fetched.body, &url);
    info!(url, load_ms, "Page check finished.");

    Ok(json!({
        "status": "success",
        "url": url,
        "headers": fetched.headers,
        "pageLoadTimeMs": load_ms,
        "contentLength": fetched.body.len(),
        "parsed": parsed,
    }))
}

/// Parses an HTML document into the page facts used by the report and the
/// crawler. Pure function over the body, no I/O.
pub fn parse_page(body: &str, base_url: &str) -> Value {
    let document = Html::parse_document(body);
    let base = Url::parse(base_url).ok();

    let title = select_first_text(&document, "title");

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

    let mut headings = Map::new();
    for level in 1..=6 {
        let tag = format!("h{level}");
        let mut texts = Vec::new();
        if let Ok(sel) = Selector::parse(&tag) {
            for element in document.select(&sel) {
                let text = element.text().collect::<String>().trim().to_string();
                if !text.is_empty() {
                    texts.push(Value::String(text));
                }
            }
        }
        headings.insert(tag, Value::Array(texts));
    }

    let links = collect_urls(&document, "a[href]", "href", base.as_ref());
    let stylesheets = collect_urls(&document, r#"link[rel="stylesheet"][href]"#, "href", base.as_ref());
    let scripts = collect_urls(&document, "script[src]", "src", base.as_ref());
    let images = collect_urls(&document, "img[src]", "src", base.as_ref());

    let link_domains = extract_domains(&links);
    let resource_domains = {
        let mut all = Vec::new();
        all.extend(stylesheets.iter().cloned());
        all.extend(scripts.iter().cloned());
        all.extend(images.iter().cloned());
        extract_domains(&all)
    };

    json!({
        "title": title,
        "meta": meta,
        "headings": headings,
        "links": links,
        "stylesheets": stylesheets,
        "scripts": scripts,
        "images": images,
        "linkDomains": link_domains,
        "resourceDomains": resource_domains,
    })
}

fn select_first_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
}

/// Collects attribute URLs matched by `selector`, normalized against the
/// base URL, deduplicated, sorted.
fn collect_urls(document: &Html, selector: &str, attr: &str, base: Option<&Url>) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    for element in document.select(&sel) {
        let Some(raw) = element.value().attr(attr) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let normalized = match base {
            Some(base) => match base.join(raw) {
                Ok(url) => url.to_string(),
                Err(_) => continue,
            },
            None => raw.to_string(),
        };
        seen.insert(normalized);
    }
    seen.into_iter().collect()
}

/// Unique host names appearing in a list of absolute URLs, sorted.
fn extract_domains(urls: &[String]) -> Vec<String> {
    let mut domains = BTreeSet::new();
    for url in urls {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                domains.insert(host.to_string());
            }
        }
    }
    domains.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r##"<html><head>
        <title>Landing</title>
        <meta name="description" content="hello">
        <link rel="stylesheet" href="/style.css">
        <script src="https://cdn.example.net/app.js"></script>
    </head><body>
        <h1>Welcome</h1>
        <a href="/about">About</a>
        <a href="https://other.org/page">Other</a>
        <a href="https://other.org/page">Duplicate</a>
        <a href="#fragment">Skip me</a>
        <img src="logo.png" alt="logo">
    </body></html>"##;

    #[test]
    fn parses_title_headings_and_links() {
        let parsed = parse_page(HTML, "https://example.com/");
        assert_eq!(parsed["title"], "Landing");
        assert_eq!(parsed["meta"]["description"], "hello");
        assert_eq!(parsed["headings"]["h1"][0], "Welcome");

        let links: Vec<String> = parsed["links"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert!(links.contains(&"https://example.com/about".to_string()));
        assert!(links.contains(&"https://other.org/page".to_string()));
        // Duplicates and bare fragments are dropped.
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn link_domains_cover_linked_hosts() {
        let parsed = parse_page(HTML, "https://example.com/");
        let domains: Vec<&str> = parsed["linkDomains"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(domains, vec!["example.com", "other.org"]);
    }

    #[test]
    fn resource_domains_cover_scripts_and_images() {
        let parsed = parse_page(HTML, "https://example.com/");
        let domains: Vec<&str> = parsed["resourceDomains"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(domains, vec!["cdn.example.net", "example.com"]);
    }
}

// src/core/checks/host.rs

use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::core::error::CheckError;
use crate::core::registry::CheckRequest;

const WHOIS_SERVER: &str = "whois.internic.net:43";
const WHOIS_TIMEOUT: Duration = Duration::from_secs(30);

/// The `ip` check: resolves the domain to its addresses.
pub async fn ip(req: CheckRequest) -> Result<Value, CheckError> {
    let domain = req.target;
    let addrs: Vec<String> = tokio::net::lookup_host((domain.as_str(), 443))
        .await
        .map_err(|_| CheckError::failed(format!("Unable to resolve domain: {domain}")))?
        .map(|addr| addr.ip().to_string())
        .collect();

    let first = addrs
        .first()
        .cloned()
        .ok_or_else(|| CheckError::failed(format!("Unable to resolve domain: {domain}")))?;

    Ok(json!({
        "domain": domain,
        "ip_address": first,
        "addresses": addrs,
    }))
}

/// The `mx` check: mail configuration. Collects MX records plus the SPF
/// and DMARC TXT policies for the domain.
pub async fn mail_config(req: CheckRequest) -> Result<Value, CheckError> {
    let domain = req.target;
    let root = domain.strip_prefix("www.").unwrap_or(&domain);
    info!(target = %root, "Starting mail configuration check.");

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let mx_records: Vec<String> = match resolver.mx_lookup(root).await {
        Ok(lookup) => lookup.iter().map(|mx| mx.to_string()).collect(),
        Err(e) => {
            debug!(target = %root, error = %e, "MX lookup failed.");
            Vec::new()
        }
    };

    let spf = lookup_spf(&resolver, root).await;
    let dmarc = lookup_dmarc(&resolver, root).await;

    Ok(json!({
        "domain": root,
        "mx": mx_records,
        "spf": spf,
        "dmarc": dmarc,
    }))
}

async fn lookup_spf(resolver: &TokioAsyncResolver, domain: &str) -> Value {
    match resolver.txt_lookup(domain).await {
        Ok(txt_records) => {
            for record in txt_records.iter() {
                let record = record.to_string();
                if record.starts_with("v=spf1") {
                    return json!({ "found": true, "record": record });
                }
            }
            json!({ "found": false, "error": "No SPF TXT record found." })
        }
        Err(e) => json!({ "found": false, "error": format!("DNS Error: {e}") }),
    }
}

async fn lookup_dmarc(resolver: &TokioAsyncResolver, domain: &str) -> Value {
    let dmarc_name = format!("_dmarc.{domain}");
    match resolver.txt_lookup(dmarc_name).await {
        Ok(txt_records) => {
            if let Some(record) = txt_records.iter().next() {
                let record = record.to_string();
                let policy = record
                    .split(';')
                    .find(|s| s.trim().starts_with("p="))
                    .and_then(|s| s.trim().split('=').nth(1))
                    .map(|s| s.to_string());
                json!({ "found": true, "record": record, "policy": policy })
            } else {
                json!({ "found": false, "error": "No DMARC record found." })
            }
        }
        Err(e) => json!({ "found": false, "error": format!("DNS Error: {e}") }),
    }
}

/// The `whois` check: queries the internic WHOIS service for the domain's
/// registrable part and parses the response into key/value pairs.
pub async fn whois(req: CheckRequest) -> Result<Value, CheckError> {
    let base = base_domain(&req.target);
    info!(target = %base, "Starting WHOIS check.");

    let raw = tokio::time::timeout(WHOIS_TIMEOUT, fetch_whois(&base))
        .await
        .map_err(|_| CheckError::failed("WHOIS query timed out"))??;

    if raw.contains("No match for") {
        return Err(CheckError::failed(
            "No matches found for domain in internic database",
        ));
    }

    Ok(Value::Object(parse_whois_data(&raw)))
}

async fn fetch_whois(domain: &str) -> Result<String, CheckError> {
    let mut stream = TcpStream::connect(WHOIS_SERVER).await?;
    stream.write_all(format!("{domain}\r\n").as_bytes()).await?;
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await?;
    Ok(raw)
}

/// Registrable part of a host name: the last two labels.
fn base_domain(domain: &str) -> String {
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        domain.to_string()
    }
}

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("static regex"));

fn parse_whois_data(raw: &str) -> Map<String, Value> {
    let mut parsed = Map::new();
    let mut last_key = String::new();

    for line in raw.lines() {
        let Some(index) = line.find(':') else {
            // Continuation of the previous field.
            if !last_key.is_empty() {
                if let Some(Value::String(existing)) = parsed.get_mut(&last_key) {
                    existing.push(' ');
                    existing.push_str(line.trim());
                }
            }
            continue;
        };

        let key = line[..index].trim();
        let value = line[index + 1..].trim();
        if value.is_empty() {
            continue;
        }

        let key = NON_WORD.replace_all(key, "_").to_string();
        last_key = key.clone();
        parsed.insert(key, Value::String(value.to_string()));
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_domain_keeps_last_two_labels() {
        assert_eq!(base_domain("www.example.com"), "example.com");
        assert_eq!(base_domain("example.com"), "example.com");
        assert_eq!(base_domain("localhost"), "localhost");
    }

    #[test]
    fn whois_response_parses_into_fields() {
        let raw = "   Domain Name: EXAMPLE.COM\r\n\
                   Registrar: RESERVED-Internet Assigned Numbers Authority\r\n\
                   Name Server: A.IANA-SERVERS.NET\r\n\
                   >>> Last update of whois database <<<\r\n";
        let parsed = parse_whois_data(raw);
        assert_eq!(
            parsed.get("Domain_Name"),
            Some(&Value::String("EXAMPLE.COM".to_string()))
        );
        assert!(parsed.contains_key("Name_Server"));
    }

    #[test]
    fn empty_values_are_skipped() {
        let parsed = parse_whois_data("Registrar:\r\nDomain Name: X.COM\r\n");
        assert!(!parsed.contains_key("Registrar"));
        assert_eq!(parsed.len(), 1);
    }
}

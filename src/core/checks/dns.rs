// src/core/checks/dns.rs

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::core::error::CheckError;
use crate::core::registry::CheckRequest;

const COMMON_RECORD_TYPES: [RecordType; 8] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::MX,
    RecordType::NS,
    RecordType::TXT,
    RecordType::CNAME,
    RecordType::SOA,
    RecordType::SRV,
];

/// The `dns` check: queries the common record types for the domain and
/// returns `{ "A": [...], "MX": [...], ... }`. Types with no answer (or a
/// per-type lookup failure) are omitted rather than failing the check.
pub async fn dns_records(req: CheckRequest) -> Result<Value, CheckError> {
    let domain = req.target;
    info!(target = %domain, "Starting DNS records check.");

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let mut records = Map::new();
    for rtype in COMMON_RECORD_TYPES {
        match resolver.lookup(domain.as_str(), rtype).await {
            Ok(lookup) => {
                let values: Vec<Value> = lookup
                    .iter()
                    .map(|rdata| Value::String(rdata.to_string()))
                    .collect();
                if !values.is_empty() {
                    records.insert(rtype.to_string(), Value::Array(values));
                }
            }
            Err(e) => {
                debug!(target = %domain, record_type = %rtype, error = %e, "Lookup failed, skipping type.");
            }
        }
    }

    info!(target = %domain, types = records.len(), "DNS records check finished.");
    Ok(json!(records))
}

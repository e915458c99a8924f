// src/core/checks/tls.rs

use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use serde_json::{json, Value};
use std::net::TcpStream;
use tokio::task::spawn_blocking;
use tracing::info;
use url::Url;
use x509_parser::prelude::*;

use crate::core::error::CheckError;
use crate::core::registry::CheckRequest;

/// The `ssl` check: performs a TLS handshake against port 443, parses the
/// peer certificate and reports its validity window.
///
/// The handshake uses blocking sockets, so the whole check runs on the
/// blocking pool.
pub async fn ssl(req: CheckRequest) -> Result<Value, CheckError> {
    let host = Url::parse(&req.target)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| req.target.clone());
    info!(target = %host, "Starting SSL certificate check.");

    spawn_blocking(move || inspect_certificate(&host))
        .await
        .map_err(|e| CheckError::failed(format!("SSL check task panicked: {e}")))?
}

fn inspect_certificate(host: &str) -> Result<Value, CheckError> {
    let connector = TlsConnector::new()
        .map_err(|e| CheckError::failed(format!("TlsConnector Error: {e}")))?;
    let stream = TcpStream::connect((host, 443))
        .map_err(|e| CheckError::failed(format!("TCP Connection Error: {e}")))?;
    let stream = connector
        .connect(host, stream)
        .map_err(|e| CheckError::failed(format!("TLS Handshake Error: {e}")))?;

    let cert = stream
        .peer_certificate()
        .map_err(|e| CheckError::failed(format!("Certificate Error: {e}")))?
        .ok_or_else(|| CheckError::failed("Server did not provide a certificate."))?;
    let cert_der = cert
        .to_der()
        .map_err(|_| CheckError::failed("Could not convert certificate to DER format."))?;

    let (_, x509) = parse_x509_certificate(&cert_der)
        .map_err(|e| CheckError::failed(format!("X.509 Certificate Parse Error: {e}")))?;

    let validity = x509.validity();
    let not_before = asn1_time_to_chrono_utc(&validity.not_before);
    let not_after = asn1_time_to_chrono_utc(&validity.not_after);
    let now = Utc::now();
    let days_until_expiry = not_after.signed_duration_since(now).num_days();
    let is_valid = now > not_before && now < not_after;

    Ok(json!({
        "certificateFound": true,
        "isValid": is_valid,
        "subjectName": x509.subject().to_string(),
        "issuerName": x509.issuer().to_string(),
        "notBefore": not_before,
        "notAfter": not_after,
        "daysUntilExpiry": days_until_expiry,
    }))
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

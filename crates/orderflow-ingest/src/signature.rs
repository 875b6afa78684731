//! Webhook payload signature verification.
//!
//! The provider signs `{timestamp}.{raw_body}` with HMAC-SHA256 and sends
//! the result in a `Stripe-Signature` style header:
//! `t=<unix_ts>,v1=<hex_hmac>`. Staleness is checked before any digest
//! work so an attacker replaying an old capture learns nothing about the
//! secret from the rejection, and digest comparison is constant-time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default tolerance for the signature timestamp.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Why a signature header was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureRejection {
    /// The header is missing elements or carries a non-numeric timestamp.
    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),

    /// The signed timestamp is outside the tolerance window.
    #[error("Signature timestamp outside tolerance window")]
    StaleTimestamp,

    /// No candidate digest matched the expected signature.
    #[error("Signature verification failed")]
    BadSignature,
}

/// Parsed form of a `t=<ts>,v1=<hex>` header.
#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    /// Hex digests from every `v<N>=` element. The provider sends extra
    /// scheme versions during secret rotation; any one matching passes.
    digests: Vec<String>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, SignatureRejection> {
    let mut timestamp = None;
    let mut digests = Vec::new();

    for element in header.split(',') {
        let Some((key, value)) = element.trim().split_once('=') else {
            return Err(SignatureRejection::MalformedHeader(format!(
                "element without '=': {:?}",
                element.trim()
            )));
        };

        match key {
            "t" => {
                let parsed = value.parse::<i64>().map_err(|_| {
                    SignatureRejection::MalformedHeader("non-numeric timestamp".to_string())
                })?;
                timestamp = Some(parsed);
            }
            k if k.len() >= 2 && k.starts_with('v') && k[1..].chars().all(|c| c.is_ascii_digit()) => {
                digests.push(value.to_string());
            }
            // Unknown elements are ignored for forward compatibility.
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        SignatureRejection::MalformedHeader("missing timestamp element".to_string())
    })?;
    if digests.is_empty() {
        return Err(SignatureRejection::MalformedHeader(
            "missing signature element".to_string(),
        ));
    }

    Ok(SignatureHeader { timestamp, digests })
}

/// Compute the hex HMAC-SHA256 signature over `{timestamp}.{body}`.
pub fn compute_signature(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Verify a signature header against the raw request body.
///
/// Pure function of its inputs; `now` is passed in so tests control the
/// clock. Staleness is rejected before any digest comparison.
pub fn verify(
    body: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<(), SignatureRejection> {
    let parsed = parse_header(header)?;

    let age = (now.timestamp() - parsed.timestamp).unsigned_abs();
    if age > tolerance.as_secs() {
        return Err(SignatureRejection::StaleTimestamp);
    }

    let expected = compute_signature(secret, parsed.timestamp, body);
    let matched = parsed
        .digests
        .iter()
        .any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes()));

    if matched {
        Ok(())
    } else {
        Err(SignatureRejection::BadSignature)
    }
}

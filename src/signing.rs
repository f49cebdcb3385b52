//! Outbound webhook payload canonicalization and HMAC signing.
//!
//! The body is canonical JSON: UTF-8, sorted keys, no extra whitespace.
//! `serde_json` already emits compact separators and keeps object keys in
//! `BTreeMap` order, so serializing a `Value` built here is canonical as-is.
//! The signature covers `"<timestamp>.<body>"` so receivers can rebuild the
//! exact signed bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::types::Alert;

type HmacSha256 = Hmac<Sha256>;

pub fn canonical_payload(alert: &Alert) -> String {
    serde_json::json!({
        "alert_id": alert.id,
        "device_id": alert.device_id,
        "rule_id": alert.rule_id,
        "triggered_at": alert.triggered_at,
        "details": alert.details,
    })
    .to_string()
}

#[allow(clippy::expect_used)]
pub fn sign(secret: &str, timestamp: &str, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time signature check, for receivers reconstructing the body.
pub fn verify(secret: &str, timestamp: &str, body: &str, signature: &str) -> bool {
    let expected = sign(secret, timestamp, body);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

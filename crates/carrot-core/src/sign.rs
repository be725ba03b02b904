//! Canonical request signing.
//!
//! Every signed request carries the envelope fields (`api_key`, `game_id`,
//! `request_date`, `request_id`) merged with the call parameters, call
//! parameters winning key collisions. The signable payload renders each
//! `key=value` pair with string values verbatim and everything else
//! JSON-serialized, sorted by key, joined with `&`. No URL encoding here;
//! that is the transport's job.
//! The sign string is exactly four newline-joined lines:
//!
//! ```text
//! METHOD
//! HOST          (port stripped)
//! PATH
//! PAYLOAD
//! ```
//!
//! The HMAC-SHA256 of the sign string, keyed by the app secret, is base64
//! encoded and appended as the `sig` field. URL encoding of the transmitted
//! form is the transport's concern, never the signer's.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Reserved top-level parameter key carrying base64 image bytes through the
/// cache. Extracted before signing; never part of the signed set.
pub(crate) const IMAGE_BYTES_KEY: &str = "image_bytes";

/// Errors from building a signed field set.
#[derive(Debug, Error)]
#[non_exhaustive]
pub(crate) enum SignError {
    /// A parameter value could not be JSON-serialized.
    #[error("unserializable parameter value: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The HMAC key was rejected.
    #[error("invalid signing key: {0}")]
    Key(String),
}

/// Strips a `:port` suffix from a hostname. Only the bare host participates
/// in the sign string; the full `host:port` is still used for the URL.
pub(crate) fn strip_port(hostname: &str) -> &str {
    hostname.split(':').next().unwrap_or(hostname)
}

/// Merges the envelope fields with call parameters. Call parameters win key
/// collisions. The result iterates in ordinal key order.
pub(crate) fn merge_envelope(
    user_id: &str,
    app_id: &str,
    request_date: i64,
    request_id: &str,
    parameters: Map<String, Value>,
) -> BTreeMap<String, Value> {
    let mut merged = BTreeMap::new();
    merged.insert("api_key".to_string(), Value::from(user_id));
    merged.insert("game_id".to_string(), Value::from(app_id));
    merged.insert("request_date".to_string(), Value::from(request_date));
    merged.insert("request_id".to_string(), Value::from(request_id));
    merged.extend(parameters);
    merged
}

/// Renders a single parameter value for signing and transmission: strings
/// verbatim, everything else JSON-serialized.
fn render_value(value: &Value) -> Result<String, SignError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

/// Builds the unencoded signable payload: sorted `key=value` pairs joined
/// with `&`.
fn canonical_payload(merged: &BTreeMap<String, Value>) -> Result<String, SignError> {
    let mut pairs = Vec::with_capacity(merged.len());
    for (key, value) in merged {
        pairs.push(format!("{key}={}", render_value(value)?));
    }
    Ok(pairs.join("&"))
}

fn signature(sign_string: &str, secret: &str) -> Result<String, SignError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| SignError::Key(err.to_string()))?;
    mac.update(sign_string.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Produces the ordered form fields for transmission: the sorted rendered
/// parameter pairs followed by the `sig` field.
pub(crate) fn build_signed_fields(
    method: &str,
    hostname: &str,
    path: &str,
    merged: &BTreeMap<String, Value>,
    secret: &str,
) -> Result<Vec<(String, String)>, SignError> {
    let payload = canonical_payload(merged)?;
    let sign_string = format!("{method}\n{}\n{path}\n{payload}", strip_port(hostname));
    let sig = signature(&sign_string, secret)?;

    let mut fields = Vec::with_capacity(merged.len() + 1);
    for (key, value) in merged {
        fields.push((key.clone(), render_value(value)?));
    }
    fields.push(("sig".to_string(), sig));
    Ok(fields)
}

/// Pulls the reserved image side-channel out of a parameter tree before
/// signing. Returns the decoded bytes, having replaced them in the signed set
/// with `object_properties.image_sha` (hex SHA-256 of the bytes).
pub(crate) fn extract_image(parameters: &mut Map<String, Value>) -> Option<Vec<u8>> {
    let encoded = match parameters.remove(IMAGE_BYTES_KEY) {
        Some(Value::String(encoded)) => encoded,
        Some(other) => {
            tracing::warn!(value_type = ?other, "dropping malformed image_bytes parameter");
            return None;
        },
        None => return None,
    };

    let bytes = match BASE64.decode(encoded.as_bytes()) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "dropping undecodable image_bytes parameter");
            return None;
        },
    };

    let image_sha = hex::encode(Sha256::digest(&bytes));
    match parameters
        .entry("object_properties".to_string())
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(object_properties) => {
            object_properties.insert("image_sha".to_string(), Value::from(image_sha));
        },
        other => {
            tracing::warn!(value_type = ?other, "object_properties is not an object; image hash not attached");
        },
    }

    Some(bytes)
}

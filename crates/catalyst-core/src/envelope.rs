//! JSON envelopes that carry HTTP semantics through an action.
//!
//! The webhook ingress turns an inbound request into a [`RequestEnvelope`]
//! payload. An action may answer with a [`ResponseEnvelope`]; the webhook
//! relay action always does. Bodies that are not valid UTF-8 travel
//! base64-encoded with `isBase64Encoded` set.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Multi-valued header or query map.
pub type Headers = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub query: Headers,
    pub body: String,
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status_code: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl ResponseEnvelope {
    /// Interpret raw action output as a structured response.
    ///
    /// Returns `None` when the output is not a JSON object with a usable
    /// `statusCode`; callers then treat the output as a plain body.
    pub fn parse(output: &[u8]) -> Option<Self> {
        let envelope: ResponseEnvelope = serde_json::from_slice(output).ok()?;
        if !(100..=999).contains(&envelope.status_code) {
            return None;
        }
        Some(envelope)
    }

    pub fn decoded_body(&self) -> Result<Vec<u8>, base64::DecodeError> {
        if self.is_base64_encoded {
            STANDARD.decode(&self.body)
        } else {
            Ok(self.body.clone().into_bytes())
        }
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}

/// Canonical MIME form of a header name: the first letter and every letter
/// after a hyphen upper-cased, the rest lower-cased (`x-custom-id` becomes
/// `X-Custom-Id`). Names containing non-token bytes are returned unchanged.
pub fn canonical_header_key(name: &str) -> String {
    let is_token = |b: u8| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b);
    if name.is_empty() || !name.bytes().all(is_token) {
        return name.to_string();
    }
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() };
            upper = c == '-';
            out
        })
        .collect()
}

/// Append a raw header value under the canonical form of `name`.
pub fn append_header(headers: &mut Headers, name: &str, value: &[u8]) {
    headers
        .entry(canonical_header_key(name))
        .or_default()
        .push(String::from_utf8_lossy(value).into_owned());
}

/// Embed a body as text when it is valid UTF-8, base64 otherwise.
///
/// Returns the encoded body and whether base64 was used.
pub fn encode_body(body: &[u8]) -> (String, bool) {
    match std::str::from_utf8(body) {
        Ok(text) => (text.to_string(), false),
        Err(_) => (STANDARD.encode(body), true),
    }
}

pub fn is_json(data: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(data).is_ok()
}

pub fn sniff_content_type(body: &[u8]) -> &'static str {
    if is_json(body) {
        JSON_CONTENT_TYPE
    } else {
        TEXT_CONTENT_TYPE
    }
}

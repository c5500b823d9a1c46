//! Webhook trigger ingress: `ANY /reaction/{path}`.
//!
//! The path after the prefix selects a webhook reaction. The request is
//! turned into a [`RequestEnvelope`] payload for the reaction's action, and
//! the action output is turned back into the HTTP response.

use std::borrow::Cow;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use catalyst_core::envelope::{
    append_header, encode_body, sniff_content_type, Headers, RequestEnvelope, ResponseEnvelope,
};

use crate::error::AppError;
use crate::state::AppState;

pub const PREFIX: &str = "/reaction/";

/// Response headers that describe the original connection, not the body.
const NOT_REPLAYED: &[&str] = &["connection", "content-length", "transfer-encoding", "keep-alive"];

/// ANY /reaction/{path}: run the webhook reaction registered for `path`.
pub async fn handle(State(app): State<AppState>, request: Request) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let key = percent_decode(parts.uri.path().strip_prefix(PREFIX).unwrap_or_default());

    let engine = app.engine.clone();
    let lookup = key.clone();
    let found = tokio::task::spawn_blocking(move || engine.resolve_webhook(&lookup))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    let Some((reaction, trigger)) = found else {
        return Err(AppError::not_found("reaction not found"));
    };

    let authorization = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if !trigger.authorizes(authorization) {
        let reason = match authorization {
            Some(h) if h.starts_with("Bearer ") => "invalid token",
            _ => "missing token",
        };
        tracing::warn!(reaction_id = %reaction.id, path = %key, "{reason}");
        return Err(AppError::unauthorized(reason));
    }

    let body = axum::body::to_bytes(body, app.max_body_bytes)
        .await
        .map_err(|_| AppError::payload_too_large("request body too large"))?;
    let payload = request_payload(&parts, &body)?;

    tracing::info!(reaction_id = %reaction.id, method = %parts.method, path = %key, "webhook triggered");
    let output = app
        .engine
        .runner()
        .run_reaction(&reaction, &payload)
        .await
        .map_err(|e| {
            tracing::error!(reaction_id = %reaction.id, error = %e, "webhook reaction failed");
            AppError::internal(e.to_string())
        })?;

    output_response(output)
}

fn percent_decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

/// Serialize the inbound request as the action payload.
pub fn request_payload(parts: &Parts, body: &Bytes) -> Result<String, AppError> {
    let mut headers = Headers::new();
    for (name, value) in &parts.headers {
        append_header(&mut headers, name.as_str(), value.as_bytes());
    }

    let mut query = Headers::new();
    if let Some(raw) = parts.uri.query() {
        for (k, v) in url::form_urlencoded::parse(raw.as_bytes()) {
            query.entry(k.into_owned()).or_default().push(v.into_owned());
        }
    }

    let (body, is_base64_encoded) = encode_body(body);
    let envelope = RequestEnvelope {
        method: parts.method.to_string(),
        path: percent_decode(parts.uri.path()),
        headers,
        query,
        body,
        is_base64_encoded,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Turn action output into the HTTP response.
///
/// Structured output replays status, headers and body; anything else is a
/// 200 with the raw output and a sniffed content type.
pub fn output_response(output: Vec<u8>) -> Result<Response, AppError> {
    let Some(envelope) = ResponseEnvelope::parse(&output) else {
        let content_type = sniff_content_type(&output);
        return Ok((StatusCode::OK, [(CONTENT_TYPE, content_type)], output).into_response());
    };

    let body = envelope
        .decoded_body()
        .map_err(|_| AppError::internal("error decoding base64 body"))?;
    let status = StatusCode::from_u16(envelope.status_code)
        .map_err(|e| AppError::internal(format!("invalid status code: {e}")))?;

    let mut headers = HeaderMap::new();
    for (name, values) in &envelope.headers {
        if NOT_REPLAYED.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!(header = %name, "dropping invalid response header");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.append(header_name.clone(), v);
                }
                Err(_) => tracing::warn!(header = %name, "dropping invalid response header value"),
            }
        }
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(sniff_content_type(&body)));
    }

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

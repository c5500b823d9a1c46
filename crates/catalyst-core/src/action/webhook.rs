//! Webhook relay action: POST the payload to a URL and report the response.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::envelope::{append_header, encode_body, Headers, ResponseEnvelope};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub url: String,
}

impl Webhook {
    /// Send `payload` and serialize the remote response as a [`ResponseEnvelope`].
    ///
    /// Any received response is a success, including 4xx/5xx statuses. Only
    /// transport failures (unreachable host, invalid URL, broken body) error.
    pub async fn run(&self, http: &reqwest::Client, payload: &str) -> Result<Vec<u8>> {
        let mut request = http.post(&self.url).body(payload.to_string());
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status_code = response.status().as_u16();

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            append_header(&mut headers, name.as_str(), value.as_bytes());
        }

        let bytes = response.bytes().await?;
        let (body, is_base64_encoded) = encode_body(&bytes);

        let envelope = ResponseEnvelope {
            status_code,
            headers,
            body,
            is_base64_encoded,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }
}

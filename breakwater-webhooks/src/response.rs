//! Framework-neutral webhook responses.
//!
//! Redelivery contract: providers retry on 5xx and treat 2xx as final, so
//! constructors here are explicit about status. Anything a retry cannot
//! fix answers 200 even when nothing was processed.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::error::WebhookError;

/// `access-control-allow-headers` value shared by every provider endpoint.
/// Handlers append their provider-specific auth headers to this base.
pub const BASE_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

const ALLOW_ORIGIN: &str = "access-control-allow-origin";
const ALLOW_HEADERS: &str = "access-control-allow-headers";

/// The response a webhook handler hands back to the embedding HTTP layer.
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    status: u16,
    headers: HashMap<String, String>,
    body: Value,
}

impl WebhookResponse {
    fn new(status: u16, body: Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert(ALLOW_ORIGIN.to_string(), "*".to_string());
        Self {
            status,
            headers,
            body,
        }
    }

    /// 200 acknowledgement. Merges `{"received": true}` into `data` so
    /// every acknowledgement body carries the same marker.
    pub fn received(data: Value) -> Self {
        let mut body = Map::new();
        body.insert("received".to_string(), Value::Bool(true));
        if let Value::Object(map) = data {
            body.extend(map);
        }
        Self::new(200, Value::Object(body))
    }

    /// Coded error response: `{"error": message, "code": CODE}` with the
    /// status the error names.
    pub fn error(err: &WebhookError) -> Self {
        Self::new(
            err.status,
            json!({
                "error": err.message,
                "code": err.code.as_str(),
            }),
        )
    }

    /// 429 for rate limited callers.
    pub fn too_many_requests() -> Self {
        Self::new(429, json!({ "error": "Too many requests" }))
    }

    /// 404 with a caller-supplied body, for requests that never reach a
    /// handler.
    pub fn not_found(body: Value) -> Self {
        Self::new(404, body)
    }

    /// 200 answer for CORS preflight.
    pub fn preflight(allow_headers: &str) -> Self {
        Self::new(200, Value::String("ok".to_string())).with_allow_headers(allow_headers)
    }

    /// Sets the `access-control-allow-headers` list for this response.
    pub fn with_allow_headers(mut self, allow_headers: &str) -> Self {
        self.headers
            .insert(ALLOW_HEADERS.to_string(), allow_headers.to_string());
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

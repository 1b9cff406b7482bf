//! Transport-neutral model of an inbound webhook request.
//!
//! Handlers never touch a server framework directly. The embedding HTTP
//! layer builds an [`InboundRequest`] from whatever it received and the
//! handler answers with a [`WebhookResponse`](crate::response::WebhookResponse),
//! which keeps every handler testable without sockets.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::de::DeserializeOwned;

/// An inbound webhook request: method, headers, raw body and the peer
/// address, decoupled from any HTTP server implementation.
///
/// Header names are stored lowercased so lookups are case-insensitive,
/// matching how HTTP/2 and most proxies present them anyway.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    method: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    client_ip: Option<IpAddr>,
}

impl InboundRequest {
    /// Creates a POST request with the given raw body.
    pub fn post(body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST".to_string(),
            headers: HashMap::new(),
            body: body.into(),
            client_ip: None,
        }
    }

    /// Creates an OPTIONS request, as sent by browsers for CORS preflight.
    pub fn options() -> Self {
        Self {
            method: "OPTIONS".to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
            client_ip: None,
        }
    }

    /// Adds a header. Names are lowercased on insert.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Records the peer address the request arrived from.
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// All headers, lowercased names. Dead letter entries capture these
    /// verbatim; the dead letter queue masks sensitive values itself.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    /// True for CORS preflight requests.
    pub fn is_preflight(&self) -> bool {
        self.method.eq_ignore_ascii_case("OPTIONS")
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Parses the body as `application/x-www-form-urlencoded` pairs.
    ///
    /// PIX providers that predate JSON webhooks still deliver form
    /// encoded bodies, so handlers accept both.
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect()
    }

    /// True when the `content-type` header declares a form encoded body.
    pub fn is_form_encoded(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.contains("application/x-www-form-urlencoded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = InboundRequest::post("{}").with_header("X-Signature", "ts=1,v1=abc");

        assert_eq!(req.header("x-signature"), Some("ts=1,v1=abc"));
        assert_eq!(req.header("X-SIGNATURE"), Some("ts=1,v1=abc"));
        assert_eq!(req.header("x-request-id"), None);
    }

    #[test]
    fn test_json_body_roundtrip() {
        let req = InboundRequest::post(r#"{"type":"payment","data":{"id":"123"}}"#);
        let value: Value = req.json().unwrap();

        assert_eq!(value["data"]["id"], "123");
        assert!(InboundRequest::post("not json").json::<Value>().is_err());
    }

    #[test]
    fn test_form_body_parsing() {
        let req = InboundRequest::post("id=9C9&status=paid&value=1990")
            .with_header("content-type", "application/x-www-form-urlencoded");

        assert!(req.is_form_encoded());
        let form = req.form();
        assert_eq!(form.get("id").map(String::as_str), Some("9C9"));
        assert_eq!(form.get("status").map(String::as_str), Some("paid"));
    }

    #[test]
    fn test_preflight_detection() {
        assert!(InboundRequest::options().is_preflight());
        assert!(!InboundRequest::post("{}").is_preflight());
    }

    #[test]
    fn test_client_ip_is_optional() {
        let req = InboundRequest::post("{}");
        assert_eq!(req.client_ip(), None);

        let req = req.with_client_ip("52.67.12.206".parse().unwrap());
        assert_eq!(req.client_ip().unwrap().to_string(), "52.67.12.206");
    }
}

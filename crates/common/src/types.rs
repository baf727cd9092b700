use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Transport-level details of one inbound webhook delivery.
///
/// Built by the HTTP adapter and handed through to connectors and contexts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub id: Option<String>,
    pub method: String,
    pub path: String,
    pub url: String,
    pub query: HashMap<String, String>,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub raw_body: String,
    pub body: serde_json::Value,
    pub params: HashMap<String, String>,
}

impl RequestContext {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Response returned to the webhook caller in synchronous mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Option<u16>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl Response {
    pub const DEFAULT_STATUS: u16 = 200;

    pub fn new(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Status code, falling back to 200.
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(Self::DEFAULT_STATUS)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn status_defaults_to_ok() {
        assert_eq!(Response::default().status_code(), 200);
        assert_eq!(Response::new(204).status_code(), 204);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut req = RequestContext::default();
        req.headers
            .insert("x-hub-signature".into(), "sha1=abc".into());
        assert_eq!(req.header("X-Hub-Signature"), Some("sha1=abc"));
        assert_eq!(req.header("missing"), None);
    }
}

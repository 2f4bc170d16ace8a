//! Request and response values exchanged with route responders.
//!
//! The HTTP layer translates its own request type into a [`MockRequest`]
//! and renders the [`MockResponse`] a responder produces. Nothing in this
//! module knows about the HTTP stack.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use mr_core::HttpMethod;

/// A request as seen by a responder.
///
/// This is also the shape of the `req` table a handler script receives.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MockRequest {
    /// The request method.
    pub method: HttpMethod,
    /// The request path, without the query string.
    pub path: String,
    /// Named path parameters captured by the route pattern.
    pub params: BTreeMap<String, String>,
    /// Decoded query string parameters. Repeated keys keep the last value.
    pub query: BTreeMap<String, String>,
    /// Request headers with lower-case names.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, the raw text if it is not JSON, or null.
    pub body: serde_json::Value,
}

impl MockRequest {
    /// Creates a request for `method` and `path` with no other data.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets the captured path parameters.
    #[must_use]
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }
}

/// The body of a [`MockResponse`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    /// No body.
    #[default]
    Empty,
    /// A JSON document, sent as `application/json`.
    Json(serde_json::Value),
    /// Validated JSON text, sent byte for byte as `application/json`.
    RawJson(Arc<str>),
    /// Plain text.
    Text(String),
}

/// A response produced by a responder.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Extra headers in the order they were set.
    pub headers: Vec<(String, String)>,
    /// The body.
    pub body: ResponseBody,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::empty()
    }
}

impl MockResponse {
    /// `200` with no body.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }

    /// `200` with a JSON body.
    #[must_use]
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Json(value),
        }
    }

    /// `200` with JSON text that is sent unchanged.
    #[must_use]
    pub fn raw_json(text: Arc<str>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::RawJson(text),
        }
    }

    /// `200` with a text body.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Text(text.into()),
        }
    }

    /// Returns the first header named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

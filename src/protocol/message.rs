//! Request and Response value types.
//!
//! A [`Request`] is built by the caller with `with_*` methods and becomes
//! immutable once handed to [`Session::send`](crate::Session::send), which
//! wraps it in an [`Arc`] shared with the pending registry and with every
//! [`Response`] that correlates back to it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::RequestId;
use crate::session::listener::SharedListener;

use super::wire::WireResponse;

// ============================================================================
// Constants
// ============================================================================

/// Default request method.
pub const DEFAULT_METHOD: &str = "POST";

/// Default request path.
pub const DEFAULT_PATH: &str = "/";

/// Default payload data format.
pub const DEFAULT_DATA_FORMAT: &str = "application/json";

// ============================================================================
// NameValue
// ============================================================================

/// A header or query-string entry.
///
/// # Format
///
/// ```json
/// { "name": "Accept", "value": "text/plain" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    /// Entry name.
    pub name: String,
    /// Entry value.
    #[serde(default)]
    pub value: String,
}

impl NameValue {
    /// Creates a new entry.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// One application-level request multiplexed over a session.
///
/// The identifier is generated at construction and never changes.
///
/// # Example
///
/// ```ignore
/// let request = Request::new()
///     .with_path("/echo")
///     .with_data_format("text/plain")
///     .with_data("hello")
///     .with_listener(listener.clone());
/// ```
#[derive(Clone)]
pub struct Request {
    id: RequestId,
    method: String,
    path: String,
    headers: Option<Vec<NameValue>>,
    query_string: Option<Vec<NameValue>>,
    data_format: String,
    data: String,
    listener: Option<SharedListener>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            id: RequestId::generate(),
            method: DEFAULT_METHOD.to_string(),
            path: DEFAULT_PATH.to_string(),
            headers: None,
            query_string: None,
            data_format: DEFAULT_DATA_FORMAT.to_string(),
            data: String::new(),
            listener: None,
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("query_string", &self.query_string)
            .field("data_format", &self.data_format)
            .field("data", &self.data)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

// ============================================================================
// Request - Constructors
// ============================================================================

impl Request {
    /// Creates a `POST /` request with a fresh identifier.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `POST` request to `path`.
    #[inline]
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new().with_path(path)
    }

    /// Creates a `GET` request to `path`.
    #[inline]
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new().with_method("GET").with_path(path)
    }
}

// ============================================================================
// Request - Builder Methods
// ============================================================================

impl Request {
    /// Replaces the generated identifier.
    ///
    /// Intended for replaying a request under a known identifier.
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the HTTP method.
    #[inline]
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the target path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Adds a header.
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push(NameValue::new(name, value));
        self
    }

    /// Replaces all headers.
    #[inline]
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<NameValue>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Adds a query-string parameter.
    #[inline]
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_string
            .get_or_insert_with(Vec::new)
            .push(NameValue::new(name, value));
        self
    }

    /// Replaces all query-string parameters.
    #[inline]
    #[must_use]
    pub fn with_query_string(mut self, query_string: Vec<NameValue>) -> Self {
        self.query_string = Some(query_string);
        self
    }

    /// Sets the payload data format (a MIME type).
    #[inline]
    #[must_use]
    pub fn with_data_format(mut self, data_format: impl Into<String>) -> Self {
        self.data_format = data_format.into();
        self
    }

    /// Sets the payload.
    #[inline]
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    /// Attaches the listener notified about this request.
    #[inline]
    #[must_use]
    pub fn with_listener(mut self, listener: SharedListener) -> Self {
        self.listener = Some(listener);
        self
    }
}

// ============================================================================
// Request - Accessors
// ============================================================================

impl Request {
    /// Returns the request identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Returns the HTTP method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the target path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the headers, if any were set.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> Option<&[NameValue]> {
        self.headers.as_deref()
    }

    /// Returns the query-string parameters, if any were set.
    #[inline]
    #[must_use]
    pub fn query_string(&self) -> Option<&[NameValue]> {
        self.query_string.as_deref()
    }

    /// Returns the payload data format.
    #[inline]
    #[must_use]
    pub fn data_format(&self) -> &str {
        &self.data_format
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Returns the attached listener.
    #[inline]
    #[must_use]
    pub fn listener(&self) -> Option<&SharedListener> {
        self.listener.as_ref()
    }

    /// Returns `true` if the payload is embedded as raw JSON on the wire.
    #[inline]
    #[must_use]
    pub fn has_json_body(&self) -> bool {
        !self.data.is_empty() && self.data_format.to_ascii_lowercase().contains("json")
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response correlated to a request, or synthesized by the session.
///
/// Synthesized responses (handshake results, transport errors, close)
/// carry no request identifier.
#[derive(Debug, Clone)]
pub struct Response {
    id: Option<RequestId>,
    status_code: u16,
    reason_phrase: String,
    path: String,
    headers: Vec<NameValue>,
    data_format: Option<String>,
    body: Value,
    last: bool,
    request: Option<Arc<Request>>,
}

impl Response {
    /// Creates a response that did not come from the server's response list.
    #[must_use]
    pub(crate) fn synthesized(status_code: u16, reason_phrase: impl Into<String>) -> Self {
        Self {
            id: None,
            status_code,
            reason_phrase: reason_phrase.into(),
            path: DEFAULT_PATH.to_string(),
            headers: Vec::new(),
            data_format: None,
            body: Value::Null,
            last: true,
            request: None,
        }
    }

    /// Builds a response from its wire form and the resolved request.
    #[must_use]
    pub(crate) fn from_wire(wire: WireResponse, request: Option<Arc<Request>>) -> Self {
        Self {
            id: Some(wire.uuid),
            status_code: wire.status_code,
            reason_phrase: wire.reason_phrase.unwrap_or_default(),
            path: wire.path.unwrap_or_else(|| DEFAULT_PATH.to_string()),
            headers: wire.headers.unwrap_or_default(),
            data_format: wire.data_format,
            body: wire.message_body,
            last: wire.last.unwrap_or(true),
            request,
        }
    }

    /// Attaches the originating request.
    #[must_use]
    pub(crate) fn with_request(mut self, request: Option<Arc<Request>>) -> Self {
        self.id = request.as_ref().map(|r| r.id().clone());
        self.request = request;
        self
    }
}

// ============================================================================
// Response - Accessors
// ============================================================================

impl Response {
    /// Returns the request identifier echoed by the server.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    /// Returns the status code.
    #[inline]
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Returns the reason phrase.
    #[inline]
    #[must_use]
    pub fn reason_phrase(&self) -> &str {
        &self.reason_phrase
    }

    /// Returns the path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the headers.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &[NameValue] {
        &self.headers
    }

    /// Returns the first header named `name`, ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Returns the response data format, when the server sent one.
    #[inline]
    #[must_use]
    pub fn data_format(&self) -> Option<&str> {
        self.data_format.as_deref()
    }

    /// Returns the body as received.
    #[inline]
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Returns the body as text.
    ///
    /// String bodies are returned unquoted, other JSON values serialized,
    /// and a missing body as an empty string.
    #[must_use]
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Returns `true` if this is the final response for its request.
    #[inline]
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.last
    }

    /// Returns the originating request.
    ///
    /// `None` for synthesized responses and for responses whose
    /// identifier had no registry entry.
    #[inline]
    #[must_use]
    pub fn request(&self) -> Option<&Arc<Request>> {
        self.request.as_ref()
    }

    /// Returns `true` if the status code is below 400.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code < 400
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn wire(status_code: u16, body: Value) -> WireResponse {
        WireResponse {
            uuid: RequestId::from("r-1"),
            status_code,
            reason_phrase: Some("OK".into()),
            path: Some("/echo".into()),
            headers: Some(vec![NameValue::new("Content-Type", "text/plain")]),
            data_format: None,
            message_body: body,
            last: None,
        }
    }

    #[test]
    fn test_request_defaults() {
        let request = Request::new();
        assert_eq!(request.method(), "POST");
        assert_eq!(request.path(), "/");
        assert_eq!(request.data_format(), "application/json");
        assert!(request.headers().is_none());
        assert!(request.listener().is_none());
    }

    #[test]
    fn test_request_builder() {
        let request = Request::get("/pets")
            .with_header("Accept", "application/json")
            .with_query("limit", "10")
            .with_data("x");

        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/pets");
        assert_eq!(request.headers().map(<[_]>::len), Some(1));
        assert_eq!(
            request.query_string(),
            Some(&[NameValue::new("limit", "10")][..])
        );
        assert_eq!(request.data(), "x");
    }

    #[test]
    fn test_request_id_stable_across_setters() {
        let request = Request::new();
        let id = request.id().clone();
        let request = request.with_path("/a").with_data("b");
        assert_eq!(request.id(), &id);
    }

    #[test]
    fn test_has_json_body() {
        assert!(Request::new().with_data("{}").has_json_body());
        assert!(
            Request::new()
                .with_data_format("Application/JSON; charset=utf-8")
                .with_data("1")
                .has_json_body()
        );
        assert!(!Request::new().has_json_body());
        assert!(
            !Request::new()
                .with_data_format("text/plain")
                .with_data("{}")
                .has_json_body()
        );
    }

    #[test]
    fn test_response_from_wire() {
        let response = Response::from_wire(wire(200, json!("hello")), None);
        assert_eq!(response.id().map(RequestId::as_str), Some("r-1"));
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.path(), "/echo");
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.body_text(), "hello");
        assert!(response.is_last());
        assert!(response.request().is_none());
    }

    #[test]
    fn test_body_text_variants() {
        let response = Response::from_wire(wire(200, json!({"a": 1})), None);
        assert_eq!(response.body_text(), r#"{"a":1}"#);

        let response = Response::synthesized(503, "close");
        assert_eq!(response.body_text(), "");
        assert_eq!(response.reason_phrase(), "close");
    }

    #[test]
    fn test_is_success_boundary() {
        assert!(Response::synthesized(399, "").is_success());
        assert!(!Response::synthesized(400, "").is_success());
    }
}

//! Wire envelopes.
//!
//! Serde shapes of every message exchanged with a SwaggerSocket server.
//! Field names and nesting are the compatibility surface.
//!
//! # Outbound
//!
//! ```json
//! { "handshake": { "protocolVersion": "1.0", "protocolName": "SwaggerSocket",
//!                  "uuid": "0", "path": "/", "method": "POST",
//!                  "dataFormat": "application/json" } }
//! { "identity": "42", "requests": [ { "uuid": "...", "method": "POST", ... } ] }
//! { "close": { "reason": "unload", "identity": "42" } }
//! ```
//!
//! # Inbound
//!
//! ```json
//! { "status": { "statusCode": 200, "reasonPhrase": "OK" }, "identity": "42" }
//! { "heartbeat": "1699999999", "identity": "42" }
//! { "identity": "42", "responses": [ { "uuid": "...", "statusCode": 200, ... } ] }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::{Identity, RequestId};

use super::message::{NameValue, Request};

// ============================================================================
// Constants
// ============================================================================

/// Protocol name announced in the handshake.
pub const PROTOCOL_NAME: &str = "SwaggerSocket";

/// Protocol version announced in the handshake and in the marker header.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Handshake
// ============================================================================

/// First message of a session, requesting an identity.
///
/// Built from the request passed to [`Session::open`](crate::Session::open).
/// The only message carrying protocol name and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Protocol version.
    pub protocol_version: String,
    /// Protocol name.
    pub protocol_name: String,
    /// Identity slot, always unassigned.
    pub uuid: String,
    /// Subscription path.
    pub path: String,
    /// Subscription method.
    pub method: String,
    /// Data format of subsequent payloads.
    pub data_format: String,
    /// Headers forwarded to the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<NameValue>>,
    /// Query-string parameters forwarded to the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<Vec<NameValue>>,
}

impl Handshake {
    /// Builds the handshake for an opening request.
    #[must_use]
    pub fn from_request(request: &Request) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            protocol_name: PROTOCOL_NAME.to_string(),
            uuid: Identity::UNASSIGNED.to_string(),
            path: request.path().to_string(),
            method: request.method().to_string(),
            data_format: request.data_format().to_string(),
            headers: request.headers().map(<[NameValue]>::to_vec),
            query_string: request.query_string().map(<[NameValue]>::to_vec),
        }
    }
}

/// `{ "handshake": ... }`
#[derive(Debug, Serialize)]
pub(crate) struct HandshakeEnvelope<'a> {
    pub handshake: &'a Handshake,
}

// ============================================================================
// Requests
// ============================================================================

/// One request inside a request message.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireRequest<'a> {
    pub uuid: &'a RequestId,
    pub method: &'a str,
    pub path: &'a str,
    pub data_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<&'a [NameValue]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<&'a [NameValue]>,
    pub message_body: Value,
}

/// `{ "identity": ..., "requests": [...] }`
#[derive(Debug, Serialize)]
pub(crate) struct RequestMessage<'a> {
    pub identity: &'a Identity,
    pub requests: Vec<WireRequest<'a>>,
}

// ============================================================================
// CloseMessage
// ============================================================================

/// Teardown notice sent once when the session closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseMessage {
    /// Why the session is closing.
    pub reason: String,
    /// Identity being released.
    pub identity: Identity,
}

impl CloseMessage {
    /// Reason sent when the caller closes the session.
    pub const UNLOAD: &'static str = "unload";

    /// Creates a close message.
    #[inline]
    #[must_use]
    pub fn new(reason: impl Into<String>, identity: Identity) -> Self {
        Self {
            reason: reason.into(),
            identity,
        }
    }
}

/// `{ "close": ... }`
#[derive(Debug, Serialize)]
pub(crate) struct CloseEnvelope<'a> {
    pub close: &'a CloseMessage,
}

// ============================================================================
// Inbound: StatusMessage
// ============================================================================

/// Handshake acknowledgment, or per-request status once open.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusMessage {
    /// Status of the handshake (or request).
    pub status: Status,
    /// Assigned identity, or the failing request's identifier.
    #[serde(default, deserialize_with = "lenient_string")]
    pub identity: Option<String>,
}

/// Status code and reason phrase.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Status code.
    #[serde(deserialize_with = "lenient_status")]
    pub status_code: u16,
    /// Reason phrase.
    #[serde(default)]
    pub reason_phrase: String,
}

// ============================================================================
// Inbound: Heartbeat
// ============================================================================

/// Keep-alive marker.
#[derive(Debug, Clone, Deserialize)]
pub struct Heartbeat {
    /// Server timestamp or token.
    pub heartbeat: Value,
    /// Identity of the session.
    #[serde(default, deserialize_with = "lenient_string")]
    pub identity: Option<String>,
}

// ============================================================================
// Inbound: ResponseMessage
// ============================================================================

/// One or more responses for requests of this session.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    /// Identity of the session.
    #[serde(default, deserialize_with = "lenient_string")]
    pub identity: Option<String>,
    /// Responses in delivery order.
    pub responses: Vec<WireResponse>,
}

/// A response record as received.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    /// Identifier of the originating request.
    pub uuid: RequestId,
    /// Status code.
    #[serde(alias = "status", deserialize_with = "lenient_status")]
    pub status_code: u16,
    /// Reason phrase.
    #[serde(default)]
    pub reason_phrase: Option<String>,
    /// Path of the originating request.
    #[serde(default)]
    pub path: Option<String>,
    /// Response headers.
    #[serde(default)]
    pub headers: Option<Vec<NameValue>>,
    /// Body data format.
    #[serde(default)]
    pub data_format: Option<String>,
    /// Body; a JSON string for text payloads, any JSON value otherwise.
    #[serde(default)]
    pub message_body: Value,
    /// `false` while more responses for the same request will follow.
    #[serde(default)]
    pub last: Option<bool>,
}

// ============================================================================
// Lenient Field Decoding
// ============================================================================

/// Strings or numbers, as different server builds emit either.
#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<StringOrNumber>::deserialize(deserializer)?.map(|value| match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }),
    )
}

fn lenient_status<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.trim().parse().map_err(D::Error::custom),
        StringOrNumber::Number(n) => n
            .as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| D::Error::custom(format!("status code out of range: {n}"))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_handshake_from_request() {
        let request = Request::post("/swaggersocket")
            .with_data_format("text/plain")
            .with_header("Authorization", "token");
        let handshake = Handshake::from_request(&request);

        assert_eq!(handshake.protocol_name, "SwaggerSocket");
        assert_eq!(handshake.protocol_version, "1.0");
        assert_eq!(handshake.uuid, "0");
        assert_eq!(handshake.path, "/swaggersocket");
        assert_eq!(handshake.data_format, "text/plain");

        let value = serde_json::to_value(HandshakeEnvelope {
            handshake: &handshake,
        })
        .expect("serialize");
        assert_eq!(value["handshake"]["protocolName"], "SwaggerSocket");
        assert_eq!(
            value["handshake"]["headers"],
            json!([{"name": "Authorization", "value": "token"}])
        );
        assert!(value["handshake"].get("queryString").is_none());
    }

    #[test]
    fn test_status_message_lenient_fields() {
        let status: StatusMessage = serde_json::from_value(json!({
            "status": {"statusCode": "200", "reasonPhrase": "OK"},
            "identity": 17
        }))
        .expect("parse");
        assert_eq!(status.status.status_code, 200);
        assert_eq!(status.identity.as_deref(), Some("17"));
    }

    #[test]
    fn test_wire_response_defaults() {
        let response: WireResponse = serde_json::from_value(json!({
            "uuid": "abc",
            "status": 201
        }))
        .expect("parse");
        assert_eq!(response.status_code, 201);
        assert!(response.message_body.is_null());
        assert!(response.last.is_none());
    }

    #[test]
    fn test_wire_response_rejects_bad_status() {
        let result = serde_json::from_value::<WireResponse>(json!({
            "uuid": "abc",
            "statusCode": 70000
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_close_envelope_shape() {
        let close = CloseMessage::new(CloseMessage::UNLOAD, Identity::new("9"));
        let value = serde_json::to_value(CloseEnvelope { close: &close }).expect("serialize");
        assert_eq!(value, json!({"close": {"reason": "unload", "identity": "9"}}));
    }
}

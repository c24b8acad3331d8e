//! Frame encoding and decoding.
//!
//! Encoding turns value types into the JSON text pushed over the transport.
//! Decoding turns raw inbound text into a classified [`Inbound`] message,
//! reassembling payloads that arrive split across several deliveries.
//!
//! # Inbound framing
//!
//! With message-length tracking enabled the server prefixes every message
//! with its length and a delimiter:
//!
//! ```text
//! 57<->{"identity":"42","responses":[{"uuid":"a","statusCode":200}]}
//! ```
//!
//! The prefix is stripped before parsing. A delivery that ends in the middle
//! of a JSON document is kept in the decoder's buffer and completed by the
//! next delivery (long-polling may split a response across two requests).

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::Identity;

use super::message::Request;
use super::wire::{
    CloseEnvelope, CloseMessage, Handshake, HandshakeEnvelope, Heartbeat, RequestMessage,
    ResponseMessage, StatusMessage, WireRequest, WireResponse,
};

// ============================================================================
// Constants
// ============================================================================

/// Default delimiter between the length marker and the message.
pub const DEFAULT_MESSAGE_DELIMITER: &str = "<->";

/// Default upper bound on the incomplete-message buffer, in bytes.
pub const DEFAULT_MAX_BUFFERED: usize = 10_000_000;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes the handshake envelope.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode_handshake(handshake: &Handshake) -> Result<String> {
    to_json(&HandshakeEnvelope { handshake })
}

/// Encodes a single request object without the identity wrapper.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode_bare_request(request: &Request) -> Result<String> {
    to_json(&wire_request(request))
}

/// Encodes one request wrapped with the session identity.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode_request(request: &Request, identity: &Identity) -> Result<String> {
    encode_batch(std::iter::once(request), identity)
}

/// Encodes several requests in one message sharing the session identity.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode_batch<'a>(
    requests: impl IntoIterator<Item = &'a Request>,
    identity: &Identity,
) -> Result<String> {
    let message = RequestMessage {
        identity,
        requests: requests.into_iter().map(wire_request).collect(),
    };
    to_json(&message)
}

/// Encodes the close envelope.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode_close(close: &CloseMessage) -> Result<String> {
    to_json(&CloseEnvelope { close })
}

fn to_json(value: &impl Serialize) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn wire_request(request: &Request) -> WireRequest<'_> {
    WireRequest {
        uuid: request.id(),
        method: request.method(),
        path: request.path(),
        data_format: request.data_format(),
        headers: request.headers(),
        query_string: request.query_string(),
        message_body: message_body(request),
    }
}

/// JSON payloads are embedded as-is; everything else travels as a string.
fn message_body(request: &Request) -> Value {
    if request.has_json_body() {
        match serde_json::from_str(request.data()) {
            Ok(value) => return value,
            Err(e) => {
                warn!(
                    request_id = %request.id(),
                    error = %e,
                    "JSON data format with non-JSON payload, sending as string"
                );
            }
        }
    }
    Value::String(request.data().to_string())
}

// ============================================================================
// Inbound Messages
// ============================================================================

/// A classified inbound message.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Handshake acknowledgment (or per-request status once open).
    Status(StatusMessage),
    /// Keep-alive, not dispatched.
    Heartbeat(Heartbeat),
    /// Responses for pending requests.
    Responses {
        /// Identity echoed by the server.
        identity: Option<String>,
        /// The responses, single or batched.
        delivery: Delivery,
    },
}

/// Responses carried by one message.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Exactly one response.
    Single(WireResponse),
    /// Zero or several responses, in delivery order.
    Batch(Vec<WireResponse>),
}

impl Delivery {
    fn from_responses(mut responses: Vec<WireResponse>) -> Self {
        if responses.len() == 1
            && let Some(response) = responses.pop()
        {
            return Self::Single(response);
        }
        Self::Batch(responses)
    }

    /// Number of responses.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(responses) => responses.len(),
        }
    }

    /// Returns `true` if no responses are carried.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of feeding one delivery to the decoder.
#[derive(Debug)]
pub enum Decoded {
    /// Buffered; waiting for the rest of the message.
    Incomplete,
    /// A complete, classified message. The buffer is now empty.
    Parsed(Inbound),
    /// Unusable input. The buffer has been discarded.
    Malformed(Error),
}

// ============================================================================
// FrameDecoder
// ============================================================================

/// Stateful decoder owning the incomplete-message buffer.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    /// Concatenation of deliveries not yet parsed.
    buffer: String,
    /// Separator between the length marker and the message.
    delimiter: String,
    /// Buffer size past which a partial message is dropped.
    max_buffered: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_DELIMITER)
    }
}

impl FrameDecoder {
    /// Creates a decoder for the given length-marker delimiter.
    #[must_use]
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            buffer: String::new(),
            delimiter: delimiter.into(),
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }

    /// Sets the buffer size past which a partial message is dropped.
    #[inline]
    #[must_use]
    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered;
        self
    }

    /// Returns the length-marker delimiter.
    #[inline]
    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Returns `true` if a partial message is waiting for completion.
    #[inline]
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Returns the buffered partial message.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Discards any buffered partial message.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Strips a leading `<digits><delimiter>` marker, if present.
    #[must_use]
    pub fn strip_length_prefix<'a>(&self, text: &'a str) -> &'a str {
        if self.delimiter.is_empty() {
            return text;
        }
        let trimmed = text.trim_start();
        let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return text;
        }
        trimmed[digits..]
            .strip_prefix(self.delimiter.as_str())
            .unwrap_or(text)
    }

    /// Returns `true` if `text` is a length marker cut short: digits
    /// followed by a proper prefix of the delimiter, possibly empty.
    fn is_partial_length_marker(&self, text: &str) -> bool {
        let trimmed = text.trim_start();
        let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
        let rest = &trimmed[digits..];
        digits > 0 && rest.len() < self.delimiter.len() && self.delimiter.starts_with(rest)
    }

    /// Feeds one delivery.
    ///
    /// The delivery is appended to the buffer and the whole buffer is
    /// parsed. Input ending mid-document or mid length marker stays
    /// buffered; any other parse failure discards the buffer. So does a
    /// buffer grown past its limit.
    pub fn decode(&mut self, chunk: &str) -> Decoded {
        self.buffer.push_str(chunk);

        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Decoded::Incomplete;
        }

        if self.buffer.len() > self.max_buffered {
            let buffered = self.buffer.len();
            self.buffer.clear();
            return Decoded::Malformed(Error::malformed_frame(format!(
                "partial message of {buffered} bytes exceeds the {} byte limit",
                self.max_buffered
            )));
        }

        if self.is_partial_length_marker(&self.buffer) {
            trace!(buffered = self.buffer.len(), "Partial length marker buffered");
            return Decoded::Incomplete;
        }

        let parsed = serde_json::from_str::<Value>(self.strip_length_prefix(&self.buffer));
        match parsed {
            Ok(value) => {
                self.buffer.clear();
                match classify(value) {
                    Ok(inbound) => Decoded::Parsed(inbound),
                    Err(e) => Decoded::Malformed(e),
                }
            }
            Err(e) if e.is_eof() => {
                trace!(buffered = self.buffer.len(), "Partial message buffered");
                Decoded::Incomplete
            }
            Err(e) => {
                self.buffer.clear();
                Decoded::Malformed(Error::malformed_frame(e.to_string()))
            }
        }
    }
}

/// Classifies a parsed document: status, then heartbeat, then responses.
fn classify(value: Value) -> Result<Inbound> {
    let Some(object) = value.as_object() else {
        return Err(Error::malformed_frame("expected a JSON object"));
    };

    if object.contains_key("status") {
        return Ok(Inbound::Status(serde_json::from_value(value)?));
    }

    if object.contains_key("heartbeat") {
        return Ok(Inbound::Heartbeat(serde_json::from_value(value)?));
    }

    if object.contains_key("responses") {
        let message: ResponseMessage = serde_json::from_value(value)?;
        return Ok(Inbound::Responses {
            identity: message.identity,
            delivery: Delivery::from_responses(message.responses),
        });
    }

    Err(Error::malformed_frame("unrecognized message"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).expect("valid json")
    }

    #[test]
    fn test_encode_request_complete_form() {
        let request = Request::post("/echo")
            .with_id("r-1")
            .with_data_format("text/plain")
            .with_data("hello");
        let json = encode_request(&request, &Identity::new("42")).expect("encode");

        assert_eq!(
            parse(&json),
            json!({
                "identity": "42",
                "requests": [{
                    "uuid": "r-1",
                    "method": "POST",
                    "path": "/echo",
                    "dataFormat": "text/plain",
                    "messageBody": "hello"
                }]
            })
        );
    }

    #[test]
    fn test_encode_json_body_embedded() {
        let request = Request::post("/pets").with_id("r-2").with_data(r#"{"name":"rex"}"#);
        let value = parse(&encode_bare_request(&request).expect("encode"));
        assert_eq!(value["messageBody"], json!({"name": "rex"}));
    }

    #[test]
    fn test_encode_empty_json_body_is_string() {
        let request = Request::post("/pets").with_id("r-3");
        let value = parse(&encode_bare_request(&request).expect("encode"));
        assert_eq!(value["messageBody"], json!(""));
    }

    #[test]
    fn test_encode_invalid_json_body_falls_back_to_string() {
        let request = Request::post("/pets").with_id("r-4").with_data("not json");
        let value = parse(&encode_bare_request(&request).expect("encode"));
        assert_eq!(value["messageBody"], json!("not json"));
    }

    #[test]
    fn test_encode_optional_fields() {
        let request = Request::get("/pets")
            .with_id("r-5")
            .with_header("Accept", "text/plain")
            .with_query("limit", "5");
        let value = parse(&encode_bare_request(&request).expect("encode"));
        assert_eq!(value["headers"], json!([{"name": "Accept", "value": "text/plain"}]));
        assert_eq!(value["queryString"], json!([{"name": "limit", "value": "5"}]));
        assert!(value.get("identity").is_none());
    }

    #[test]
    fn test_encode_batch_keeps_order() {
        let a = Request::post("/a").with_id("a");
        let b = Request::post("/b").with_id("b");
        let value = parse(&encode_batch([&a, &b], &Identity::new("7")).expect("encode"));

        assert_eq!(value["identity"], "7");
        assert_eq!(value["requests"][0]["uuid"], "a");
        assert_eq!(value["requests"][1]["uuid"], "b");
        assert!(value["requests"][0].get("identity").is_none());
    }

    #[test]
    fn test_encode_handshake_and_close() {
        let handshake = Handshake::from_request(&Request::post("/ss"));
        let value = parse(&encode_handshake(&handshake).expect("encode"));
        assert_eq!(value["handshake"]["uuid"], "0");
        assert_eq!(value["handshake"]["path"], "/ss");

        let close = CloseMessage::new("unload", Identity::new("3"));
        let value = parse(&encode_close(&close).expect("encode"));
        assert_eq!(value, json!({"close": {"reason": "unload", "identity": "3"}}));
    }

    #[test]
    fn test_decode_status() {
        let mut decoder = FrameDecoder::default();
        let decoded = decoder
            .decode(r#"{"status":{"statusCode":200,"reasonPhrase":"OK"},"identity":"42"}"#);

        let Decoded::Parsed(Inbound::Status(status)) = decoded else {
            panic!("expected status, got {decoded:?}");
        };
        assert_eq!(status.status.status_code, 200);
        assert_eq!(status.identity.as_deref(), Some("42"));
    }

    #[test]
    fn test_decode_strips_length_prefix() {
        let mut decoder = FrameDecoder::default();
        let decoded = decoder.decode(r#"31<->{"heartbeat":"1","identity":"4"}"#);
        assert!(matches!(decoded, Decoded::Parsed(Inbound::Heartbeat(_))));
    }

    #[test]
    fn test_decode_custom_delimiter() {
        let mut decoder = FrameDecoder::new("|");
        let decoded = decoder.decode(r#"20|{"heartbeat":"1"}"#);
        assert!(matches!(decoded, Decoded::Parsed(Inbound::Heartbeat(_))));
    }

    #[test]
    fn test_decode_status_takes_priority() {
        let mut decoder = FrameDecoder::default();
        let decoded = decoder.decode(
            r#"{"status":{"statusCode":200},"heartbeat":"1","responses":[]}"#,
        );
        assert!(matches!(decoded, Decoded::Parsed(Inbound::Status(_))));
    }

    #[test]
    fn test_decode_single_and_batch() {
        let mut decoder = FrameDecoder::default();

        let decoded = decoder.decode(r#"{"responses":[{"uuid":"a","statusCode":200}]}"#);
        let Decoded::Parsed(Inbound::Responses { delivery, .. }) = decoded else {
            panic!("expected responses");
        };
        assert!(matches!(delivery, Delivery::Single(ref r) if r.uuid.as_str() == "a"));

        let decoded = decoder.decode(
            r#"{"identity":"1","responses":[{"uuid":"a","statusCode":200},{"uuid":"b","statusCode":404}]}"#,
        );
        let Decoded::Parsed(Inbound::Responses { identity, delivery }) = decoded else {
            panic!("expected responses");
        };
        assert_eq!(identity.as_deref(), Some("1"));
        assert_eq!(delivery.len(), 2);
    }

    #[test]
    fn test_decode_fragmented_message() {
        let mut decoder = FrameDecoder::default();
        let full = r#"60<->{"responses":[{"uuid":"a","statusCode":200,"messageBody":"hi"}]}"#;
        let (first, second) = full.split_at(30);

        assert!(matches!(decoder.decode(first), Decoded::Incomplete));
        assert!(decoder.has_pending());
        assert_eq!(decoder.pending(), first);

        let decoded = decoder.decode(second);
        assert!(matches!(decoded, Decoded::Parsed(Inbound::Responses { .. })));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decode_split_inside_length_marker() {
        let full = r#"45<->{"responses":[{"uuid":"a","statusCode":200}]}"#;
        for split in ["45", "45<", "45<-"] {
            let mut decoder = FrameDecoder::default();
            assert!(matches!(decoder.decode(split), Decoded::Incomplete), "{split}");
            assert_eq!(decoder.pending(), split);

            let decoded = decoder.decode(&full[split.len()..]);
            assert!(matches!(decoded, Decoded::Parsed(Inbound::Responses { .. })), "{split}");
            assert!(!decoder.has_pending());
        }
    }

    #[test]
    fn test_decode_bare_digits_then_garbage_is_malformed() {
        let mut decoder = FrameDecoder::default();
        assert!(matches!(decoder.decode("12"), Decoded::Incomplete));
        assert!(matches!(decoder.decode("<x"), Decoded::Malformed(_)));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decode_buffer_limit() {
        let mut decoder = FrameDecoder::default().with_max_buffered(16);
        assert!(matches!(decoder.decode(r#"{"responses":["#), Decoded::Incomplete));

        let decoded = decoder.decode(r#"{"uuid":"a","#);
        assert!(matches!(decoded, Decoded::Malformed(Error::MalformedFrame { .. })));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decode_syntax_error_discards_buffer() {
        let mut decoder = FrameDecoder::default();
        assert!(matches!(decoder.decode("{\"a\":"), Decoded::Incomplete));
        assert!(matches!(decoder.decode("]"), Decoded::Malformed(_)));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decode_unknown_shape_is_malformed() {
        let mut decoder = FrameDecoder::default();
        assert!(matches!(decoder.decode(r#"{"foo":1}"#), Decoded::Malformed(_)));
        assert!(matches!(decoder.decode("[1,2]"), Decoded::Malformed(_)));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decode_whitespace_only() {
        let mut decoder = FrameDecoder::default();
        assert!(matches!(decoder.decode("  \n"), Decoded::Incomplete));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_reset() {
        let mut decoder = FrameDecoder::default();
        let _ = decoder.decode("{");
        decoder.reset();
        assert!(!decoder.has_pending());
    }

    proptest! {
        #[test]
        fn prop_length_prefix_stripped(len in 0u32..1_000_000, body in "[a-z{}\":,]{0,40}") {
            let decoder = FrameDecoder::default();
            let framed = format!("{len}<->{body}");
            prop_assert_eq!(decoder.strip_length_prefix(&framed), body.as_str());
        }

        #[test]
        fn prop_unprefixed_text_untouched(body in "[a-z{}\":,]{0,40}") {
            let decoder = FrameDecoder::default();
            prop_assert_eq!(decoder.strip_length_prefix(&body), body.as_str());
        }

        #[test]
        fn prop_any_split_reassembles(split in 1usize..58) {
            let full = r#"{"responses":[{"uuid":"a","statusCode":200,"messageBody":"x"}]}"#;
            let split = split.min(full.len() - 1);
            let (first, second) = full.split_at(split);
            let mut decoder = FrameDecoder::default();

            prop_assert!(matches!(decoder.decode(first), Decoded::Incomplete));
            prop_assert!(matches!(decoder.decode(second), Decoded::Parsed(_)));
            prop_assert!(!decoder.has_pending());
        }

        #[test]
        fn prop_any_split_of_prefixed_frame_reassembles(split in 1usize..68) {
            let body = r#"{"responses":[{"uuid":"a","statusCode":200,"messageBody":"x"}]}"#;
            let full = format!("{}<->{body}", body.len());
            let split = split.min(full.len() - 1);
            let (first, second) = full.split_at(split);
            let mut decoder = FrameDecoder::default();

            prop_assert!(matches!(decoder.decode(first), Decoded::Incomplete));
            prop_assert!(matches!(decoder.decode(second), Decoded::Parsed(_)));
            prop_assert!(!decoder.has_pending());
        }
    }
}

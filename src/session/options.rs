//! Session configuration.
//!
//! Options forwarded to the transport when the subscription is opened,
//! plus the session's own logging verbosity.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use swaggersocket::SessionOptions;
//!
//! let options = SessionOptions::new()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_reconnect(false)
//!     .with_log_level(LogLevel::Debug);
//! ```
//!
//! Options also deserialize from the camel-cased JSON object used by
//! browser clients; omitted fields take their defaults:
//!
//! ```json
//! { "timeout": 60000, "transport": "websocket", "connectTimeout": -1 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::codec::DEFAULT_MESSAGE_DELIMITER;
use crate::transport::TransportKind;

// ============================================================================
// Constants
// ============================================================================

/// Default inactivity timeout of the subscription.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Default maximum number of (re)connection requests.
pub const DEFAULT_MAX_REQUEST: u32 = 60;

/// Default maximum bytes on a streaming response before it is recycled.
pub const DEFAULT_MAX_STREAMING_LENGTH: u64 = 10_000_000;

// ============================================================================
// LogLevel
// ============================================================================

/// Verbosity for contained listener faults and heartbeats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Faults logged at `debug`.
    #[default]
    Info,
    /// Faults logged at `warn` with their payload.
    Debug,
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Transport and session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionOptions {
    /// Inactivity timeout of the subscription.
    #[serde(with = "millis")]
    pub timeout: Duration,

    /// Preferred transport.
    pub transport: TransportKind,

    /// Transport used when the preferred one is unavailable.
    pub fallback_transport: TransportKind,

    /// Method used with the fallback transport.
    pub fallback_method: String,

    /// Maximum number of connection attempts, reconnects included.
    pub max_request: u32,

    /// Reconnect after the connection drops.
    pub reconnect: bool,

    /// Maximum bytes read on a streaming response. Also caps the buffer
    /// holding a partial inbound message.
    pub max_streaming_length: u64,

    /// Use cross-domain requests where applicable.
    #[serde(rename = "enableXDR")]
    pub enable_xdr: bool,

    /// Deliver buffered events before reconnecting.
    pub execute_callback_before_reconnect: bool,

    /// Send credentials with cross-origin requests.
    pub with_credentials: bool,

    /// Server prefixes messages with their length.
    ///
    /// Always enabled on the subscription; the decoder tolerates both forms.
    pub track_message_length: bool,

    /// Separator between the length marker and the message.
    pub message_delimiter: String,

    /// Connection establishment timeout. `None` waits indefinitely.
    #[serde(with = "millis_or_negative")]
    pub connect_timeout: Option<Duration>,

    /// Delay before a reconnection attempt.
    #[serde(with = "millis")]
    pub reconnect_interval: Duration,

    /// Strip transport bookkeeping headers from responses.
    #[serde(alias = "dropAtmosphereHeaders")]
    pub drop_headers: bool,

    /// Surface response headers of the transport itself.
    pub read_response_headers: bool,

    /// Verbosity for listener faults and heartbeats.
    pub log_level: LogLevel,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            transport: TransportKind::WebSocket,
            fallback_transport: TransportKind::LongPolling,
            fallback_method: "POST".to_string(),
            max_request: DEFAULT_MAX_REQUEST,
            reconnect: true,
            max_streaming_length: DEFAULT_MAX_STREAMING_LENGTH,
            enable_xdr: false,
            execute_callback_before_reconnect: false,
            with_credentials: false,
            track_message_length: false,
            message_delimiter: DEFAULT_MESSAGE_DELIMITER.to_string(),
            connect_timeout: None,
            reconnect_interval: Duration::ZERO,
            drop_headers: true,
            read_response_headers: false,
            log_level: LogLevel::Info,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the object has mistyped fields.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the subscription timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the preferred and fallback transports.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind, fallback: TransportKind) -> Self {
        self.transport = transport;
        self.fallback_transport = fallback;
        self
    }

    /// Enables or disables reconnection.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the maximum number of connection attempts.
    #[inline]
    #[must_use]
    pub fn with_max_request(mut self, max_request: u32) -> Self {
        self.max_request = max_request;
        self
    }

    /// Sets the delay between reconnection attempts.
    #[inline]
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the connection establishment timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the length-marker delimiter.
    #[inline]
    #[must_use]
    pub fn with_message_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.message_delimiter = delimiter.into();
        self
    }

    /// Sends credentials with cross-origin requests.
    #[inline]
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Sets the logging verbosity.
    #[inline]
    #[must_use]
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Checks option consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the delimiter is empty or reconnection
    /// is enabled with no connection attempts allowed.
    pub fn validate(&self) -> Result<()> {
        if self.message_delimiter.is_empty() {
            return Err(Error::config("message delimiter must not be empty"));
        }
        if self.reconnect && self.max_request == 0 {
            return Err(Error::config("reconnect requires max_request > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// `Duration` as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as milliseconds, any negative value meaning `None`.
mod millis_or_negative {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_i64(i64::try_from(d.as_millis()).unwrap_or(i64::MAX)),
            None => s.serialize_i64(-1),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        let ms = i64::deserialize(d)?;
        Ok(u64::try_from(ms).ok().map(Duration::from_millis))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SessionOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(300));
        assert_eq!(options.transport, TransportKind::WebSocket);
        assert_eq!(options.fallback_transport, TransportKind::LongPolling);
        assert_eq!(options.max_request, 60);
        assert!(options.reconnect);
        assert_eq!(options.message_delimiter, "<->");
        assert!(options.connect_timeout.is_none());
        assert!(options.drop_headers);
        assert_eq!(options.log_level, LogLevel::Info);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = SessionOptions::new()
            .with_timeout(Duration::from_secs(5))
            .with_transport(TransportKind::LongPolling, TransportKind::LongPolling)
            .with_reconnect(false)
            .with_connect_timeout(Duration::from_millis(250))
            .with_log_level(LogLevel::Debug);

        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.transport, TransportKind::LongPolling);
        assert!(!options.reconnect);
        assert_eq!(options.connect_timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_from_json_partial() {
        let options = SessionOptions::from_json(
            r#"{"timeout": 1000, "transport": "long-polling", "connectTimeout": -1,
                "dropAtmosphereHeaders": false, "enableXDR": true, "logLevel": "debug"}"#,
        )
        .expect("parse");

        assert_eq!(options.timeout, Duration::from_secs(1));
        assert_eq!(options.transport, TransportKind::LongPolling);
        assert!(options.connect_timeout.is_none());
        assert!(!options.drop_headers);
        assert!(options.enable_xdr);
        assert_eq!(options.log_level, LogLevel::Debug);
        assert_eq!(options.max_request, DEFAULT_MAX_REQUEST);
    }

    #[test]
    fn test_json_roundtrip_connect_timeout() {
        let options = SessionOptions::new().with_connect_timeout(Duration::from_millis(750));
        let json = serde_json::to_string(&options).expect("serialize");
        assert!(json.contains(r#""connectTimeout":750"#));
        assert_eq!(SessionOptions::from_json(&json).expect("parse"), options);
    }

    #[test]
    fn test_validate() {
        let options = SessionOptions::new().with_message_delimiter("");
        assert!(matches!(options.validate(), Err(Error::Config { .. })));

        let options = SessionOptions::new().with_max_request(0);
        assert!(options.validate().is_err());

        let options = SessionOptions::new().with_max_request(0).with_reconnect(false);
        assert!(options.validate().is_ok());
    }
}

//! Listener callbacks and fault-isolated dispatch.
//!
//! A [`Listener`] implements any subset of the session hooks; unimplemented
//! hooks fall back to the trait's no-op defaults. [`Callbacks`] offers the
//! same capability set as optional closures.
//!
//! Every invocation goes through [`Dispatcher`], which contains panics so a
//! faulty listener cannot break dispatch to other pending requests.
//!
//! # Example
//!
//! ```ignore
//! let listener = Callbacks::new()
//!     .with_open(|r| println!("open: {}", r.reason_phrase()))
//!     .with_response(|r| println!("{}", r.body_text()))
//!     .shared();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Error;
use crate::protocol::Response;
use crate::transport::TransportEvent;

use super::options::LogLevel;

// ============================================================================
// Types
// ============================================================================

/// Listener shared between requests, the registry and the session.
pub type SharedListener = Arc<dyn Listener>;

/// Callback over one response.
type ResponseFn = Box<dyn Fn(&Response) + Send + Sync>;

/// Callback over a batch of responses.
type ResponsesFn = Box<dyn Fn(&[Response]) + Send + Sync>;

/// Callback over a raw transport event.
type TransportFn = Box<dyn Fn(&TransportEvent) + Send + Sync>;

// ============================================================================
// Listener
// ============================================================================

/// Session and per-request event hooks.
///
/// All methods default to no-ops; implement only the ones you need.
pub trait Listener: Send + Sync {
    /// Handshake accepted; the session may now send requests.
    fn on_open(&self, _response: &Response) {}

    /// A response with status below 400.
    fn on_response(&self, _response: &Response) {}

    /// All responses of a batched delivery, in delivery order.
    fn on_responses(&self, _responses: &[Response]) {}

    /// A response with status 400 or above, a rejected handshake,
    /// a transport error, or a send that could not be performed.
    fn on_error(&self, _response: &Response) {}

    /// The transport closed the session.
    fn on_close(&self, _response: &Response) {}

    /// The transport failed; reported raw.
    fn on_transport_failure(&self, _event: &TransportEvent) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl Listener for NoopListener {}

static NOOP: NoopListener = NoopListener;

/// Returns `listener`, or a no-op listener when none is attached.
#[inline]
pub(crate) fn or_noop(listener: Option<&SharedListener>) -> &dyn Listener {
    match listener {
        Some(listener) => &**listener,
        None => &NOOP,
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// Closure-based [`Listener`].
#[derive(Default)]
pub struct Callbacks {
    open: Option<ResponseFn>,
    response: Option<ResponseFn>,
    responses: Option<ResponsesFn>,
    error: Option<ResponseFn>,
    close: Option<ResponseFn>,
    transport_failure: Option<TransportFn>,
}

impl Callbacks {
    /// Creates a callback set with no hooks.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `on_open` hook.
    #[must_use]
    pub fn with_open(mut self, f: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.open = Some(Box::new(f));
        self
    }

    /// Sets the `on_response` hook.
    #[must_use]
    pub fn with_response(mut self, f: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.response = Some(Box::new(f));
        self
    }

    /// Sets the `on_responses` hook.
    #[must_use]
    pub fn with_responses(mut self, f: impl Fn(&[Response]) + Send + Sync + 'static) -> Self {
        self.responses = Some(Box::new(f));
        self
    }

    /// Sets the `on_error` hook.
    #[must_use]
    pub fn with_error(mut self, f: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Sets the `on_close` hook.
    #[must_use]
    pub fn with_close(mut self, f: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.close = Some(Box::new(f));
        self
    }

    /// Sets the `on_transport_failure` hook.
    #[must_use]
    pub fn with_transport_failure(
        mut self,
        f: impl Fn(&TransportEvent) + Send + Sync + 'static,
    ) -> Self {
        self.transport_failure = Some(Box::new(f));
        self
    }

    /// Wraps the callbacks for attaching to requests.
    #[inline]
    #[must_use]
    pub fn shared(self) -> SharedListener {
        Arc::new(self)
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("open", &self.open.is_some())
            .field("response", &self.response.is_some())
            .field("responses", &self.responses.is_some())
            .field("error", &self.error.is_some())
            .field("close", &self.close.is_some())
            .field("transport_failure", &self.transport_failure.is_some())
            .finish()
    }
}

impl Listener for Callbacks {
    fn on_open(&self, response: &Response) {
        if let Some(f) = &self.open {
            f(response);
        }
    }

    fn on_response(&self, response: &Response) {
        if let Some(f) = &self.response {
            f(response);
        }
    }

    fn on_responses(&self, responses: &[Response]) {
        if let Some(f) = &self.responses {
            f(responses);
        }
    }

    fn on_error(&self, response: &Response) {
        if let Some(f) = &self.error {
            f(response);
        }
    }

    fn on_close(&self, response: &Response) {
        if let Some(f) = &self.close {
            f(response);
        }
    }

    fn on_transport_failure(&self, event: &TransportEvent) {
        if let Some(f) = &self.transport_failure {
            f(event);
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Invokes listener hooks, containing panics.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Dispatcher {
    log_level: LogLevel,
}

impl Dispatcher {
    /// Creates a dispatcher reporting faults at the given verbosity.
    #[inline]
    pub(crate) fn new(log_level: LogLevel) -> Self {
        Self { log_level }
    }

    pub(crate) fn open(&self, listener: &dyn Listener, response: &Response) {
        self.guard("on_open", || listener.on_open(response));
    }

    /// Routes by status code: below 400 to `on_response`, else `on_error`.
    pub(crate) fn response(&self, listener: &dyn Listener, response: &Response) {
        if response.is_success() {
            self.guard("on_response", || listener.on_response(response));
        } else {
            self.error(listener, response);
        }
    }

    pub(crate) fn responses(&self, listener: &dyn Listener, responses: &[Response]) {
        self.guard("on_responses", || listener.on_responses(responses));
    }

    pub(crate) fn error(&self, listener: &dyn Listener, response: &Response) {
        self.guard("on_error", || listener.on_error(response));
    }

    pub(crate) fn close(&self, listener: &dyn Listener, response: &Response) {
        self.guard("on_close", || listener.on_close(response));
    }

    pub(crate) fn transport_failure(&self, listener: &dyn Listener, event: &TransportEvent) {
        self.guard("on_transport_failure", || {
            listener.on_transport_failure(event);
        });
    }

    fn guard(&self, hook: &'static str, f: impl FnOnce()) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
            let fault = Error::listener_fault(hook, panic_message(payload.as_ref()));
            match self.log_level {
                LogLevel::Debug => warn!(error = %fault, "Listener fault contained"),
                LogLevel::Info => debug!(hook, "Listener fault contained"),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Recording transport for session tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::{PushRequest, SubscribeRequest, Transport, TransportHandle};

/// Everything the session asked the transport to do.
#[derive(Debug, Default)]
pub(crate) struct Log {
    pub subscriptions: Vec<SubscribeRequest>,
    pub pushes: Vec<PushRequest>,
    pub reopens: Vec<(String, String)>,
    pub closes: usize,
    /// Set to simulate the transport giving up on its own.
    pub dropped: bool,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct MockTransport {
    pub log: Arc<Mutex<Log>>,
    pub fail_pushes: bool,
    pub fail_subscribe: bool,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn pushed(&self) -> Vec<String> {
        self.log.lock().pushes.iter().map(|p| p.data.clone()).collect()
    }
}

impl Transport for MockTransport {
    type Handle = MockHandle;

    fn subscribe(&mut self, request: SubscribeRequest) -> Result<MockHandle> {
        if self.fail_subscribe {
            return Err(Error::connection("subscribe refused"));
        }
        self.log.lock().subscriptions.push(request);
        Ok(MockHandle {
            log: Arc::clone(&self.log),
            fail_pushes: self.fail_pushes,
            closed: false,
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockHandle {
    log: Arc<Mutex<Log>>,
    fail_pushes: bool,
    closed: bool,
}

impl TransportHandle for MockHandle {
    fn push(&mut self, request: PushRequest) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if self.fail_pushes {
            return Err(Error::connection("push refused"));
        }
        self.log.lock().pushes.push(request);
        Ok(())
    }

    fn reopen_with(&mut self, method: &str, data: String) {
        self.log.lock().reopens.push((method.to_string(), data));
    }

    fn close(&mut self) {
        self.closed = true;
        self.log.lock().closes += 1;
    }

    fn is_closed(&self) -> bool {
        self.closed || self.log.lock().dropped
    }
}

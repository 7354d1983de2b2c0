//! In-memory backend. Drives the connectivity service without a radio, for the `--demo` mode
//! and for tests. A [`MockController`] scripts connect outcomes and injects link events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::future::{self, BoxFuture, FutureExt};
use futures::StreamExt;
use log::debug;

use crate::device::transport::{Connection, Link, Transport};
use crate::device::types::{DeviceHandle, LinkEvent};
use crate::error::{ConnectError, DeviceError};

#[derive(Default)]
struct MockInner {
    // consumed front to back, one per connect attempt; empty means success
    outcomes: VecDeque<Result<DeviceHandle, ConnectError>>,
    // attempts that never complete, for testing cancellation
    hang_next_open: bool,
    link_events: Option<UnboundedSender<LinkEvent>>,
    writes: Vec<String>,
    fail_writes: bool,
    // close() never completes, like a platform disconnect that hangs
    hang_close: bool,
    opens: usize,
    closes: usize,
    // hanging attempts dropped before completing
    abandoned: usize,
}

// Stands in for the radio resources a real attempt holds while pending.
struct PendingOpen {
    inner: Arc<Mutex<MockInner>>,
}

impl Drop for PendingOpen {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.abandoned += 1;
        }
    }
}

pub fn demo_device() -> DeviceHandle {
    DeviceHandle {
        id: "98:D3:31:F5:0A:12".to_string(),
        name: "HC-05".to_string(),
    }
}

#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    pub fn new() -> (Self, MockController) {
        let transport = MockTransport::default();
        let controller = MockController { inner: transport.inner.clone() };
        (transport, controller)
    }
}

impl Transport for MockTransport {
    fn open(&self) -> BoxFuture<'static, Result<Connection, ConnectError>> {
        let mut inner = self.inner.lock().expect("Failed to lock MockTransport inner");
        inner.opens += 1;

        if inner.hang_next_open {
            inner.hang_next_open = false;
            let pending_open = PendingOpen { inner: self.inner.clone() };
            return async move {
                let _pending_open = pending_open;
                future::pending::<Result<Connection, ConnectError>>().await
            }.boxed();
        }

        let outcome = inner.outcomes.pop_front().unwrap_or_else(|| Ok(demo_device()));
        let result = outcome.map(|device| {
            let (tx, rx) = unbounded();
            inner.link_events = Some(tx);

            Connection {
                device,
                link: Arc::new(MockLink { inner: self.inner.clone() }),
                events: rx.boxed(),
            }
        });

        future::ready(result).boxed()
    }
}

struct MockLink {
    inner: Arc<Mutex<MockInner>>,
}

impl Link for MockLink {
    fn write(&self, payload: Vec<u8>) -> BoxFuture<'static, Result<(), DeviceError>> {
        let mut inner = self.inner.lock().expect("Failed to lock MockTransport inner");

        let result = if inner.fail_writes {
            Err(DeviceError::LinkClosed)
        } else {
            let text = String::from_utf8_lossy(&payload).into_owned();
            debug!("mock write {:?}", text);
            inner.writes.push(text);
            Ok(())
        };

        future::ready(result).boxed()
    }

    fn close(&self) -> BoxFuture<'static, Result<(), DeviceError>> {
        let mut inner = self.inner.lock().expect("Failed to lock MockTransport inner");
        inner.closes += 1;
        inner.link_events = None;

        if inner.hang_close {
            return future::pending().boxed();
        }
        future::ready(Ok(())).boxed()
    }
}

/// Test/demo side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockController {
    inner: Arc<Mutex<MockInner>>,
}

impl MockController {
    fn with_inner<R>(&self, f: impl FnOnce(&mut MockInner) -> R) -> R {
        let mut inner = self.inner.lock().expect("Failed to lock MockTransport inner");
        f(&mut inner)
    }

    pub fn script_connect(&self, outcome: Result<DeviceHandle, ConnectError>) {
        self.with_inner(|inner| inner.outcomes.push_back(outcome));
    }

    pub fn hang_next_connect(&self) {
        self.with_inner(|inner| inner.hang_next_open = true);
    }

    pub fn hang_close(&self, hang: bool) {
        self.with_inner(|inner| inner.hang_close = hang);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.with_inner(|inner| inner.fail_writes = fail);
    }

    fn push_event(&self, event: LinkEvent) -> bool {
        self.with_inner(|inner| match &inner.link_events {
            Some(sender) => sender.unbounded_send(event).is_ok(),
            None => false,
        })
    }

    /// Deliver a notification from the peripheral. Returns false when no link is open.
    pub fn push_data(&self, data: &str) -> bool {
        self.push_event(LinkEvent::Data(data.as_bytes().to_vec()))
    }

    /// Simulate the peer closing the link.
    pub fn drop_link(&self) -> bool {
        let pushed = self.push_event(LinkEvent::Dropped);
        self.with_inner(|inner| inner.link_events = None);
        pushed
    }

    /// Simulate an unexpected I/O failure on the link.
    pub fn fail_link(&self, reason: &str) -> bool {
        self.push_event(LinkEvent::Failed(reason.to_string()))
    }

    pub fn writes(&self) -> Vec<String> {
        self.with_inner(|inner| inner.writes.clone())
    }

    pub fn opens(&self) -> usize {
        self.with_inner(|inner| inner.opens)
    }

    pub fn closes(&self) -> usize {
        self.with_inner(|inner| inner.closes)
    }

    /// Number of connect attempts that were dropped while still pending.
    pub fn abandoned(&self) -> usize {
        self.with_inner(|inner| inner.abandoned)
    }
}

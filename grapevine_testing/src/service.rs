//! In-memory directory service.
//!
//! Each call to [`Connector::open`] on a [`MockConnector`] creates a fresh
//! connection and makes it the service's *current* one. Frames written by
//! the client are decoded and recorded; frames pushed by the test are
//! delivered on the current connection only.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use futures::{StreamExt, channel::mpsc};
use grapevine::{Connector, Frame, Transport, TransportError, TransportEvent, TransportSink};
use serde_json::Value;
use tokio::sync::Notify;

/// How long [`MockService::next_sent`] waits before failing the test.
pub const SENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct State {
    sent: Vec<Frame>,
    cursors: HashMap<String, usize>,
    current: Option<mpsc::UnboundedSender<TransportEvent>>,
    opens: usize,
    closes: usize,
    fail_opens: usize,
    fail_sends: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    sent_changed: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Test-side handle to the in-memory service.
#[derive(Clone, Default)]
pub struct MockService {
    shared: Arc<Shared>,
}

/// [`Connector`] that opens connections to a [`MockService`].
#[derive(Clone)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

struct MockSink {
    shared: Arc<Shared>,
    closed: bool,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let frame = Frame::decode(&text).map_err(|e| TransportError::Send(e.to_string()))?;
        {
            let mut state = self.shared.state();
            if state.fail_sends {
                return Err(TransportError::Send("connection reset".to_owned()));
            }
            state.sent.push(frame);
        }
        self.shared.sent_changed.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.shared.state().closes += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &str) -> Result<Transport, TransportError> {
        let mut state = self.shared.state();
        state.opens += 1;
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(TransportError::Open {
                url: url.to_owned(),
                reason: "connection refused".to_owned(),
            });
        }
        let (tx, rx) = mpsc::unbounded();
        state.current = Some(tx);
        Ok(Transport {
            sink: Box::new(MockSink {
                shared: Arc::clone(&self.shared),
                closed: false,
            }),
            events: rx.boxed(),
        })
    }
}

impl MockService {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Connector to hand to the client under test.
    #[must_use]
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of connection attempts, successful or not.
    #[must_use]
    pub fn opens(&self) -> usize { self.shared.state().opens }

    /// Number of connections the client has closed.
    #[must_use]
    pub fn closes(&self) -> usize { self.shared.state().closes }

    /// Refuse the next `count` connection attempts.
    pub fn fail_opens(&self, count: usize) { self.shared.state().fail_opens = count; }

    /// Make every subsequent write fail.
    pub fn fail_sends(&self, fail: bool) { self.shared.state().fail_sends = fail; }

    /// Every frame the client has sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Frame> { self.shared.state().sent.clone() }

    /// Every frame with `event` the client has sent so far.
    #[must_use]
    pub fn sent_with(&self, event: &str) -> Vec<Frame> {
        self.shared
            .state()
            .sent
            .iter()
            .filter(|frame| frame.event == event)
            .cloned()
            .collect()
    }

    /// Wait for the next not-yet-seen frame with `event`.
    ///
    /// Each call consumes one frame, so consecutive calls return successive
    /// frames for the same event.
    ///
    /// # Panics
    ///
    /// Panics if no such frame is sent within [`SENT_TIMEOUT`].
    pub async fn next_sent(&self, event: &str) -> Frame {
        let wait = async {
            loop {
                let notified = self.shared.sent_changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if let Some(frame) = self.take_sent(event) {
                    return frame;
                }
                notified.await;
            }
        };
        match tokio::time::timeout(SENT_TIMEOUT, wait).await {
            Ok(frame) => frame,
            Err(_) => panic!("client never sent {event:?}; sent: {:?}", self.sent()),
        }
    }

    fn take_sent(&self, event: &str) -> Option<Frame> {
        let mut state = self.shared.state();
        let start = state.cursors.get(event).copied().unwrap_or(0);
        let (index, frame) = state
            .sent
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, frame)| frame.event == event)
            .map(|(index, frame)| (index, frame.clone()))?;
        state.cursors.insert(event.to_owned(), index + 1);
        Some(frame)
    }

    /// Whether a connection is currently open on the service side.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared
            .state()
            .current
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn deliver(&self, event: TransportEvent) -> bool {
        self.shared
            .state()
            .current
            .as_ref()
            .is_some_and(|tx| tx.unbounded_send(event).is_ok())
    }

    /// Deliver raw text on the current connection.
    pub fn push_raw(&self, text: impl Into<String>) -> bool {
        self.deliver(TransportEvent::Message(text.into()))
    }

    /// Deliver a JSON frame on the current connection.
    pub fn push(&self, frame: Value) -> bool { self.push_raw(frame.to_string()) }

    /// Deliver `frame` on the current connection.
    ///
    /// # Panics
    ///
    /// Panics if the frame cannot be encoded.
    pub fn push_frame(&self, frame: &Frame) -> bool {
        self.push_raw(frame.encode().expect("encode frame"))
    }

    /// Answer `request` successfully, echoing its event and reference.
    pub fn reply(&self, request: &Frame, payload: Option<Value>) -> bool {
        let mut frame = Frame::new(request.event.clone());
        frame.reference = request.reference.clone();
        frame.status = Some("success".to_owned());
        frame.payload = payload;
        self.push_frame(&frame)
    }

    /// Answer `request` with an error code.
    pub fn reply_error(&self, request: &Frame, code: &str) -> bool {
        let mut frame = Frame::new(request.event.clone());
        frame.reference = request.reference.clone();
        frame.status = Some("failure".to_owned());
        frame.error = Some(code.to_owned());
        self.push_frame(&frame)
    }

    /// Accept the client's credentials.
    pub fn accept_auth(&self) -> bool {
        let mut frame = Frame::new("authenticate");
        frame.status = Some("success".to_owned());
        self.push_frame(&frame)
    }

    /// Send a heartbeat probe.
    pub fn heartbeat(&self) -> bool { self.push_frame(&Frame::new("heartbeat")) }

    /// Close the current connection from the service side.
    pub fn close_current(&self) -> bool {
        let delivered = self.deliver(TransportEvent::Closed);
        self.shared.state().current = None;
        delivered
    }

    /// Fail the current connection with a transport error.
    pub fn error_current(&self, reason: &str) -> bool {
        self.deliver(TransportEvent::Error(TransportError::Connection(
            reason.to_owned(),
        )))
    }
}

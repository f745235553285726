//! Request/response correlation over the shared connection.
//!
//! Outbound requests are stamped with a fresh [`CorrelationId`] and recorded
//! in a [`RequestCorrelator`] under a [`CorrelationKey`] built from the event
//! tag and the id. Inbound frames carrying the same key fulfil the waiting
//! caller exactly once. The original request payload is retained alongside
//! the waiter because error frames do not echo it back.

use std::fmt;

use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::{error::ClientError, frame::Frame};

/// Access and mutate correlation identifiers on frames.
pub trait CorrelatableFrame {
    /// Return the correlation identifier associated with this frame, if any.
    fn correlation_id(&self) -> Option<&str>;

    /// Set or clear the correlation identifier.
    fn set_correlation_id(&mut self, correlation_id: Option<String>);
}

/// Opaque, globally unique request reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self { Self(Uuid::new_v4().to_string()) }

    /// Borrow the identifier as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<CorrelationId> for String {
    fn from(value: CorrelationId) -> Self { value.0 }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Structured key pairing a response with its request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    event: String,
    reference: Option<String>,
}

impl CorrelationKey {
    /// Build a key from an event tag and an optional reference.
    #[must_use]
    pub fn new(event: impl Into<String>, reference: Option<String>) -> Self {
        Self {
            event: event.into(),
            reference,
        }
    }

    /// Event tag half of the key.
    #[must_use]
    pub fn event(&self) -> &str { &self.event }

    /// Reference half of the key.
    #[must_use]
    pub fn reference(&self) -> Option<&str> { self.reference.as_deref() }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.event, self.reference.as_deref().unwrap_or(""))
    }
}

/// Errors raised while registering waiters.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    /// A waiter was already registered under this key.
    #[error("a request is already waiting on {0}")]
    DuplicateWaiter(CorrelationKey),
}

pub(crate) type Reply = Result<Frame, ClientError>;

/// A request awaiting its response.
pub(crate) struct PendingRequest {
    payload: Option<Value>,
    reply: oneshot::Sender<Reply>,
}

/// Table of in-flight requests.
#[derive(Default)]
pub struct RequestCorrelator {
    pending: DashMap<CorrelationKey, PendingRequest>,
}

impl fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl RequestCorrelator {
    /// Register a single-use waiter for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::DuplicateWaiter`] if `key` already has a
    /// waiter; the existing waiter is left untouched.
    pub(crate) fn register(
        &self,
        key: CorrelationKey,
        payload: Option<Value>,
    ) -> Result<oneshot::Receiver<Reply>, CorrelationError> {
        match self.pending.entry(key) {
            Entry::Occupied(entry) => Err(CorrelationError::DuplicateWaiter(entry.key().clone())),
            Entry::Vacant(entry) => {
                let (reply, rx) = oneshot::channel();
                entry.insert(PendingRequest { payload, reply });
                Ok(rx)
            }
        }
    }

    /// Payload originally sent with the request waiting on `key`.
    pub(crate) fn payload_for(&self, key: &CorrelationKey) -> Option<Value> {
        self.pending
            .get(key)
            .and_then(|pending| pending.payload.clone())
    }

    /// Fulfil the waiter matching `frame`, if any.
    ///
    /// Frames carrying an `error` reject the waiter with
    /// [`ClientError::Protocol`]. Returns `true` when a waiter was found.
    pub(crate) fn resolve(&self, frame: &Frame) -> bool {
        let key = frame.correlation_key();
        let Some((_, pending)) = self.pending.remove(&key) else {
            return false;
        };
        let reply = match &frame.error {
            Some(code) => Err(ClientError::Protocol {
                event: frame.event.clone(),
                code: code.clone(),
            }),
            None => Ok(frame.clone()),
        };
        if pending.reply.send(reply).is_err() {
            debug!(%key, "requester dropped before response arrived");
        }
        true
    }

    /// Reject and remove the waiter on `key`.
    pub(crate) fn reject(&self, key: &CorrelationKey, error: ClientError) -> bool {
        match self.pending.remove(key) {
            Some((_, pending)) => {
                let _ = pending.reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Reject every pending request, returning how many were released.
    pub(crate) fn reject_all(&self, error: impl Fn() -> ClientError) -> usize {
        let keys: Vec<CorrelationKey> = self.pending.iter().map(|e| e.key().clone()).collect();
        keys.iter().filter(|key| self.reject(key, error())).count()
    }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn len(&self) -> usize { self.pending.len() }

    /// Whether no requests are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn correlator() -> RequestCorrelator { RequestCorrelator::default() }

    fn key(reference: &str) -> CorrelationKey {
        CorrelationKey::new("tells/send", Some(reference.to_owned()))
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(CorrelationId::generate(), CorrelationId::generate());
    }

    #[test]
    fn key_displays_event_and_reference() {
        assert_eq!(key("7").to_string(), "tells/send:7");
        assert_eq!(CorrelationKey::new("heartbeat", None).to_string(), "heartbeat:");
    }

    #[rstest]
    #[tokio::test]
    async fn matching_frame_resolves_waiter(correlator: RequestCorrelator) {
        let rx = correlator.register(key("1"), None).expect("register");
        let response = Frame::new("tells/send").with_reference("1");

        assert!(correlator.resolve(&response));
        let frame = rx.await.expect("reply").expect("success");
        assert_eq!(frame, response);
        assert!(correlator.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn error_frame_rejects_with_code(correlator: RequestCorrelator) {
        let rx = correlator.register(key("2"), None).expect("register");
        let mut response = Frame::new("tells/send").with_reference("2");
        response.error = Some("player offline".to_owned());

        assert!(correlator.resolve(&response));
        let err = rx.await.expect("reply").expect_err("protocol error");
        assert_eq!(err.protocol_code(), Some("player offline"));
    }

    #[rstest]
    fn unrelated_reference_is_ignored(correlator: RequestCorrelator) {
        let _rx = correlator.register(key("3"), None).expect("register");
        assert!(!correlator.resolve(&Frame::new("tells/send").with_reference("4")));
        assert!(!correlator.resolve(&Frame::new("games/status").with_reference("3")));
        assert_eq!(correlator.len(), 1);
    }

    #[rstest]
    fn second_waiter_on_same_key_is_refused(correlator: RequestCorrelator) {
        let _first = correlator.register(key("5"), None).expect("register");
        let err = correlator.register(key("5"), None).expect_err("duplicate");
        assert_eq!(err, CorrelationError::DuplicateWaiter(key("5")));
        assert_eq!(correlator.len(), 1);
    }

    #[rstest]
    fn payload_is_retained_until_resolution(correlator: RequestCorrelator) {
        let payload = json!({"to_game": "Agora", "to_name": "Bob"});
        let _rx = correlator
            .register(key("6"), Some(payload.clone()))
            .expect("register");
        assert_eq!(correlator.payload_for(&key("6")), Some(payload));

        correlator.resolve(&Frame::new("tells/send").with_reference("6"));
        assert_eq!(correlator.payload_for(&key("6")), None);
    }

    #[rstest]
    #[tokio::test]
    async fn reject_all_releases_every_waiter(correlator: RequestCorrelator) {
        let first = correlator.register(key("a"), None).expect("register");
        let second = correlator.register(key("b"), None).expect("register");

        assert_eq!(correlator.reject_all(|| ClientError::ConnectionClosed), 2);
        for rx in [first, second] {
            let err = rx.await.expect("reply").expect_err("rejected");
            assert!(matches!(err, ClientError::ConnectionClosed));
        }
        assert!(correlator.is_empty());
    }
}

//! Unsolicited events delivered to subscribers.
//!
//! The client publishes a [`ClientEvent`] for every push notification,
//! applied directory delta and connection-wide fault. Subscribers hold a
//! [`Subscription`]; dropping it (or calling [`Subscription::unsubscribe`])
//! ends delivery. Events published while nobody is subscribed are discarded.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

use crate::{
    directory::PlayerRef,
    error::ClientError,
    frame::Frame,
    protocol::{Broadcast, Tell},
};

/// Notification published to subscribers.
#[derive(Clone, Debug)]
pub enum ClientEvent {
    /// The directory service accepted the credentials.
    Authenticated,
    /// A message arrived on a subscribed channel.
    Broadcast(Broadcast),
    /// A tell arrived for a local player.
    Tell(Tell),
    /// A remote game connected.
    GameConnected(String),
    /// A remote game disconnected.
    GameDisconnected(String),
    /// A remote player signed in.
    PlayerSignedIn(PlayerRef),
    /// A remote player signed out.
    PlayerSignedOut(PlayerRef),
    /// The directory service announced a restart.
    Restart { downtime: Option<u64> },
    /// The connection dropped; a reconnect may follow.
    Disconnected,
    /// A connection-wide fault with no specific waiter.
    ConnectionError(Arc<ClientError>),
    /// Every inbound frame, after it has been handled.
    Frame(Frame),
}

/// Receiving end of the client's event stream.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ClientEvent>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the client is dropped.
    ///
    /// Events missed because the subscriber fell behind are skipped with a
    /// warning.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "subscriber lagged"),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Return the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "subscriber lagged"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {}
}

/// Fan-out point for [`ClientEvent`]s.
#[derive(Debug)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn publish(&self, event: ClientEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize { self.tx.receiver_count() }
}

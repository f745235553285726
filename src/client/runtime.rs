//! Public client handle and the shared session state behind it.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, atomic::AtomicU64},
};

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tokio::{sync::Mutex as AsyncMutex, task::JoinHandle};

use super::{Delta, lock};
use crate::{
    config::ClientConfig,
    correlation::RequestCorrelator,
    directory::{Directory, PlayerRef, RemoteGame},
    error::Result,
    frame::Frame,
    protocol::{
        CHANNELS_SEND,
        CHANNELS_SUBSCRIBE,
        CHANNELS_UNSUBSCRIBE,
        ChannelMessage,
        PLAYERS_SIGN_IN,
        PLAYERS_SIGN_OUT,
        TELLS_SEND,
        TellRequest,
    },
    push::{EventBus, Subscription},
    session::{LocalRoster, SessionState},
    transport::{Connector, TransportSink, WebSocketConnector},
};

/// Timer and task handles owned by the session.
#[derive(Default)]
pub(crate) struct Timers {
    pub(crate) reconnect: Option<JoinHandle<()>>,
    pub(crate) watchdog: Option<JoinHandle<()>>,
    pub(crate) reader: Option<JoinHandle<()>>,
}

impl Timers {
    pub(crate) fn abort_all(&mut self) {
        for handle in [
            self.reconnect.take(),
            self.watchdog.take(),
            self.reader.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

/// Write half of the current connection tagged with its epoch.
pub(crate) struct LiveSink {
    pub(crate) epoch: u64,
    pub(crate) sink: Box<dyn TransportSink>,
}

/// Session state shared between the handle and background tasks.
pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) roster: Mutex<LocalRoster>,
    pub(crate) directory: Mutex<Directory>,
    pub(crate) correlator: RequestCorrelator,
    pub(crate) events: EventBus,
    pub(crate) sink: AsyncMutex<Option<LiveSink>>,
    /// Incremented whenever a connection is opened or torn down, so tasks
    /// belonging to an older connection can tell they are stale.
    pub(crate) epoch: AtomicU64,
    pub(crate) timers: Mutex<Timers>,
    /// Deltas waiting on an in-flight recovery pull, keyed by game.
    pub(crate) pulls: Mutex<HashMap<String, Vec<Delta>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) { lock(&self.timers).abort_all(); }
}

/// Handle to a gossip session.
///
/// Clones share the same session.
///
/// # Examples
///
/// ```no_run
/// use grapevine::{ClientConfig, ClientEvent, GossipClient};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), grapevine::ClientError> {
/// let client = GossipClient::websocket(ClientConfig::new("client-id", "client-secret"));
/// let mut events = client.subscribe();
/// client.connect().await?;
/// client.add_player("Alice").await?;
///
/// while let Some(event) = events.recv().await {
///     if let ClientEvent::Tell(tell) = event {
///         println!("{}@{}: {}", tell.from_name, tell.from_game, tell.message);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GossipClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for GossipClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GossipClient")
            .field("url", &self.inner.config.url_value())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl GossipClient {
    /// Create a client that opens connections through `connector`.
    ///
    /// No I/O happens until [`connect`](Self::connect) is called.
    #[must_use]
    pub fn new(config: ClientConfig, connector: impl Connector) -> Self {
        let events = EventBus::new(config.event_capacity_value());
        Self {
            inner: Arc::new(ClientInner {
                config,
                connector: Arc::new(connector),
                state: Mutex::new(SessionState::Disconnected),
                roster: Mutex::new(LocalRoster::default()),
                directory: Mutex::new(Directory::default()),
                correlator: RequestCorrelator::default(),
                events,
                sink: AsyncMutex::new(None),
                epoch: AtomicU64::new(0),
                timers: Mutex::new(Timers::default()),
                pulls: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a client that connects over WebSocket.
    #[must_use]
    pub fn websocket(config: ClientConfig) -> Self { Self::new(config, WebSocketConnector) }

    /// Subscribe to pushed events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription { self.inner.events.subscribe() }

    /// Connect, authenticate and pull the initial directory.
    ///
    /// Resolves once the configured status wait has elapsed after the
    /// initial `games/status` and `players/status` pulls were sent, so the
    /// directory has had time to fill.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::MissingCredential`] before any I/O if a
    /// credential is absent, [`crate::ClientError::InvalidState`] if a
    /// connection is already underway, or a transport error if the
    /// connection could not be opened (a reconnect is then scheduled).
    pub async fn connect(&self) -> Result<()> { Arc::clone(&self.inner).establish().await }

    /// Sign out local players, close the connection and cancel timers.
    ///
    /// Pending requests are rejected with
    /// [`crate::ClientError::ConnectionClosed`]. Calling `close` again is a
    /// no-op.
    pub async fn close(&self) { self.inner.close().await; }

    /// Send a correlated request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Protocol`] if the service answers with
    /// an error code, or a transport error if the request could not be sent
    /// or the connection dropped first.
    pub async fn request(&self, event: &str, payload: Option<Value>) -> Result<Frame> {
        self.inner.request(event, payload).await
    }

    /// Send a frame without waiting for any reply.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the frame could not be written.
    pub async fn notify(&self, event: &str, payload: Option<Value>) -> Result<()> {
        self.inner.notify(event, payload).await
    }

    /// Add a local player to the roster and announce the sign-in.
    ///
    /// The roster is updated even if the announcement fails, so the next
    /// heartbeat still reports the player.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn add_player(&self, name: &str) -> Result<Frame> {
        lock(&self.inner.roster).insert(name);
        self.request(PLAYERS_SIGN_IN, Some(json!({ "name": name })))
            .await
    }

    /// Remove a local player from the roster and announce the sign-out.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn remove_player(&self, name: &str) -> Result<Frame> {
        lock(&self.inner.roster).remove(name);
        self.request(PLAYERS_SIGN_OUT, Some(json!({ "name": name })))
            .await
    }

    /// Send a tell from a local player to `to_name@to_game`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request). Errors such as `"player offline"`
    /// also update the cached directory.
    pub async fn send_tell(
        &self,
        from_name: &str,
        to_game: &str,
        to_name: &str,
        message: &str,
    ) -> Result<Frame> {
        let tell = TellRequest {
            from_name: from_name.to_owned(),
            to_game: to_game.to_owned(),
            to_name: to_name.to_owned(),
            sent_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message: message.to_owned(),
        };
        let payload = serde_json::to_value(tell).map_err(crate::ClientError::Encode)?;
        self.request(TELLS_SEND, Some(payload)).await
    }

    /// Post a message from a local player to a channel.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn broadcast(&self, channel: &str, name: &str, message: &str) -> Result<Frame> {
        let payload = serde_json::to_value(ChannelMessage {
            channel: channel.to_owned(),
            name: name.to_owned(),
            message: message.to_owned(),
        })
        .map_err(crate::ClientError::Encode)?;
        self.request(CHANNELS_SEND, Some(payload)).await
    }

    /// Subscribe the session to an additional channel.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn subscribe_channel(&self, channel: &str) -> Result<Frame> {
        self.request(CHANNELS_SUBSCRIBE, Some(json!({ "channel": channel })))
            .await
    }

    /// Unsubscribe the session from a channel.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn unsubscribe_channel(&self, channel: &str) -> Result<Frame> {
        self.request(CHANNELS_UNSUBSCRIBE, Some(json!({ "channel": channel })))
            .await
    }

    /// Resolve `name@game` against the cached directory.
    #[must_use]
    pub fn find_player(&self, identifier: &str) -> Option<PlayerRef> {
        lock(&self.inner.directory).find_player(identifier)
    }

    /// Whether the session is authenticated and receiving heartbeats.
    #[must_use]
    pub fn is_alive(&self) -> bool { self.state() == SessionState::Alive }

    /// Current lifecycle state of the session.
    #[must_use]
    pub fn state(&self) -> SessionState { self.inner.state() }

    /// Snapshot of every cached remote game.
    #[must_use]
    pub fn games(&self) -> Vec<RemoteGame> { lock(&self.inner.directory).snapshot() }

    /// Snapshot of one cached remote game.
    #[must_use]
    pub fn game(&self, name: &str) -> Option<RemoteGame> {
        lock(&self.inner.directory).get(name).cloned()
    }

    /// Names of local players currently on the roster.
    #[must_use]
    pub fn roster(&self) -> Vec<String> { lock(&self.inner.roster).names() }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.inner.correlator.len() }
}

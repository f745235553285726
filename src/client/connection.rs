//! Connection lifecycle: open, authenticate, heartbeat watchdog, teardown
//! and reconnect.
//!
//! Every opened connection gets a fresh epoch. The reader task, the
//! watchdog and the sink all carry the epoch they were created for, and a
//! teardown only proceeds if its epoch is still current. This keeps a late
//! event from an old connection from tearing down its replacement, and
//! guarantees at most one teardown (and hence one reconnect timer) per
//! connection.

use std::sync::{
    Arc,
    Weak,
    atomic::Ordering,
};

use futures::{StreamExt, future::BoxFuture};
use serde_json::json;
use tracing::{Instrument, debug, info, info_span, warn};

use super::{ClientInner, lock, runtime::LiveSink};
use crate::{
    error::{ClientError, Result},
    frame::Frame,
    metrics,
    protocol::{AUTHENTICATE, GAMES_STATUS, HEARTBEAT, PLAYERS_SIGN_OUT, PLAYERS_STATUS},
    push::ClientEvent,
    router,
    session::SessionState,
    transport::{TransportError, TransportEvent, TransportEvents},
};

/// Why a connection is being torn down.
#[derive(Debug)]
pub(crate) enum TeardownReason {
    /// The peer closed the connection.
    PeerClosed,
    /// The transport reported an error.
    Transport(TransportError),
    /// Writing a frame failed.
    SendFailed(String),
    /// No heartbeat arrived within the watchdog interval.
    WatchdogExpired,
    /// The service announced a restart.
    Restart,
    /// The service rejected the credentials.
    AuthenticationFailed(String),
}

impl TeardownReason {
    fn reconnects(&self) -> bool { !matches!(self, Self::AuthenticationFailed(_)) }

    fn into_error(self) -> Option<ClientError> {
        match self {
            Self::PeerClosed | Self::Restart => None,
            Self::Transport(error) => Some(ClientError::Transport(error)),
            Self::SendFailed(reason) => Some(ClientError::Transport(TransportError::Send(reason))),
            Self::WatchdogExpired => Some(ClientError::Transport(TransportError::Connection(
                "heartbeat watchdog expired".to_owned(),
            ))),
            Self::AuthenticationFailed(reason) => Some(ClientError::AuthenticationFailed(reason)),
        }
    }
}

impl ClientInner {
    pub(crate) fn state(&self) -> SessionState { *lock(&self.state) }

    pub(crate) fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *lock(&self.state), state);
        if previous != state {
            debug!(from = %previous, to = %state, "session state changed");
        }
    }

    pub(crate) fn current_epoch(&self) -> u64 { self.epoch.load(Ordering::SeqCst) }

    /// Open a connection, authenticate and pull the initial directory.
    ///
    /// Boxed so the reconnect timer can spawn it from inside the lifecycle
    /// it drives.
    pub(crate) fn establish(self: Arc<Self>) -> BoxFuture<'static, Result<()>> {
        let span = info_span!("client.connect", url = %self.config.url_value());
        Box::pin(
            async move {
                self.config.validate()?;
                {
                    let mut state = lock(&self.state);
                    if state.is_active() {
                        return Err(ClientError::InvalidState(*state));
                    }
                    *state = SessionState::Connecting;
                }
                if let Some(handle) = lock(&self.timers).reconnect.take() {
                    handle.abort();
                }

                let transport = match self.connector.open(self.config.url_value()).await {
                    Ok(transport) => transport,
                    Err(error) => {
                        warn!(error = %error, "failed to open connection");
                        self.events.publish(ClientEvent::ConnectionError(Arc::new(
                            ClientError::Transport(TransportError::Connection(error.to_string())),
                        )));
                        self.set_state(SessionState::Disconnected);
                        self.schedule_reconnect();
                        return Err(error.into());
                    }
                };

                let epoch = {
                    let mut state = lock(&self.state);
                    if *state == SessionState::Connecting {
                        *state = SessionState::Authenticating;
                        Some(self.epoch.fetch_add(1, Ordering::SeqCst) + 1)
                    } else {
                        None
                    }
                };
                let Some(epoch) = epoch else {
                    // Closed while the transport was opening.
                    let mut sink = transport.sink;
                    let _ = sink.close().await;
                    return Err(ClientError::ConnectionClosed);
                };

                let superseded = self.sink.lock().await.replace(LiveSink {
                    epoch,
                    sink: transport.sink,
                });
                metrics::inc_connections();
                if let Some(mut stale) = superseded {
                    // Its teardown task will find the newer epoch and skip it.
                    debug!(epoch = stale.epoch, "closing superseded connection");
                    let _ = stale.sink.close().await;
                    metrics::dec_connections();
                }
                info!(epoch, "connection open");

                let reader = tokio::spawn(read_loop(Arc::downgrade(&self), epoch, transport.events));
                if let Some(stale) = lock(&self.timers).reader.replace(reader) {
                    stale.abort();
                }
                self.arm_watchdog(epoch);

                self.notify(AUTHENTICATE, Some(self.config.authenticate_payload()?))
                    .await?;
                for event in [GAMES_STATUS, PLAYERS_STATUS] {
                    let reply = self.start_request(event, None).await?;
                    tokio::spawn(async move {
                        if let Err(error) = super::messaging::await_reply(reply).await {
                            debug!(event, error = %error, "initial status pull failed");
                        }
                    });
                }

                tokio::time::sleep(self.config.status_wait_value()).await;
                Ok(())
            }
            .instrument(span),
        )
    }

    /// Arm (or re-arm) the heartbeat watchdog for `epoch`.
    pub(crate) fn arm_watchdog(self: &Arc<Self>, epoch: u64) {
        let weak = Arc::downgrade(self);
        let timeout = self.config.heartbeat_timeout_value();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            lock(&inner.timers).watchdog.take();
            warn!(epoch, ?timeout, "no heartbeat within watchdog interval");
            inner.teardown(epoch, TeardownReason::WatchdogExpired);
        });
        if let Some(previous) = lock(&self.timers).watchdog.replace(handle) {
            previous.abort();
        }
    }

    /// Handle an inbound `heartbeat`: mark the session alive, re-arm the
    /// watchdog and reply with the local roster.
    pub(crate) async fn on_heartbeat(self: &Arc<Self>, epoch: u64) {
        if self.current_epoch() != epoch {
            return;
        }
        self.set_state(SessionState::Alive);
        self.arm_watchdog(epoch);
        let players = lock(&self.roster).names();
        if let Err(error) = self.notify(HEARTBEAT, Some(json!({ "players": players }))).await {
            debug!(error = %error, "heartbeat reply failed");
        }
    }

    /// Handle the `authenticate` acknowledgement.
    pub(crate) fn on_authenticated(self: &Arc<Self>, epoch: u64, frame: &Frame) {
        if frame.is_failure() {
            let reason = frame
                .error
                .clone()
                .unwrap_or_else(|| "credentials rejected".to_owned());
            warn!(reason, "authentication rejected");
            self.teardown(epoch, TeardownReason::AuthenticationFailed(reason));
            return;
        }
        if self.current_epoch() == epoch {
            info!("authenticated");
            self.set_state(SessionState::Alive);
            self.events.publish(ClientEvent::Authenticated);
        }
    }

    /// Tear down the connection for `epoch`, if it is still current.
    ///
    /// Releases pending requests, closes the sink in the background and,
    /// unless credentials were rejected, schedules a reconnect.
    pub(crate) fn teardown(self: &Arc<Self>, epoch: u64, reason: TeardownReason) {
        if self
            .epoch
            .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        info!(epoch, ?reason, "connection lost");
        {
            let mut timers = lock(&self.timers);
            if let Some(watchdog) = timers.watchdog.take() {
                watchdog.abort();
            }
            if let Some(reader) = timers.reader.take() {
                reader.abort();
            }
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let mut guard = inner.sink.lock().await;
            if guard.as_ref().is_some_and(|live| live.epoch == epoch) {
                if let Some(mut live) = guard.take() {
                    drop(guard);
                    let _ = live.sink.close().await;
                    metrics::dec_connections();
                }
            }
        });

        let released = self.correlator.reject_all(|| ClientError::ConnectionClosed);
        if released > 0 {
            debug!(released, "pending requests released");
        }

        self.set_state(SessionState::Disconnected);
        self.events.publish(ClientEvent::Disconnected);
        let reconnects = reason.reconnects();
        if let Some(error) = reason.into_error() {
            self.events.publish(ClientEvent::ConnectionError(Arc::new(error)));
        }
        if reconnects {
            self.schedule_reconnect();
        }
    }

    /// Arm the single reconnect timer, replacing any armed one.
    pub(crate) fn schedule_reconnect(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let delay = self.config.reconnect_interval_value();
        metrics::inc_reconnects();
        self.set_state(SessionState::Reconnecting);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // Detach before reconnecting so `establish` does not abort us.
            lock(&inner.timers).reconnect.take();
            if inner.state() != SessionState::Reconnecting {
                return;
            }
            info!("reconnecting");
            if let Err(error) = inner.establish().await {
                debug!(error = %error, "reconnect attempt failed");
            }
        });
        if let Some(previous) = lock(&self.timers).reconnect.replace(handle) {
            previous.abort();
        }
    }

    /// Sign out local players, close the transport and cancel timers.
    pub(crate) async fn close(&self) {
        let span = info_span!("client.close");
        async {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            lock(&self.timers).abort_all();
            let previous = std::mem::replace(&mut *lock(&self.state), SessionState::Disconnected);

            let live = self.sink.lock().await.take();
            if let Some(mut live) = live {
                let roster = lock(&self.roster).names();
                for name in roster {
                    let frame = Frame::new(PLAYERS_SIGN_OUT).with_payload(json!({ "name": name }));
                    match frame.encode() {
                        Ok(text) => {
                            if live.sink.send(text).await.is_ok() {
                                metrics::inc_frames(metrics::Direction::Outbound);
                            }
                        }
                        Err(error) => debug!(error = %error, "failed to encode sign-out"),
                    }
                }
                let _ = live.sink.close().await;
                metrics::dec_connections();
            }

            self.correlator.reject_all(|| ClientError::ConnectionClosed);
            if previous != SessionState::Disconnected {
                info!(from = %previous, "session closed");
                self.events.publish(ClientEvent::Disconnected);
            }
        }
        .instrument(span)
        .await;
    }
}

/// Drain inbound events for one connection in arrival order.
async fn read_loop(weak: Weak<ClientInner>, epoch: u64, mut events: TransportEvents) {
    while let Some(event) = events.next().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.current_epoch() != epoch {
            return;
        }
        match event {
            TransportEvent::Message(text) => router::dispatch(&inner, epoch, &text).await,
            TransportEvent::Closed => {
                inner.teardown(epoch, TeardownReason::PeerClosed);
                return;
            }
            TransportEvent::Error(error) => {
                inner.teardown(epoch, TeardownReason::Transport(error));
                return;
            }
        }
    }
    if let Some(inner) = weak.upgrade() {
        inner.teardown(epoch, TeardownReason::PeerClosed);
    }
}

//! Classification and dispatch of inbound frames.
//!
//! Frames are handled strictly in arrival order by the connection's reader
//! task. Control events drive the connection lifecycle, pushes are published
//! to subscribers, snapshots and deltas update the directory, error
//! acknowledgements invalidate the entries they concern, and finally every
//! frame is offered to the request correlator.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    client::{ClientInner, Delta, TeardownReason, apply_delta, lock},
    error::ClientError,
    frame::Frame,
    metrics,
    protocol::{
        AUTHENTICATE,
        Broadcast,
        CHANNELS_BROADCAST,
        GAMES_CONNECT,
        GAMES_DISCONNECT,
        GAMES_STATUS,
        GameRef,
        GameStatus,
        HEARTBEAT,
        PLAYERS_SIGN_IN,
        PLAYERS_SIGN_OUT,
        PLAYERS_STATUS,
        PlayerPresence,
        PlayerStatus,
        RESTART,
        RestartNotice,
        TELLS_RECEIVE,
        Tell,
    },
    push::ClientEvent,
};

/// Handling category of an inbound event tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Route {
    Heartbeat,
    Authenticate,
    Restart,
    Broadcast,
    Tell,
    GameStatus,
    PlayerStatus,
    GameConnect,
    GameDisconnect,
    SignIn,
    SignOut,
    Other,
}

impl Route {
    pub(crate) fn classify(event: &str) -> Self {
        match event {
            HEARTBEAT => Self::Heartbeat,
            AUTHENTICATE => Self::Authenticate,
            RESTART => Self::Restart,
            CHANNELS_BROADCAST => Self::Broadcast,
            TELLS_RECEIVE => Self::Tell,
            GAMES_STATUS => Self::GameStatus,
            PLAYERS_STATUS => Self::PlayerStatus,
            GAMES_CONNECT => Self::GameConnect,
            GAMES_DISCONNECT => Self::GameDisconnect,
            PLAYERS_SIGN_IN => Self::SignIn,
            PLAYERS_SIGN_OUT => Self::SignOut,
            _ => Self::Other,
        }
    }
}

/// Decode a payload that must be present for the frame to be meaningful.
/// Acknowledgements of our own requests carry no payload and yield `None`.
fn payload<T: DeserializeOwned>(frame: &Frame) -> Result<Option<T>, ClientError> {
    if frame.payload.is_none() {
        return Ok(None);
    }
    frame.decode_payload().map(Some).map_err(ClientError::Decode)
}

/// Handle one inbound text frame.
pub(crate) async fn dispatch(inner: &Arc<ClientInner>, epoch: u64, text: &str) {
    metrics::inc_frames(metrics::Direction::Inbound);
    let frame = match Frame::decode(text) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(error = %error, "discarding malformed frame");
            inner
                .events
                .publish(ClientEvent::ConnectionError(Arc::new(ClientError::Decode(error))));
            return;
        }
    };
    debug!(event = %frame.event, reference = ?frame.reference, "frame received");

    if let Err(error) = route(inner, epoch, &frame).await {
        warn!(event = %frame.event, error = %error, "failed to handle frame");
        inner
            .events
            .publish(ClientEvent::ConnectionError(Arc::new(error)));
    }

    if let Some(code) = &frame.error {
        metrics::inc_protocol_errors(code);
        invalidate(inner, &frame, code);
    }

    inner.events.publish(ClientEvent::Frame(frame.clone()));
    inner.correlator.resolve(&frame);
}

async fn route(inner: &Arc<ClientInner>, epoch: u64, frame: &Frame) -> Result<(), ClientError> {
    let route = Route::classify(&frame.event);
    if route == Route::Authenticate {
        inner.on_authenticated(epoch, frame);
        return Ok(());
    }
    if frame.is_failure() {
        return Ok(());
    }

    match route {
        Route::Heartbeat => inner.on_heartbeat(epoch).await,
        Route::Restart => {
            let notice: Option<RestartNotice> = payload(frame)?;
            let downtime = notice.and_then(|notice| notice.downtime);
            info!(?downtime, "directory service restarting");
            inner.events.publish(ClientEvent::Restart { downtime });
            inner.teardown(epoch, TeardownReason::Restart);
        }
        Route::Broadcast => {
            if let Some(broadcast) = payload::<Broadcast>(frame)? {
                inner.events.publish(ClientEvent::Broadcast(broadcast));
            }
        }
        Route::Tell => {
            if let Some(tell) = payload::<Tell>(frame)? {
                inner.events.publish(ClientEvent::Tell(tell));
            }
        }
        Route::GameStatus => {
            if let Some(status) = payload::<GameStatus>(frame)? {
                lock(&inner.directory).apply_game_status(&status);
            }
        }
        Route::PlayerStatus => {
            if let Some(status) = payload::<PlayerStatus>(frame)? {
                lock(&inner.directory).apply_player_status(&status);
            }
        }
        Route::GameConnect => {
            if let Some(GameRef { game }) = payload(frame)? {
                apply_delta(inner, Delta::Connect(game));
            }
        }
        Route::GameDisconnect => {
            if let Some(GameRef { game }) = payload(frame)? {
                apply_delta(inner, Delta::Disconnect(game));
            }
        }
        Route::SignIn => {
            if let Some(presence) = payload::<PlayerPresence>(frame)? {
                apply_delta(inner, Delta::SignIn(presence));
            }
        }
        Route::SignOut => {
            if let Some(presence) = payload::<PlayerPresence>(frame)? {
                apply_delta(inner, Delta::SignOut(presence));
            }
        }
        Route::Authenticate | Route::Other => {}
    }
    Ok(())
}

/// Invalidate the directory entry named by the failed request's payload.
fn invalidate(inner: &ClientInner, frame: &Frame, code: &str) {
    let Some(request) = inner.correlator.payload_for(&frame.correlation_key()) else {
        return;
    };
    if let Some(change) = lock(&inner.directory).invalidate(&frame.event, code, &request) {
        info!(event = %frame.event, code, ?change, "directory entry invalidated");
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("heartbeat", Route::Heartbeat)]
    #[case("authenticate", Route::Authenticate)]
    #[case("restart", Route::Restart)]
    #[case("channels/broadcast", Route::Broadcast)]
    #[case("tells/receive", Route::Tell)]
    #[case("games/status", Route::GameStatus)]
    #[case("players/status", Route::PlayerStatus)]
    #[case("games/connect", Route::GameConnect)]
    #[case("games/disconnect", Route::GameDisconnect)]
    #[case("players/sign-in", Route::SignIn)]
    #[case("players/sign-out", Route::SignOut)]
    #[case("tells/send", Route::Other)]
    #[case("achievements/sync", Route::Other)]
    fn events_are_classified(#[case] event: &str, #[case] expected: Route) {
        assert_eq!(Route::classify(event), expected);
    }

    #[test]
    fn acknowledgement_without_payload_is_skipped() {
        let frame = Frame::new("players/sign-in").with_reference("1");
        let decoded: Option<PlayerPresence> = payload(&frame).expect("no payload");
        assert!(decoded.is_none());
    }

    #[test]
    fn mismatched_payload_is_a_decode_error() {
        let frame = Frame::new("players/sign-in").with_payload(json!({"game": 7}));
        let err = payload::<PlayerPresence>(&frame).expect_err("bad payload");
        assert!(matches!(err, ClientError::Decode(_)));
    }
}

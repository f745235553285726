//! Applying presence deltas, with recovery pulls for unknown games.
//!
//! A delta can legitimately arrive before the snapshot of the game it
//! concerns. When that happens the game's status is pulled first and the
//! delta applied afterwards. At most one pull per game is in flight; deltas
//! arriving meanwhile queue behind it and are applied in arrival order.
//!
//! Lock order is `pulls` then `directory`.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use super::{ClientInner, lock};
use crate::{
    directory::{Directory, PlayerRef},
    protocol::{GAMES_STATUS, PLAYERS_STATUS, PlayerPresence},
    push::ClientEvent,
};

/// Incremental change to one remote game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Delta {
    Connect(String),
    Disconnect(String),
    SignIn(PlayerPresence),
    SignOut(PlayerPresence),
}

impl Delta {
    fn game(&self) -> &str {
        match self {
            Self::Connect(game) | Self::Disconnect(game) => game,
            Self::SignIn(presence) | Self::SignOut(presence) => &presence.game,
        }
    }

    /// Apply to a known game. Returns `None` if the game is not cached.
    fn apply(&self, directory: &mut Directory) -> Option<ClientEvent> {
        match self {
            Self::Connect(game) => directory
                .set_connected(game, true)
                .map(|_| ClientEvent::GameConnected(game.clone())),
            Self::Disconnect(game) => directory
                .set_connected(game, false)
                .map(|_| ClientEvent::GameDisconnected(game.clone())),
            Self::SignIn(presence) => directory
                .sign_in(&presence.game, &presence.name)
                .map(|_| ClientEvent::PlayerSignedIn(player_ref(presence))),
            Self::SignOut(presence) => directory
                .sign_out(&presence.game, &presence.name)
                .map(|_| ClientEvent::PlayerSignedOut(player_ref(presence))),
        }
    }
}

fn player_ref(presence: &PlayerPresence) -> PlayerRef {
    PlayerRef {
        name: presence.name.clone(),
        game: presence.game.clone(),
    }
}

/// Apply `delta`, pulling the game's status first if it is not cached.
pub(crate) fn apply_delta(inner: &Arc<ClientInner>, delta: Delta) {
    let game = delta.game().to_owned();
    let applied = {
        let mut pulls = lock(&inner.pulls);
        if let Some(queue) = pulls.get_mut(&game) {
            debug!(game, "queueing delta behind in-flight pull");
            queue.push(delta);
            return;
        }
        let applied = delta.apply(&mut lock(&inner.directory));
        match applied {
            Some(event) => event,
            None => {
                pulls.insert(game.clone(), vec![delta]);
                drop(pulls);
                tokio::spawn(recover(Arc::clone(inner), game));
                return;
            }
        }
    };
    inner.events.publish(applied);
}

/// Pull the status of `game`, then apply every delta queued for it.
async fn recover(inner: Arc<ClientInner>, game: String) {
    debug!(game, "pulling status for unknown game");
    let query = json!({ "game": game });
    for event in [GAMES_STATUS, PLAYERS_STATUS] {
        if let Err(error) = inner.request(event, Some(query.clone())).await {
            debug!(game, event, error = %error, "recovery pull failed");
        }
    }

    let events: Vec<ClientEvent> = {
        let mut pulls = lock(&inner.pulls);
        let queued = pulls.remove(&game).unwrap_or_default();
        let mut directory = lock(&inner.directory);
        if !directory.contains(&game) {
            warn!(game, dropped = queued.len(), "game still unknown after status pull");
            return;
        }
        queued
            .iter()
            .filter_map(|delta| delta.apply(&mut directory))
            .collect()
    };
    for event in events {
        inner.events.publish(event);
    }
}

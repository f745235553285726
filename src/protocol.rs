//! Event tags and payload shapes of the gossip protocol.

use serde::{Deserialize, Serialize};

pub const AUTHENTICATE: &str = "authenticate";
pub const HEARTBEAT: &str = "heartbeat";
pub const RESTART: &str = "restart";
pub const CHANNELS_SUBSCRIBE: &str = "channels/subscribe";
pub const CHANNELS_UNSUBSCRIBE: &str = "channels/unsubscribe";
pub const CHANNELS_SEND: &str = "channels/send";
pub const CHANNELS_BROADCAST: &str = "channels/broadcast";
pub const TELLS_SEND: &str = "tells/send";
pub const TELLS_RECEIVE: &str = "tells/receive";
pub const GAMES_STATUS: &str = "games/status";
pub const GAMES_CONNECT: &str = "games/connect";
pub const GAMES_DISCONNECT: &str = "games/disconnect";
pub const PLAYERS_STATUS: &str = "players/status";
pub const PLAYERS_SIGN_IN: &str = "players/sign-in";
pub const PLAYERS_SIGN_OUT: &str = "players/sign-out";

/// Error codes that drive cache invalidation.
pub const ERR_GAME_OFFLINE: &str = "game offline";
pub const ERR_UNKNOWN_GAME: &str = "unknown game";
pub const ERR_PLAYER_OFFLINE: &str = "player offline";

/// Full status of one remote game (`games/status`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    pub game: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage_url: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub supports: Option<Vec<String>>,
}

/// Players currently signed in on one remote game (`players/status`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub game: String,
    #[serde(default)]
    pub players: Vec<String>,
}

/// Payload naming a single game (`games/connect`, `games/disconnect`, and
/// targeted status queries).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRef {
    pub game: String,
}

/// A remote player signing in or out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPresence {
    pub game: String,
    pub name: String,
}

/// A channel message relayed by the directory service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub channel: String,
    pub game: String,
    pub name: String,
    pub message: String,
}

/// A tell addressed to a local player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tell {
    pub from_game: String,
    pub from_name: String,
    pub to_name: String,
    #[serde(default)]
    pub sent_at: Option<String>,
    pub message: String,
}

/// Outbound tell (`tells/send`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TellRequest {
    pub from_name: String,
    pub to_game: String,
    pub to_name: String,
    pub sent_at: String,
    pub message: String,
}

/// Outbound channel message (`channels/send`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub name: String,
    pub message: String,
}

/// Server notice of an upcoming restart.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartNotice {
    #[serde(default)]
    pub downtime: Option<u64>,
}

//! Locally cached directory of remote games and their players.
//!
//! The directory is eventually consistent with the directory service. Full
//! status snapshots are merged field by field, presence deltas are applied as
//! idempotent set operations, and selected request errors invalidate the
//! entries they concern.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::protocol::{
    ERR_GAME_OFFLINE,
    ERR_PLAYER_OFFLINE,
    ERR_UNKNOWN_GAME,
    GAMES_STATUS,
    GameStatus,
    PlayerStatus,
    TELLS_SEND,
};

/// Cached view of one remote game.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteGame {
    pub name: String,
    pub connected: bool,
    pub capabilities: BTreeSet<String>,
    pub players: BTreeSet<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub homepage_url: Option<String>,
    pub user_agent: Option<String>,
}

impl RemoteGame {
    /// Create an empty, disconnected record.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn merge_status(&mut self, status: &GameStatus) {
        self.connected = true;
        if let Some(display_name) = &status.display_name {
            self.display_name = Some(display_name.clone());
        }
        if let Some(description) = &status.description {
            self.description = Some(description.clone());
        }
        if let Some(homepage_url) = &status.homepage_url {
            self.homepage_url = Some(homepage_url.clone());
        }
        if let Some(user_agent) = &status.user_agent {
            self.user_agent = Some(user_agent.clone());
        }
        if let Some(supports) = &status.supports {
            self.capabilities = supports.iter().cloned().collect();
        }
    }

    fn find_player(&self, name: &str) -> Option<&String> {
        self.players
            .get(name)
            .or_else(|| self.players.iter().find(|player| same_name(player, name)))
    }
}

/// A player resolved against the directory, with canonical capitalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerRef {
    pub name: String,
    pub game: String,
}

/// Cache entry change caused by a request error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invalidation {
    /// The game was marked disconnected.
    GameOffline(String),
    /// The game was removed from the directory.
    GameRemoved(String),
    /// A player was removed from a game's roster.
    PlayerRemoved { game: String, name: String },
}

/// Remote games keyed by name.
#[derive(Clone, Debug, Default)]
pub struct Directory {
    games: HashMap<String, RemoteGame>,
}

fn same_name(a: &str, b: &str) -> bool { a.to_lowercase() == b.to_lowercase() }

impl Directory {
    #[must_use]
    pub fn get(&self, game: &str) -> Option<&RemoteGame> { self.games.get(game) }

    #[must_use]
    pub fn contains(&self, game: &str) -> bool { self.games.contains_key(game) }

    #[must_use]
    pub fn len(&self) -> usize { self.games.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.games.is_empty() }

    /// Owned copy of every cached game, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RemoteGame> {
        let mut games: Vec<RemoteGame> = self.games.values().cloned().collect();
        games.sort_by(|a, b| a.name.cmp(&b.name));
        games
    }

    /// Insert or merge a `games/status` snapshot. The game is marked
    /// connected either way.
    pub fn apply_game_status(&mut self, status: &GameStatus) {
        self.games
            .entry(status.game.clone())
            .or_insert_with(|| RemoteGame::new(status.game.clone()))
            .merge_status(status);
    }

    /// Insert or merge a `players/status` snapshot, replacing the player set.
    pub fn apply_player_status(&mut self, status: &PlayerStatus) {
        let game = self
            .games
            .entry(status.game.clone())
            .or_insert_with(|| RemoteGame::new(status.game.clone()));
        game.players = status.players.iter().cloned().collect();
    }

    /// Add `name` to `game`. Returns `None` if the game is unknown, otherwise
    /// whether the roster changed.
    pub fn sign_in(&mut self, game: &str, name: &str) -> Option<bool> {
        self.games
            .get_mut(game)
            .map(|entry| entry.players.insert(name.to_owned()))
    }

    /// Remove `name` from `game`. Returns `None` if the game is unknown,
    /// otherwise whether the roster changed.
    pub fn sign_out(&mut self, game: &str, name: &str) -> Option<bool> {
        self.games.get_mut(game).map(|entry| entry.players.remove(name))
    }

    /// Set the `connected` flag. Returns `None` if the game is unknown.
    pub fn set_connected(&mut self, game: &str, connected: bool) -> Option<bool> {
        self.games.get_mut(game).map(|entry| {
            let changed = entry.connected != connected;
            entry.connected = connected;
            changed
        })
    }

    pub fn remove(&mut self, game: &str) -> Option<RemoteGame> { self.games.remove(game) }

    /// Resolve `name@game` case-insensitively.
    ///
    /// When several cached names differ only in case, an exact match is
    /// preferred, then the lexicographically smallest name.
    ///
    /// # Examples
    ///
    /// ```
    /// use grapevine::directory::{Directory, PlayerRef};
    /// use grapevine::protocol::{GameStatus, PlayerStatus};
    ///
    /// let mut directory = Directory::default();
    /// directory.apply_game_status(&GameStatus {
    ///     game: "Agora".into(),
    ///     ..GameStatus::default()
    /// });
    /// directory.apply_player_status(&PlayerStatus {
    ///     game: "Agora".into(),
    ///     players: vec!["Alice".into()],
    /// });
    ///
    /// assert_eq!(
    ///     directory.find_player("alice@AGORA"),
    ///     Some(PlayerRef { name: "Alice".into(), game: "Agora".into() })
    /// );
    /// assert_eq!(directory.find_player("bob@Nowhere"), None);
    /// ```
    #[must_use]
    pub fn find_player(&self, identifier: &str) -> Option<PlayerRef> {
        let (name, game) = identifier.split_once('@')?;
        if name.is_empty() || game.is_empty() {
            return None;
        }
        // Exact match wins; otherwise the lowest name among case-insensitive matches.
        let entry = self.games.get(game).or_else(|| {
            self.games
                .values()
                .filter(|entry| same_name(&entry.name, game))
                .min_by(|a, b| a.name.cmp(&b.name))
        })?;
        let player = entry.find_player(name)?;
        Some(PlayerRef {
            name: player.clone(),
            game: entry.name.clone(),
        })
    }

    /// Apply error-driven invalidation for a failed request.
    ///
    /// `payload` is the payload of the original request, since error frames
    /// do not carry one. Returns the change made, if any.
    pub fn invalidate(&mut self, event: &str, code: &str, payload: &Value) -> Option<Invalidation> {
        let game_field = match event {
            TELLS_SEND => "to_game",
            GAMES_STATUS => "game",
            _ => return None,
        };
        let game = payload.get(game_field)?.as_str()?;

        match code {
            ERR_GAME_OFFLINE => {
                self.set_connected(game, false)?;
                Some(Invalidation::GameOffline(game.to_owned()))
            }
            ERR_UNKNOWN_GAME => {
                self.remove(game)?;
                Some(Invalidation::GameRemoved(game.to_owned()))
            }
            ERR_PLAYER_OFFLINE if event == TELLS_SEND => {
                let name = payload.get("to_name")?.as_str()?;
                if self.sign_out(game, name)? {
                    Some(Invalidation::PlayerRemoved {
                        game: game.to_owned(),
                        name: name.to_owned(),
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn directory() -> Directory {
        let mut directory = Directory::default();
        for game in ["Agora", "Bastion"] {
            directory.apply_game_status(&GameStatus {
                game: game.to_owned(),
                ..GameStatus::default()
            });
        }
        directory.apply_player_status(&PlayerStatus {
            game: "Agora".to_owned(),
            players: vec!["Alice".to_owned(), "Bob".to_owned()],
        });
        directory
    }

    #[rstest]
    fn game_status_inserts_connected_record() {
        let mut directory = Directory::default();
        directory.apply_game_status(&GameStatus {
            game: "Agora".to_owned(),
            display_name: Some("The Agora".to_owned()),
            supports: Some(vec!["channels".to_owned()]),
            ..GameStatus::default()
        });

        let game = directory.get("Agora").expect("game cached");
        assert!(game.connected);
        assert_eq!(game.display_name.as_deref(), Some("The Agora"));
        assert!(game.capabilities.contains("channels"));
    }

    #[rstest]
    fn game_status_merges_only_present_fields(mut directory: Directory) {
        directory.apply_game_status(&GameStatus {
            game: "Agora".to_owned(),
            description: Some("first".to_owned()),
            homepage_url: Some("https://agora.example".to_owned()),
            ..GameStatus::default()
        });
        directory.apply_game_status(&GameStatus {
            game: "Agora".to_owned(),
            description: Some("second".to_owned()),
            ..GameStatus::default()
        });

        let game = directory.get("Agora").expect("game cached");
        assert_eq!(game.description.as_deref(), Some("second"));
        assert_eq!(game.homepage_url.as_deref(), Some("https://agora.example"));
        assert_eq!(game.players.len(), 2);
    }

    #[rstest]
    fn player_status_for_unknown_game_creates_record() {
        let mut directory = Directory::default();
        directory.apply_player_status(&PlayerStatus {
            game: "Cairn".to_owned(),
            players: vec!["Eve".to_owned()],
        });
        let game = directory.get("Cairn").expect("game cached");
        assert!(game.players.contains("Eve"));
    }

    #[rstest]
    fn sign_in_is_idempotent(mut directory: Directory) {
        assert_eq!(directory.sign_in("Bastion", "Carol"), Some(true));
        let after_first = directory.get("Bastion").cloned();
        assert_eq!(directory.sign_in("Bastion", "Carol"), Some(false));
        assert_eq!(directory.get("Bastion").cloned(), after_first);
    }

    #[rstest]
    fn sign_out_is_idempotent(mut directory: Directory) {
        assert_eq!(directory.sign_out("Agora", "Bob"), Some(true));
        assert_eq!(directory.sign_out("Agora", "Bob"), Some(false));
        assert!(!directory.get("Agora").expect("game cached").players.contains("Bob"));
    }

    #[rstest]
    fn deltas_for_unknown_games_report_none(mut directory: Directory) {
        assert_eq!(directory.sign_in("Nowhere", "Zed"), None);
        assert_eq!(directory.sign_out("Nowhere", "Zed"), None);
        assert_eq!(directory.set_connected("Nowhere", true), None);
    }

    #[rstest]
    #[case("alice@AGORA", Some(("Alice", "Agora")))]
    #[case("BOB@agora", Some(("Bob", "Agora")))]
    #[case("bob@Nowhere", None)]
    #[case("carol@Agora", None)]
    #[case("alice", None)]
    #[case("@Agora", None)]
    #[case("alice@", None)]
    fn find_player_matches_case_insensitively(
        directory: Directory,
        #[case] identifier: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        let expected = expected.map(|(name, game)| PlayerRef {
            name: name.to_owned(),
            game: game.to_owned(),
        });
        assert_eq!(directory.find_player(identifier), expected);
    }

    #[rstest]
    #[case("Dana@agora", Some(("Dana", "agora")))]
    #[case("Dana@Agora", Some(("Dana", "Agora")))]
    #[case("Dana@AGORA", Some(("Dana", "Agora")))]
    #[case("dana@agora", Some(("dana", "agora")))]
    #[case("DANA@agora", Some(("Dana", "agora")))]
    fn find_player_is_deterministic_across_case_variants(
        #[case] identifier: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        let mut directory = Directory::default();
        for game in ["agora", "Agora"] {
            directory.apply_player_status(&PlayerStatus {
                game: game.to_owned(),
                players: vec!["Dana".to_owned(), "dana".to_owned()],
            });
        }
        let expected = expected.map(|(name, game)| PlayerRef {
            name: name.to_owned(),
            game: game.to_owned(),
        });
        for _ in 0..8 {
            assert_eq!(directory.find_player(identifier), expected);
        }
    }

    #[rstest]
    fn game_offline_marks_only_target(mut directory: Directory) {
        let change = directory.invalidate(
            TELLS_SEND,
            ERR_GAME_OFFLINE,
            &json!({"to_game": "Agora", "to_name": "Alice"}),
        );
        assert_eq!(change, Some(Invalidation::GameOffline("Agora".to_owned())));
        assert!(!directory.get("Agora").expect("game cached").connected);
        assert!(directory.get("Bastion").expect("game cached").connected);
    }

    #[rstest]
    fn unknown_game_on_status_removes_entry(mut directory: Directory) {
        let change = directory.invalidate(GAMES_STATUS, ERR_UNKNOWN_GAME, &json!({"game": "Bastion"}));
        assert_eq!(change, Some(Invalidation::GameRemoved("Bastion".to_owned())));
        assert!(!directory.contains("Bastion"));
        assert!(directory.contains("Agora"));
    }

    #[rstest]
    fn player_offline_removes_player(mut directory: Directory) {
        let change = directory.invalidate(
            TELLS_SEND,
            ERR_PLAYER_OFFLINE,
            &json!({"to_game": "Agora", "to_name": "Bob"}),
        );
        assert_eq!(
            change,
            Some(Invalidation::PlayerRemoved {
                game: "Agora".to_owned(),
                name: "Bob".to_owned(),
            })
        );
        assert!(directory.get("Agora").expect("game cached").players.contains("Alice"));
    }

    #[rstest]
    #[case(GAMES_STATUS, ERR_PLAYER_OFFLINE, json!({"game": "Agora"}))]
    #[case("channels/send", ERR_GAME_OFFLINE, json!({"game": "Agora"}))]
    #[case(TELLS_SEND, "unknown player", json!({"to_game": "Agora", "to_name": "Bob"}))]
    #[case(TELLS_SEND, ERR_GAME_OFFLINE, json!({}))]
    fn unrelated_errors_leave_cache_untouched(
        mut directory: Directory,
        #[case] event: &str,
        #[case] code: &str,
        #[case] payload: Value,
    ) {
        let before = directory.snapshot();
        assert_eq!(directory.invalidate(event, code, &payload), None);
        assert_eq!(directory.snapshot(), before);
    }
}

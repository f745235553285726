//! Session lifecycle state and the local player roster.

use std::{collections::BTreeSet, fmt};

/// Lifecycle state of the connection to the directory service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No connection and no reconnect scheduled.
    #[default]
    Disconnected,
    /// The transport is being opened.
    Connecting,
    /// The transport is open and `authenticate` has been sent.
    Authenticating,
    /// Authentication succeeded or a heartbeat has been observed.
    Alive,
    /// The connection dropped and a reconnect timer is armed.
    Reconnecting,
}

impl SessionState {
    /// Whether a connection attempt is underway or established.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Authenticating | Self::Alive)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Alive => "alive",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Names of players signed in on this game process.
///
/// Names are unique. Iteration is sorted so heartbeat payloads are stable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalRoster(BTreeSet<String>);

impl LocalRoster {
    /// Add `name`, returning `false` if it was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool { self.0.insert(name.into()) }

    /// Remove `name`, returning `false` if it was absent.
    pub fn remove(&mut self, name: &str) -> bool { self.0.remove(name) }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.0.contains(name) }

    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Snapshot of the roster as owned names.
    #[must_use]
    pub fn names(&self) -> Vec<String> { self.0.iter().cloned().collect() }
}

//! Shared utilities for integration tests.
//!
//! Provides a client configuration fixture tuned for fast tests and helpers
//! that bring a [`GossipClient`] up against a [`MockService`].

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::time::Duration;

use grapevine::{ClientConfig, ClientEvent, GossipClient, Subscription};
use grapevine_testing::MockService;
use rstest::fixture;
use serde_json::json;

pub type TestError = Box<dyn std::error::Error + Send + Sync>;
pub type TestResult<T = ()> = Result<T, TestError>;

/// How long tests wait for a published event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration with a short status wait and a reconnect interval long
/// enough that tests never see an unplanned reconnect.
#[fixture]
pub fn config() -> ClientConfig {
    ClientConfig::new("client-id", "client-secret")
        .status_wait(Duration::from_millis(5))
        .reconnect_interval(Duration::from_secs(3600))
}

/// A client wired to a fresh in-memory service.
pub fn client_with(config: ClientConfig) -> (GossipClient, MockService) {
    let service = MockService::new();
    let client = GossipClient::new(config, service.connector());
    (client, service)
}

/// Wait for the first event matching `predicate`.
///
/// # Panics
///
/// Panics if no matching event arrives within [`EVENT_TIMEOUT`].
pub async fn wait_for<F>(events: &mut Subscription, mut predicate: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Some(event) if predicate(&event) => return event,
                Some(_) => {}
                None => panic!("event stream closed"),
            }
        }
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .expect("timed out waiting for event")
}

/// Wait until the frame with `event` has been fully handled by the client.
pub async fn handled(events: &mut Subscription, event: &str) -> ClientEvent {
    wait_for(events, |e| matches!(e, ClientEvent::Frame(frame) if frame.event == event)).await
}

/// Connect, answer the initial status pulls with empty results and accept
/// the credentials.
pub async fn connect_alive(client: &GossipClient, service: &MockService) -> TestResult {
    let mut events = client.subscribe();
    client.connect().await?;
    let games = service.next_sent("games/status").await;
    service.reply(&games, None);
    let players = service.next_sent("players/status").await;
    service.reply(&players, None);
    service.accept_auth();
    wait_for(&mut events, |e| matches!(e, ClientEvent::Authenticated)).await;
    Ok(())
}

/// Push a `games/status` snapshot for `game`.
pub fn push_game(service: &MockService, game: &str) {
    service.push(json!({
        "event": "games/status",
        "payload": {"game": game, "display_name": game, "supports": ["channels", "players"]},
    }));
}

/// Push a `players/status` snapshot for `game`.
pub fn push_players(service: &MockService, game: &str, players: &[&str]) {
    service.push(json!({
        "event": "players/status",
        "payload": {"game": game, "players": players},
    }));
}

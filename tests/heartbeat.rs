//! Integration tests for the heartbeat watchdog, restart notices and the
//! reconnect timer.
//!
//! Timer-driven tests run with a paused clock so intervals elapse
//! instantly and deterministically.

use std::time::Duration;

use grapevine::{ClientConfig, ClientError, ClientEvent, SessionState, TransportError};
use rstest::{fixture, rstest};
use serde_json::json;
use tokio::time::sleep;

mod common;
use common::{TestResult, client_with, connect_alive, wait_for};

const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(20);
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

#[fixture]
fn timed_config() -> ClientConfig {
    ClientConfig::new("client-id", "client-secret")
        .status_wait(Duration::from_millis(5))
        .heartbeat_timeout(HEARTBEAT_TIMEOUT)
        .reconnect_interval(RECONNECT_INTERVAL)
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn heartbeat_is_answered_with_roster(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    connect_alive(&client, &service).await?;
    let (added, ()) = tokio::join!(client.add_player("Alice"), async {
        let request = service.next_sent("players/sign-in").await;
        service.reply(&request, None);
    });
    added?;

    service.heartbeat();

    let reply = service.next_sent("heartbeat").await;
    assert_eq!(reply.payload, Some(json!({"players": ["Alice"]})));
    assert!(reply.reference.is_none());
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn heartbeat_before_authentication_marks_alive(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    client.connect().await?;
    assert_eq!(client.state(), SessionState::Authenticating);

    service.heartbeat();
    service.next_sent("heartbeat").await;

    assert!(client.is_alive());
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn heartbeats_rearm_watchdog(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    connect_alive(&client, &service).await?;

    sleep(Duration::from_secs(15)).await;
    service.heartbeat();
    service.next_sent("heartbeat").await;
    sleep(Duration::from_secs(15)).await;

    assert!(client.is_alive());
    assert_eq!(service.opens(), 1);

    sleep(Duration::from_secs(6)).await;
    assert_eq!(client.state(), SessionState::Reconnecting);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn silent_connection_is_replaced(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    connect_alive(&client, &service).await?;
    let mut events = client.subscribe();

    sleep(HEARTBEAT_TIMEOUT + Duration::from_secs(1)).await;

    wait_for(&mut events, |e| matches!(e, ClientEvent::Disconnected)).await;
    let event = wait_for(&mut events, |e| matches!(e, ClientEvent::ConnectionError(_))).await;
    let ClientEvent::ConnectionError(error) = event else {
        unreachable!()
    };
    assert!(matches!(&*error, ClientError::Transport(TransportError::Connection(_))));
    assert_eq!(client.state(), SessionState::Reconnecting);

    sleep(RECONNECT_INTERVAL).await;

    assert_eq!(service.closes(), 1);
    assert_eq!(service.opens(), 2);
    assert_eq!(service.sent_with("authenticate").len(), 2);
    assert_eq!(client.state(), SessionState::Authenticating);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn restart_notice_reconnects(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    connect_alive(&client, &service).await?;
    let mut events = client.subscribe();

    service.push(json!({"event": "restart", "payload": {"downtime": 15}}));

    let event = wait_for(&mut events, |e| matches!(e, ClientEvent::Restart { .. })).await;
    assert!(matches!(event, ClientEvent::Restart { downtime: Some(15) }));
    wait_for(&mut events, |e| matches!(e, ClientEvent::Disconnected)).await;
    assert_eq!(client.state(), SessionState::Reconnecting);

    sleep(RECONNECT_INTERVAL + Duration::from_millis(100)).await;
    assert_eq!(service.opens(), 2);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn refused_opens_are_retried(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    service.fail_opens(2);

    client.connect().await.expect_err("first open refused");
    sleep(RECONNECT_INTERVAL + Duration::from_millis(100)).await;
    assert_eq!(service.opens(), 2);
    assert_eq!(client.state(), SessionState::Reconnecting);

    sleep(RECONNECT_INTERVAL).await;
    assert_eq!(service.opens(), 3);
    assert_eq!(client.state(), SessionState::Authenticating);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn close_cancels_pending_reconnect(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    service.fail_opens(1);
    client.connect().await.expect_err("open refused");

    client.close().await;
    sleep(RECONNECT_INTERVAL * 10).await;

    assert_eq!(service.opens(), 1);
    assert_eq!(client.state(), SessionState::Disconnected);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn close_stops_watchdog(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    connect_alive(&client, &service).await?;

    client.close().await;
    sleep(HEARTBEAT_TIMEOUT * 3).await;

    assert_eq!(service.opens(), 1);
    assert_eq!(client.state(), SessionState::Disconnected);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failed_write_tears_down_connection(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    connect_alive(&client, &service).await?;
    service.fail_sends(true);

    let err = client
        .notify("channels/send", Some(json!({"channel": "gossip"})))
        .await
        .expect_err("write fails");

    assert!(matches!(err, ClientError::Transport(TransportError::Send(_))));
    assert_eq!(client.state(), SessionState::Reconnecting);

    service.fail_sends(false);
    sleep(RECONNECT_INTERVAL + Duration::from_millis(100)).await;
    assert_eq!(service.opens(), 2);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn transport_error_is_published(timed_config: ClientConfig) -> TestResult {
    let (client, service) = client_with(timed_config);
    connect_alive(&client, &service).await?;
    let mut events = client.subscribe();

    service.error_current("connection reset by peer");

    let event = wait_for(&mut events, |e| matches!(e, ClientEvent::ConnectionError(_))).await;
    let ClientEvent::ConnectionError(error) = event else {
        unreachable!()
    };
    assert!(error.to_string().contains("connection reset by peer"));
    assert_eq!(client.state(), SessionState::Reconnecting);
    Ok(())
}

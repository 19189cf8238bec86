use debease::core::{Event, Payload};
use debease::stream::simulated::ScriptHandle;
use debease::stream::{
    EventStreamClient, EventSubscription, ReconnectPolicy, ScriptedConnector, ScriptedSession,
    StreamItem,
};
use std::time::Duration;
use tokio::time::timeout;

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial: Duration::from_millis(10),
        max: Duration::from_millis(40),
    }
}

fn client(sessions: Vec<ScriptedSession>) -> (EventStreamClient, EventSubscription, ScriptHandle) {
    let (connector, handle) = ScriptedConnector::new(sessions);
    let client = EventStreamClient::new(connector, fast_policy());
    let sub = client.subscribe();
    (client, sub, handle)
}

async fn next(sub: &mut EventSubscription) -> StreamItem {
    timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("timeout waiting for stream item")
        .expect("stream closed")
}

fn frames(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_events_arrive_in_order() {
    let (mut client, mut sub, _) = client(vec![ScriptedSession::DeliverAndHold(frames(&[
        r#"{"type":"stdout","job_id":"5","timestamp":1,"line":"a"}"#,
        r#"{"type":"stdout","job_id":"5","timestamp":2,"line":"b"}"#,
        r#"{"type":"stdout","job_id":"5","timestamp":3,"line":"a"}"#,
    ]))]);
    client.connect();

    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    let mut lines = Vec::new();
    for _ in 0..3 {
        match next(&mut sub).await {
            StreamItem::Event(Event::Job(event)) => match event.payload {
                Payload::Stdout { line } => lines.push(line),
                other => panic!("expected stdout, got {other:?}"),
            },
            other => panic!("expected event, got {other:?}"),
        }
    }
    assert_eq!(lines, vec!["a", "b", "a"]);
}

#[tokio::test]
async fn test_drop_then_reconnect() {
    let (mut client, mut sub, handle) = client(vec![
        ScriptedSession::DeliverThenFail(
            frames(&[r#"{"type":"progress","job_id":"1","timestamp":1,"percent":10}"#]),
            "connection reset".to_string(),
        ),
        ScriptedSession::DeliverAndHold(vec![]),
    ]);
    client.connect();

    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    assert!(matches!(next(&mut sub).await, StreamItem::Event(_)));
    match next(&mut sub).await {
        StreamItem::Disconnected { reason } => assert!(reason.contains("connection reset")),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    assert_eq!(handle.attempts(), 2);
}

#[tokio::test]
async fn test_refused_connections_are_retried() {
    let (mut client, mut sub, handle) = client(vec![
        ScriptedSession::Refuse("connection refused".to_string()),
        ScriptedSession::Refuse("connection refused".to_string()),
        ScriptedSession::DeliverAndHold(vec![]),
    ]);
    client.connect();

    // Failed attempts are not reported as items; the first one seen is the success.
    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    assert_eq!(handle.attempts(), 3);
}

#[tokio::test]
async fn test_malformed_frame_does_not_drop_connection() {
    let (mut client, mut sub, handle) = client(vec![ScriptedSession::DeliverAndHold(frames(&[
        "{not json",
        r#"{"type":"progress","job_id":"1","timestamp":1}"#,
        r#"{"type":"job_started","job_id":"1","timestamp":2,"package":"curl"}"#,
    ]))]);
    client.connect();

    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    assert!(matches!(next(&mut sub).await, StreamItem::DecodeFailed(_)));
    assert!(matches!(next(&mut sub).await, StreamItem::DecodeFailed(_)));
    assert!(matches!(next(&mut sub).await, StreamItem::Event(_)));
    assert_eq!(handle.attempts(), 1);
}

#[tokio::test]
async fn test_unknown_message_types_pass_through() {
    let (mut client, mut sub, _) = client(vec![ScriptedSession::DeliverAndHold(frames(&[
        r#"{"type":"heartbeat"}"#,
    ]))]);
    client.connect();

    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    match next(&mut sub).await {
        StreamItem::Event(Event::Other { kind }) => assert_eq!(kind, "heartbeat"),
        other => panic!("expected Other, got {other:?}"),
    }
}

#[tokio::test]
async fn test_close_ends_subscriptions() {
    let (mut client, mut sub, _) = client(vec![ScriptedSession::DeliverAndHold(vec![])]);
    client.connect();
    assert!(matches!(next(&mut sub).await, StreamItem::Connected));

    client.close();
    let end = timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("subscription did not end after close");
    assert!(end.is_none());
    assert!(!client.is_started());
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (mut client, mut sub, handle) = client(vec![
        ScriptedSession::DeliverAndHold(vec![]),
        ScriptedSession::DeliverAndHold(vec![]),
    ]);
    client.connect();
    client.connect();

    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.attempts(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_pushed_sessions_resume_after_exhaustion() {
    let (mut client, mut sub, handle) = client(vec![ScriptedSession::Deliver(vec![])]);
    client.connect();

    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    assert!(matches!(next(&mut sub).await, StreamItem::Disconnected { .. }));

    handle.push(ScriptedSession::DeliverAndHold(vec![]));
    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
}

#[tokio::test]
async fn test_flapping_connections_back_off() {
    let sessions = (0..50).map(|_| ScriptedSession::Deliver(vec![])).collect();
    let (connector, handle) = ScriptedConnector::new(sessions);
    let mut client = EventStreamClient::new(
        connector,
        ReconnectPolicy {
            initial: Duration::from_millis(50),
            max: Duration::from_millis(100),
        },
    );
    client.connect();

    // Accepted-then-dropped sessions wait 50, 100, 100, ... ms between attempts.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let attempts = handle.attempts();
    assert!(attempts >= 2, "expected a retry, got {attempts}");
    assert!(attempts <= 6, "reconnected {attempts} times in 300ms");

    client.shutdown().await;
}

#[tokio::test]
async fn test_session_that_delivered_reconnects_immediately() {
    let (connector, handle) = ScriptedConnector::new(vec![
        ScriptedSession::Deliver(frames(&[r#"{"type":"heartbeat"}"#])),
        ScriptedSession::DeliverAndHold(vec![]),
    ]);
    // Any backoff at all would blow the timeout below.
    let mut client = EventStreamClient::new(
        connector,
        ReconnectPolicy {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(10),
        },
    );
    let mut sub = client.subscribe();
    client.connect();

    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    assert!(matches!(next(&mut sub).await, StreamItem::Event(_)));
    assert!(matches!(next(&mut sub).await, StreamItem::Disconnected { .. }));
    assert!(matches!(next(&mut sub).await, StreamItem::Connected));
    assert_eq!(handle.attempts(), 2);

    client.shutdown().await;
}

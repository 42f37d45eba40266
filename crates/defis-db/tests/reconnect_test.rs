//! Reconnection behavior of `ResilientConnection`, driven by Tokio's paused clock.

mod common;

use common::{connect, fast_settings, next_event, settle, wait_for_event};
use defis_core::{DefisError, DefisResult};
use defis_db::{ConnectionEvent, ConnectionSettings, ConnectionState};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_reconnect_starts_at_error_threshold() {
    let (conn, backend) = connect(fast_settings()).await;
    backend.go_down();

    for expected_errors in 1..=2 {
        let result = conn.execute(|client| async move { client.query().await }).await;
        assert!(result.is_err());
        assert_eq!(conn.stats().consecutive_errors, expected_errors);
        assert_eq!(conn.state(), ConnectionState::Unhealthy);
        assert!(!conn.is_reconnecting());
    }

    let result = conn.execute(|client| async move { client.query().await }).await;
    assert!(matches!(result, Err(DefisError::Connectivity(_))));
    assert!(conn.is_reconnecting());
    assert_eq!(conn.state(), ConnectionState::Reconnecting);
}

#[tokio::test(start_paused = true)]
async fn test_lost_connection_reconnects_below_threshold() {
    let settings = ConnectionSettings {
        error_threshold: 10,
        ..fast_settings()
    };
    let (conn, _backend) = connect(settings).await;

    let result: DefisResult<()> = conn.execute(|_| async { Err(DefisError::NotConnected) }).await;

    assert!(result.is_err());
    assert!(conn.is_reconnecting());
}

#[tokio::test(start_paused = true)]
async fn test_query_errors_leave_health_alone() {
    let settings = ConnectionSettings {
        error_threshold: 1,
        ..fast_settings()
    };
    let (conn, backend) = connect(settings).await;

    for _ in 0..5 {
        let result: DefisResult<()> = conn
            .execute(|_| async { Err(DefisError::validation("points must be positive")) })
            .await;
        assert!(matches!(result, Err(DefisError::Validation(_))));
    }
    settle().await;

    let stats = conn.stats();
    assert!(stats.healthy);
    assert_eq!(stats.consecutive_errors, 0);
    assert_eq!(stats.failed_queries, 5);
    assert_eq!(stats.total_queries, 5);
    assert!(!conn.is_reconnecting());
    assert_eq!(backend.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_delays_increase_then_cooldown() {
    let (conn, backend) = connect(fast_settings()).await;
    let mut events = conn.subscribe();
    backend.go_down();

    assert!(conn.trigger_reconnect());

    let mut delays = Vec::new();
    loop {
        match next_event(&mut events).await {
            ConnectionEvent::RetryScheduled { delay, .. } => delays.push(delay),
            ConnectionEvent::CooldownStarted { cooldown } => {
                assert_eq!(cooldown, Duration::from_secs(60));
                break;
            }
            ConnectionEvent::Reconnecting { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert_eq!(
        delays,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400)
        ]
    );

    // Initial connect plus four failed attempts, spaced by growing gaps.
    let times = backend.connect_times.lock().clone();
    assert_eq!(times.len(), 5);
    let gaps: Vec<Duration> = times[1..].windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.windows(2).all(|w| w[0] < w[1]), "gaps not increasing: {:?}", gaps);
    assert_eq!(conn.stats().reconnect_attempts, 4);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_resets_attempts_and_resumes() {
    let (conn, backend) = connect(fast_settings()).await;
    let mut events = conn.subscribe();
    backend.go_down();
    conn.trigger_reconnect();

    wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::CooldownStarted { .. })).await;
    let cooldown_started = Instant::now();

    let resumed = next_event(&mut events).await;
    assert_eq!(resumed, ConnectionEvent::Reconnecting { attempt: 1 });
    assert!(cooldown_started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_resets_counters() {
    let (conn, backend) = connect(fast_settings()).await;
    let mut events = conn.subscribe();
    backend.go_down();

    for _ in 0..3 {
        let _ = conn.execute(|client| async move { client.query().await }).await;
    }
    wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::RetryScheduled { attempt: 2, .. })).await;
    assert_eq!(conn.stats().reconnect_attempts, 2);

    backend.come_back();
    wait_for_event(&mut events, |e| *e == ConnectionEvent::Reconnected).await;
    settle().await;

    let stats = conn.stats();
    assert!(stats.healthy);
    assert_eq!(stats.reconnect_attempts, 0);
    assert_eq!(stats.consecutive_errors, 0);
    assert!(!conn.is_reconnecting());
    // The broken client was closed once replaced.
    assert_eq!(backend.closes(), 1);

    let id = conn.execute(|client| async move { client.query().await }).await.unwrap();
    assert_eq!(id, backend.connects());
}

#[tokio::test(start_paused = true)]
async fn test_health_restored_by_query_resets_backoff() {
    let (conn, backend) = connect(fast_settings()).await;
    let mut events = conn.subscribe();
    backend.go_down();
    conn.trigger_reconnect();

    wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::RetryScheduled { attempt: 3, .. })).await;

    // Queries work again on the old client while new connects still fail.
    backend.fail_queries.store(false, Ordering::SeqCst);
    conn.execute(|client| async move { client.query().await }).await.unwrap();
    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;

    assert!(conn.is_healthy());
    assert!(!conn.is_reconnecting());
    assert_eq!(conn.stats().reconnect_attempts, 0);

    // The next outage starts a fresh cycle with the base delay.
    let mut events = conn.subscribe();
    assert!(conn.trigger_reconnect());
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Reconnecting { attempt: 1 });
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::RetryScheduled {
            attempt: 1,
            delay: Duration::from_millis(100)
        }
    );

    conn.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_triggers_are_coalesced() {
    let settings = ConnectionSettings {
        error_threshold: 1,
        ..fast_settings()
    };
    let (conn, backend) = connect(settings).await;
    backend.go_down();

    let query = || {
        let conn = conn.clone();
        async move { conn.execute(|client| async move { client.query().await }).await }
    };
    let (a, b, c, d) = tokio::join!(query(), query(), query(), query());
    assert!(a.is_err() && b.is_err() && c.is_err() && d.is_err());

    assert!(!conn.trigger_reconnect());
    settle().await;

    // Initial connect plus exactly one reconnect attempt so far.
    assert_eq!(backend.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_connection_times_out() {
    let (conn, backend) = connect(fast_settings()).await;
    backend.go_down();
    let _ = conn.execute(|client| async move { client.query().await }).await;

    let started = Instant::now();
    let restored = conn.wait_for_connection(Duration::from_secs(2)).await;

    assert!(!restored);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(conn.is_reconnecting());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_connection_resolves_on_restore() {
    let (conn, backend) = connect(fast_settings()).await;
    assert!(conn.wait_for_connection(Duration::from_secs(1)).await);

    backend.go_down();
    let _ = conn.execute(|client| async move { client.query().await }).await;

    let restorer = {
        let backend = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            backend.come_back();
        })
    };

    let started = Instant::now();
    assert!(conn.wait_for_connection(Duration::from_secs(10)).await);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(conn.is_healthy());
    restorer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_stops_reconnection() {
    let (conn, backend) = connect(fast_settings()).await;
    backend.go_down();
    conn.trigger_reconnect();
    settle().await;

    conn.cleanup().await;
    conn.cleanup().await;
    let connects = backend.connects();

    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;

    assert_eq!(backend.connects(), connects);
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(!conn.wait_for_connection(Duration::from_secs(1)).await);
    let result = conn.execute(|client| async move { client.query().await }).await;
    assert!(matches!(result, Err(DefisError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn test_monitor_recycles_old_connection() {
    let settings = ConnectionSettings {
        ping_interval: Duration::from_secs(1),
        max_connection_age: Duration::from_secs(5),
        ..fast_settings()
    };
    let (conn, backend) = connect(settings).await;
    let mut events = conn.subscribe();
    conn.start_health_monitor();
    conn.start_health_monitor();

    wait_for_event(&mut events, |e| *e == ConnectionEvent::Recycled).await;
    settle().await;

    assert_eq!(backend.connects(), 2);
    assert_eq!(backend.closes(), 1);
    assert!(conn.is_healthy());
    let id = conn.execute(|client| async move { client.query().await }).await.unwrap();
    assert_eq!(id, 2);

    conn.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_monitor_ping_detects_outage() {
    let settings = ConnectionSettings {
        ping_interval: Duration::from_secs(1),
        error_threshold: 2,
        ..fast_settings()
    };
    let (conn, backend) = connect(settings).await;
    let mut events = conn.subscribe();
    conn.start_health_monitor();
    backend.fail_ping.store(true, Ordering::SeqCst);
    backend.fail_connect.store(true, Ordering::SeqCst);

    let unhealthy = next_event(&mut events).await;
    assert_eq!(unhealthy, ConnectionEvent::Unhealthy { consecutive_errors: 1 });

    wait_for_event(&mut events, |e| matches!(e, ConnectionEvent::Reconnecting { attempt: 1 })).await;
    assert!(conn.is_reconnecting());

    conn.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_success_rate_tracks_queries() {
    let (conn, backend) = connect(fast_settings()).await;

    for _ in 0..3 {
        conn.execute(|client| async move { client.query().await }).await.unwrap();
    }
    backend.fail_queries.store(true, Ordering::SeqCst);
    let _ = conn.execute(|client| async move { client.query().await }).await;

    let stats = conn.stats();
    assert_eq!(stats.total_queries, 4);
    assert_eq!(stats.successful_queries, 3);
    assert!((stats.success_rate - 0.75).abs() < f64::EPSILON);
    assert!(stats.last_query_time.is_some());
    assert_eq!(stats.last_error.map(|e| e.code), Some("CONNECTIVITY_ERROR".to_string()));
}

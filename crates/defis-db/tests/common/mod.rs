//! Common test infrastructure for resilient connection tests.
//!
//! Provides an in-memory connector whose failures are switched on and off
//! by the test, so reconnection can be exercised without a database server.

#![allow(dead_code)]

use async_trait::async_trait;
use defis_core::{DefisError, DefisResult};
use defis_db::{ConnectionEvent, ConnectionSettings, Connector, DatabaseClient, ResilientConnection};
use defis_resilience::BackoffPolicy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Switches and counters shared by a connector and every client it opened.
#[derive(Default)]
pub struct Backend {
    pub fail_connect: AtomicBool,
    pub fail_ping: AtomicBool,
    pub fail_queries: AtomicBool,
    pub connects: AtomicU32,
    pub closes: AtomicU32,
    pub connect_times: Mutex<Vec<Instant>>,
}

impl Backend {
    pub fn go_down(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
        self.fail_ping.store(true, Ordering::SeqCst);
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub fn come_back(&self) {
        self.fail_connect.store(false, Ordering::SeqCst);
        self.fail_ping.store(false, Ordering::SeqCst);
        self.fail_queries.store(false, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct MockClient {
    pub id: u32,
    backend: Arc<Backend>,
}

impl MockClient {
    /// Answers with the client id, or a connectivity error while the backend is down.
    pub async fn query(&self) -> DefisResult<u32> {
        if self.backend.fail_queries.load(Ordering::SeqCst) {
            Err(DefisError::connectivity("connection reset by peer"))
        } else {
            Ok(self.id)
        }
    }
}

#[async_trait]
impl DatabaseClient for MockClient {
    async fn ping(&self) -> DefisResult<()> {
        if self.backend.fail_ping.load(Ordering::SeqCst) {
            Err(DefisError::connectivity("ping failed"))
        } else {
            Ok(())
        }
    }

    async fn close(&self) {
        self.backend.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockConnector {
    pub backend: Arc<Backend>,
}

#[async_trait]
impl Connector for MockConnector {
    type Client = MockClient;

    async fn connect(&self) -> DefisResult<MockClient> {
        let id = self.backend.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.backend.connect_times.lock().push(Instant::now());

        if self.backend.fail_connect.load(Ordering::SeqCst) {
            Err(DefisError::connectivity("connection refused"))
        } else {
            Ok(MockClient {
                id,
                backend: Arc::clone(&self.backend),
            })
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Settings with short delays: 100ms base, doubling, 4 attempts, 60s cooldown.
pub fn fast_settings() -> ConnectionSettings {
    ConnectionSettings {
        ping_interval: Duration::from_secs(30),
        max_connection_age: Duration::from_secs(3600),
        error_threshold: 3,
        connect_timeout: Duration::from_secs(5),
        backoff: BackoffPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(10),
            cooldown: Duration::from_secs(60),
        },
    }
}

pub async fn connect(settings: ConnectionSettings) -> (ResilientConnection<MockConnector>, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let connector = MockConnector {
        backend: Arc::clone(&backend),
    };
    let conn = ResilientConnection::connect(connector, settings)
        .await
        .expect("mock connect succeeds");
    (conn, backend)
}

/// Receives the next event, failing the test if none arrives.
pub async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(3600), events.recv())
        .await
        .expect("event within an hour of simulated time")
        .expect("event channel open")
}

/// Receives events until one matches `predicate`.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    predicate: impl Fn(&ConnectionEvent) -> bool,
) -> ConnectionEvent {
    loop {
        let event = next_event(events).await;
        if predicate(&event) {
            return event;
        }
    }
}

/// Lets spawned tasks on the current-thread runtime make progress.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

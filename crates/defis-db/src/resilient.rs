//! Self-healing wrapper around a single database client handle.

use crate::metrics as db_metrics;
use crate::state::HealthState;
use crate::{ConnectionEvent, ConnectionSettings, ConnectionState, ConnectionStats, Connector, DatabaseClient};
use defis_core::{DefisError, DefisResult, ErrorSummary};
use defis_resilience::with_timeout;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What a query or health check told us about the connection.
enum Observation {
    Success,
    /// Backing store unreachable. `lost` means the client handle is gone.
    Connectivity { error: ErrorSummary, lost: bool },
    /// The store answered with an error; says nothing about connectivity.
    QueryFailure,
}

impl Observation {
    fn from_result<T>(result: &DefisResult<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) if e.is_connectivity() => Self::Connectivity {
                error: ErrorSummary::from(e),
                lost: e.is_connection_lost(),
            },
            Err(_) => Self::QueryFailure,
        }
    }
}

/// Result of one reconnection step.
enum ReconnectStep {
    Done,
    Retry(Duration),
    Cooldown(Duration),
}

pub(crate) struct Inner<C: Connector> {
    pub(crate) connector: C,
    pub(crate) settings: ConnectionSettings,
    client: RwLock<Option<Arc<C::Client>>>,
    pub(crate) health: Mutex<HealthState>,
    /// At most one reconnection (or recycle) sequence runs at a time.
    pub(crate) is_connecting: AtomicBool,
    pub(crate) closed: AtomicBool,
    healthy_tx: watch::Sender<bool>,
    events: broadcast::Sender<ConnectionEvent>,
    pub(crate) monitor: Mutex<Option<JoinHandle<()>>>,
    reconnector: Mutex<Option<JoinHandle<()>>>,
}

/// Database connection that repairs itself after connectivity loss.
///
/// Cloning yields another handle to the same connection. Background work
/// (reconnection, health monitor) only holds weak references, so dropping
/// every handle stops it; [`cleanup`](Self::cleanup) stops it explicitly.
pub struct ResilientConnection<C: Connector> {
    pub(crate) inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ResilientConnection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for ResilientConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientConnection")
            .field("target", &self.inner.connector.describe())
            .field("state", &self.state())
            .finish()
    }
}

impl<C: Connector> ResilientConnection<C> {
    /// Establishes the first client handle and returns a healthy wrapper.
    pub async fn connect(connector: C, settings: ConnectionSettings) -> DefisResult<Self> {
        let client = with_timeout(settings.connect_timeout, connector.connect()).await?;
        info!("Database connection established ({})", connector.describe());
        Ok(Self::from_client(connector, settings, client))
    }

    /// Wraps an already established client handle.
    pub fn from_client(connector: C, settings: ConnectionSettings, client: C::Client) -> Self {
        let (healthy_tx, _) = watch::channel(true);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        db_metrics::set_healthy(true);

        Self {
            inner: Arc::new(Inner {
                connector,
                settings,
                client: RwLock::new(Some(Arc::new(client))),
                health: Mutex::new(HealthState::new()),
                is_connecting: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                healthy_tx,
                events,
                monitor: Mutex::new(None),
                reconnector: Mutex::new(None),
            }),
        }
    }

    /// Runs a query against the current client handle.
    ///
    /// The outcome feeds the health state machine: success confirms health,
    /// connectivity errors count towards a reconnection, other errors are
    /// returned without side effects. The caller always gets the query's own
    /// result.
    pub async fn execute<F, Fut, T>(&self, query: F) -> DefisResult<T>
    where
        F: FnOnce(Arc<C::Client>) -> Fut,
        Fut: Future<Output = DefisResult<T>>,
    {
        if self.is_closed() {
            return Err(DefisError::NotConnected);
        }

        let result = match self.current_client() {
            Some(client) => query(client).await,
            None => Err(DefisError::NotConnected),
        };

        db_metrics::record_query();
        if let Err(e) = &result {
            db_metrics::record_query_failure(e.is_connectivity());
        }
        self.observe(Observation::from_result(&result), true);

        result
    }

    /// Pings the connection with a trivial round trip.
    ///
    /// Any health check failure counts as a connectivity error.
    pub async fn check_connection(&self) -> bool {
        if self.is_closed() {
            return false;
        }

        let result = match self.current_client() {
            Some(client) => with_timeout(self.inner.settings.connect_timeout, client.ping()).await,
            None => Err(DefisError::NotConnected),
        };

        let observation = match &result {
            Ok(()) => Observation::Success,
            Err(e) => {
                debug!("Health check failed: {}", e);
                Observation::Connectivity {
                    error: ErrorSummary::from(e),
                    lost: e.is_connection_lost(),
                }
            }
        };
        self.observe(observation, false);

        result.is_ok()
    }

    /// Waits until the connection is healthy, for at most `timeout`.
    ///
    /// Returns immediately when already healthy. Otherwise makes sure a
    /// reconnection is running (shared by every waiter) and resolves `true`
    /// as soon as health is confirmed, or `false` once `timeout` elapses.
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.is_healthy() {
            return true;
        }

        let mut healthy_rx = self.inner.healthy_tx.subscribe();
        self.trigger_reconnect();

        let restored = tokio::time::timeout(timeout, healthy_rx.wait_for(|healthy| *healthy)).await;
        matches!(restored, Ok(Ok(_)))
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> ConnectionStats {
        self.inner.health.lock().snapshot()
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.health.lock().state
    }

    /// Returns `true` if the last query or health check succeeded.
    pub fn is_healthy(&self) -> bool {
        self.inner.health.lock().is_healthy()
    }

    /// Returns `true` once `cleanup` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns `true` while a reconnection or recycle is in flight.
    pub fn is_reconnecting(&self) -> bool {
        self.inner.is_connecting.load(Ordering::Acquire)
    }

    /// Describes the connection target, credentials redacted.
    pub fn target(&self) -> String {
        self.inner.connector.describe()
    }

    /// Returns the settings in effect.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Stops background work and closes the client handle.
    ///
    /// Safe to call more than once and while queries are in flight; those
    /// queries fail like any other query would.
    pub async fn cleanup(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(monitor) = self.inner.monitor.lock().take() {
            monitor.abort();
        }
        if let Some(reconnector) = self.inner.reconnector.lock().take() {
            reconnector.abort();
        }

        let client = self.inner.client.write().take();
        self.inner.health.lock().state = ConnectionState::Closed;
        self.set_healthy(false);
        self.emit(ConnectionEvent::Closed);

        if let Some(client) = client {
            client.close().await;
        }
        info!("Database connection cleaned up");
    }

    /// Starts a reconnection sequence unless one is already running.
    ///
    /// Returns `true` if this call started it.
    pub fn trigger_reconnect(&self) -> bool {
        self.start_sequence(false)
    }

    pub(crate) fn start_sequence(&self, recycle: bool) -> bool {
        if self.is_closed() {
            return false;
        }
        if self
            .inner
            .is_connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reconnection already in progress");
            return false;
        }

        if !recycle {
            self.inner.health.lock().state = ConnectionState::Reconnecting;
            self.set_healthy(false);
            warn!("Starting database reconnection");
        }

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(run_sequence(weak, recycle));
        *self.inner.reconnector.lock() = Some(handle);
        true
    }

    pub(crate) fn current_client(&self) -> Option<Arc<C::Client>> {
        self.inner.client.read().clone()
    }

    fn observe(&self, observation: Observation, is_query: bool) {
        let mut events = Vec::new();
        let mut trigger = false;
        let mut healthy = None;

        {
            let mut health = self.inner.health.lock();
            if is_query {
                health.total_queries += 1;
                health.touch();
            }

            match observation {
                Observation::Success => {
                    if is_query {
                        health.successful_queries += 1;
                    }
                    health.consecutive_errors = 0;
                    if matches!(health.state, ConnectionState::Unhealthy | ConnectionState::Reconnecting) {
                        health.state = ConnectionState::Healthy;
                        health.reconnect_attempts = 0;
                        events.push(ConnectionEvent::Restored);
                        healthy = Some(true);
                    }
                }
                Observation::Connectivity { error, lost } => {
                    if is_query {
                        health.failed_queries += 1;
                    }
                    if health.state != ConnectionState::Closed {
                        health.consecutive_errors += 1;
                        health.last_error = Some(error);
                        if health.state == ConnectionState::Healthy {
                            health.state = ConnectionState::Unhealthy;
                            events.push(ConnectionEvent::Unhealthy {
                                consecutive_errors: health.consecutive_errors,
                            });
                            healthy = Some(false);
                        }
                        trigger = lost || health.consecutive_errors >= self.inner.settings.error_threshold;
                    }
                }
                Observation::QueryFailure => {
                    if is_query {
                        health.failed_queries += 1;
                    }
                }
            }
        }

        if let Some(healthy) = healthy {
            self.set_healthy(healthy);
            if healthy {
                info!("Database connection healthy again");
            } else {
                warn!("Database connection marked unhealthy");
            }
        }
        for event in events {
            self.emit(event);
        }
        if trigger {
            self.trigger_reconnect();
        }
    }

    /// One connect attempt of a reconnection or recycle sequence.
    async fn reconnect_step(&self, recycle: bool) -> ReconnectStep {
        if self.is_closed() {
            return ReconnectStep::Done;
        }
        if !recycle {
            let mut health = self.inner.health.lock();
            if health.is_healthy() {
                health.reconnect_attempts = 0;
                debug!("Connection restored by a query, stopping reconnection");
                return ReconnectStep::Done;
            }
        }

        let attempt = self.inner.health.lock().reconnect_attempts + 1;
        if !recycle {
            self.emit(ConnectionEvent::Reconnecting { attempt });
            info!("Reconnection attempt {}", attempt);
        }

        let settings = &self.inner.settings;
        match with_timeout(settings.connect_timeout, self.inner.connector.connect()).await {
            Ok(client) => {
                db_metrics::record_reconnect_attempt(true);

                // `cleanup` flags the wrapper closed before taking the client,
                // so checking under the client lock never resurrects a closed one.
                let swapped = {
                    let mut slot = self.inner.client.write();
                    if self.is_closed() {
                        Err(client)
                    } else {
                        Ok(slot.replace(Arc::new(client)))
                    }
                };
                let previous = match swapped {
                    Ok(previous) => previous,
                    Err(client) => {
                        client.close().await;
                        return ReconnectStep::Done;
                    }
                };

                let connected = {
                    let mut health = self.inner.health.lock();
                    let connected = health.mark_connected();
                    if connected {
                        self.set_healthy(true);
                    }
                    connected
                };
                if !connected {
                    if let Some(previous) = previous {
                        previous.close().await;
                    }
                    return ReconnectStep::Done;
                }

                if recycle {
                    db_metrics::record_recycled();
                    self.emit(ConnectionEvent::Recycled);
                    info!("Database connection recycled");
                } else {
                    self.emit(ConnectionEvent::Reconnected);
                    info!("Database reconnected after {} attempt(s)", attempt);
                }

                if let Some(previous) = previous {
                    previous.close().await;
                }
                ReconnectStep::Done
            }
            Err(e) if recycle => {
                db_metrics::record_reconnect_attempt(false);
                warn!("Could not open a replacement connection, keeping the current one: {}", e);
                ReconnectStep::Done
            }
            Err(e) => {
                db_metrics::record_reconnect_attempt(false);
                let attempts = {
                    let mut health = self.inner.health.lock();
                    if health.is_healthy() || health.state == ConnectionState::Closed {
                        // A query restored health while this attempt ran, or the
                        // wrapper was cleaned up.
                        health.reconnect_attempts = 0;
                        None
                    } else {
                        health.reconnect_attempts += 1;
                        health.last_error = Some(ErrorSummary::from(&e));
                        health.state = ConnectionState::Reconnecting;
                        Some(health.reconnect_attempts)
                    }
                };
                let Some(attempts) = attempts else {
                    debug!("Reconnection no longer needed: {}", e);
                    return ReconnectStep::Done;
                };

                if settings.backoff.is_exhausted(attempts) {
                    let cooldown = settings.backoff.cooldown;
                    error!(
                        "Reconnection failed {} times, pausing for {:?}: {}",
                        attempts, cooldown, e
                    );
                    self.emit(ConnectionEvent::CooldownStarted { cooldown });
                    ReconnectStep::Cooldown(cooldown)
                } else {
                    let delay = settings.backoff.delay_for_attempt(attempts);
                    warn!("Reconnection attempt {} failed, retrying in {:?}: {}", attempts, delay, e);
                    self.emit(ConnectionEvent::RetryScheduled { attempt: attempts, delay });
                    ReconnectStep::Retry(delay)
                }
            }
        }
    }

    fn set_healthy(&self, healthy: bool) {
        self.inner.healthy_tx.send_replace(healthy);
        db_metrics::set_healthy(healthy);
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

/// Drives a reconnection (or recycle) sequence until it succeeds, is no
/// longer needed, or the connection is gone.
async fn run_sequence<C: Connector>(weak: Weak<Inner<C>>, recycle: bool) {
    loop {
        let Some(inner) = weak.upgrade() else { return };
        let connection = ResilientConnection { inner };

        let (pause, cooldown) = match connection.reconnect_step(recycle).await {
            ReconnectStep::Done => {
                connection.inner.is_connecting.store(false, Ordering::Release);
                return;
            }
            ReconnectStep::Retry(delay) => (delay, false),
            ReconnectStep::Cooldown(cooldown) => (cooldown, true),
        };
        drop(connection);

        tokio::time::sleep(pause).await;

        if cooldown {
            let Some(inner) = weak.upgrade() else { return };
            inner.health.lock().reconnect_attempts = 0;
            info!("Reconnection cooldown over, resuming attempts");
        }
    }
}

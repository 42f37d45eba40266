//! Periodic health monitor and connection recycling.

use crate::{Connector, ResilientConnection};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

impl<C: Connector> ResilientConnection<C> {
    /// Starts the background health monitor. Calling it again is a no-op.
    ///
    /// Every `ping_interval` the monitor either recycles a healthy connection
    /// older than `max_connection_age`, or pings the connection when it has
    /// been idle, has pending errors or is unhealthy.
    pub fn start_health_monitor(&self) {
        if self.is_closed() {
            return;
        }
        let mut slot = self.inner.monitor.lock();
        if slot.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.ping_interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                ResilientConnection { inner }.health_tick().await;
            }
            debug!("Health monitor stopped");
        }));
        info!("Database health monitor started (every {:?})", period);
    }

    /// Replaces a healthy connection with a fresh one.
    ///
    /// The new client is swapped in before the old one is closed, so queries
    /// keep flowing. Returns `false` when a reconnection is already running.
    pub fn recycle(&self) -> bool {
        self.start_sequence(true)
    }

    /// One monitor pass.
    pub(crate) async fn health_tick(&self) {
        if self.is_closed() || self.inner.is_connecting.load(Ordering::Acquire) {
            return;
        }

        let settings = &self.inner.settings;
        let (age, idle, errors, healthy) = {
            let health = self.inner.health.lock();
            (
                health.connected_at.elapsed(),
                health.last_query_at.map(|at| at.elapsed()),
                health.consecutive_errors,
                health.is_healthy(),
            )
        };

        if healthy && age >= settings.max_connection_age {
            info!("Connection is {:?} old, recycling", age);
            self.recycle();
            return;
        }

        let idle_too_long = idle.map_or(true, |idle| idle >= settings.ping_interval);
        if idle_too_long || errors > 0 || !healthy {
            let ok = self.check_connection().await;
            debug!("Health check {}", if ok { "succeeded" } else { "failed" });
        }
    }
}

//! Heartbeat monitor: periodic ping sweep with timeout-based eviction

use crate::registry::ConnectionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

/// Periodically pings every registered connection and evicts the ones that
/// fail to respond within the timeout. Owned by the server as an explicit
/// lifecycle object: [`start`](Self::start) / [`stop`](Self::stop).
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    timeout: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration, timeout: Duration) -> Self {
        Self {
            registry,
            interval,
            timeout,
            handle: Mutex::new(None),
        }
    }

    /// Start the sweep task. A zero interval disables the monitor entirely;
    /// starting twice is a no-op.
    pub async fn start(&self) {
        if self.interval.is_zero() {
            debug!("heartbeat disabled (zero interval)");
            return;
        }

        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            debug!("heartbeat already running");
            return;
        }

        let registry = Arc::clone(&self.registry);
        let interval = self.interval;
        let timeout = self.timeout;
        *handle = Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // The first tick completes immediately; sweeps start one
            // interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                Self::sweep(&registry, timeout).await;
            }
        }));

        info!(interval = ?self.interval, timeout = ?self.timeout, "heartbeat started");
    }

    /// Stop the sweep task.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            info!("heartbeat stopped");
        }
    }

    /// One sweep over every live connection: a transport that reports
    /// not-open is unregistered, a stale liveness ack evicts even if the
    /// transport still reports open, and a failed ping probe evicts.
    pub(crate) async fn sweep(registry: &ConnectionRegistry, timeout: Duration) {
        for conn in registry.list().await {
            if !conn.transport().is_open() {
                warn!(connection = %conn.id, "transport closed, unregistering");
                registry.unregister(conn.id).await;
                continue;
            }

            if conn.last_pong().await.elapsed() > timeout {
                warn!(connection = %conn.id, "liveness timeout, evicting");
                registry.evict(&conn).await;
                continue;
            }

            if conn.transport().ping().await.is_err() {
                warn!(connection = %conn.id, "ping failed, evicting");
                registry.evict(&conn).await;
            }
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.handle.try_lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

//! Connection registry: live connections keyed by identity

use crate::codec::{kind, Envelope};
use crate::connection::Connection;
use crate::dispatch::DispatchBus;
use crate::types::ConnectionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tracks live connections independent of rooms or messages. Registering
/// emits a synthesized `connect` envelope on the dispatch bus; the first
/// unregistration of an id emits `disconnect`.
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, Arc<Connection>>>>,
    bus: Arc<DispatchBus>,
}

impl ConnectionRegistry {
    pub fn new(bus: Arc<DispatchBus>) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            bus,
        }
    }

    /// Add a connection and emit the `connect` lifecycle envelope. The
    /// returned handle carries the generated identity.
    pub async fn register(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        {
            let mut connections = self.connections.write().await;
            connections.insert(conn.id, Arc::clone(&conn));
        }

        info!(connection = %conn.id, "connection registered");
        self.bus
            .publish(Envelope::new(kind::CONNECT), Arc::clone(&conn))
            .await;
        conn
    }

    /// Remove a connection, emitting `disconnect` if this call closed it.
    /// Returns false when the id is already absent; repeated calls are
    /// no-ops.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let conn = {
            let mut connections = self.connections.write().await;
            connections.remove(&id)
        };

        let Some(conn) = conn else {
            return false;
        };

        info!(connection = %id, "connection unregistered");
        if conn.mark_closed() {
            self.bus.publish(Envelope::new(kind::DISCONNECT), conn).await;
        }
        true
    }

    /// Force-terminate the transport and run the disconnection path.
    /// Idempotent; used for every fatal transport error.
    pub async fn evict(&self, conn: &Arc<Connection>) {
        conn.transport().terminate().await;
        self.unregister(conn.id).await;
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(&id).cloned()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        let connections = self.connections.read().await;
        connections.contains_key(&id)
    }

    /// Snapshot of all live connections, not a live view.
    pub async fn list(&self) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Terminate every transport and drop all entries without emitting
    /// lifecycle events. Used by server shutdown.
    pub async fn clear(&self) {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, conn)| conn).collect()
        };

        for conn in &drained {
            conn.mark_closed();
            conn.transport().terminate().await;
        }
        debug!(count = drained.len(), "registry cleared");
    }
}

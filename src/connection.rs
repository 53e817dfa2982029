//! Connection state: identity, transport handle, liveness

use crate::transport::Transport;
use crate::types::ConnectionId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Override for constructing connections from accepted transports.
pub type ConnectionFactory = Arc<dyn Fn(Arc<dyn Transport>) -> Connection + Send + Sync>;

/// One accepted transport-level session with a remote peer.
///
/// Owned exclusively by the [`ConnectionRegistry`](crate::ConnectionRegistry);
/// rooms only ever hold the [`ConnectionId`].
pub struct Connection {
    pub id: ConnectionId,
    transport: Arc<dyn Transport>,
    last_pong: RwLock<Instant>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            id: ConnectionId::new(),
            transport,
            last_pong: RwLock::new(Instant::now()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Record a liveness ack. This is the only mutation a pong causes.
    pub async fn record_pong(&self) {
        *self.last_pong.write().await = Instant::now();
    }

    /// Timestamp of the most recent liveness ack.
    pub async fn last_pong(&self) -> Instant {
        *self.last_pong.read().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flip the closed flag. Returns true only for the call that actually
    /// closed the connection; the flag never reverts.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[tokio::test]
    async fn mark_closed_is_monotonic() {
        let conn = Connection::new(MockTransport::open());

        assert!(!conn.is_closed());
        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn record_pong_advances_liveness() {
        let conn = Connection::new(MockTransport::open());
        let initial = conn.last_pong().await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        conn.record_pong().await;

        assert!(conn.last_pong().await > initial);
    }
}

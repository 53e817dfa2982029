//! Transport collaborator seam
//!
//! Framing, TLS and the upgrade handshake belong to tokio-tungstenite; the
//! rest of the crate only ever talks to a [`Transport`]. The production
//! implementation feeds a writer task that owns the socket sink, so sends
//! are fire-and-forget from the caller's perspective.

use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// The operations this layer needs from an underlying socket.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text frame. Failure is fatal to the connection.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Send a ping probe. Failure is fatal to the connection.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Forcefully close the socket. Must be safe to call repeatedly.
    async fn terminate(&self);

    /// Whether the socket currently reports open.
    fn is_open(&self) -> bool;
}

/// Production transport over a tokio-tungstenite socket. Frames go through
/// an unbounded channel into the writer task spawned by the server; the
/// shared open flag is flipped by whichever side observes the socket die.
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
}

impl WsTransport {
    pub(crate) fn new(outbound: mpsc::UnboundedSender<Message>, open: Arc<AtomicBool>) -> Self {
        Self { outbound, open }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::SendFailed("socket not open".into()));
        }
        self.outbound
            .send(Message::Text(text.to_owned()))
            .map_err(|_| TransportError::SendFailed("writer task gone".into()))
    }

    async fn ping(&self) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::PingFailed("socket not open".into()));
        }
        self.outbound
            .send(Message::Ping(Vec::new()))
            .map_err(|_| TransportError::PingFailed("writer task gone".into()))
    }

    async fn terminate(&self) {
        self.open.store(false, Ordering::SeqCst);
        // Writer task drains the close frame and shuts the sink down.
        let _ = self.outbound.send(Message::Close(None));
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

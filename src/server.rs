//! WebSocket server: accept loop, frame handling and component wiring

use crate::codec::{kind, Envelope, MessageCodec};
use crate::connection::{Connection, ConnectionFactory};
use crate::dispatch::DispatchBus;
use crate::error::SocketResult;
use crate::heartbeat::HeartbeatMonitor;
use crate::registry::ConnectionRegistry;
use crate::room::RoomRegistry;
use crate::transport::{Transport, WsTransport};
use crate::types::ServerConfig;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Room-aware WebSocket server.
///
/// Owns the connection registry, room registry, dispatch bus and heartbeat
/// monitor, and wires them together: decoded envelopes are published on the
/// bus, the bus's `disconnect` kind prunes room membership, and every fatal
/// transport error funnels into the registry's eviction path.
pub struct WebSocketServer {
    codec: MessageCodec,
    bus: Arc<DispatchBus>,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
    heartbeat: HeartbeatMonitor,
    connection_factory: Option<ConnectionFactory>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketServer {
    /// Build a server from configuration and wire the lifecycle plumbing.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let bus = Arc::new(DispatchBus::new());
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&bus)));
        let rooms = Arc::new(RoomRegistry::new(
            Arc::clone(&registry),
            config.room_factory.clone(),
            config.room_selector.clone(),
            config.evict_empty_rooms,
        ));

        // A disconnecting client is pruned from every room exactly once.
        let rooms_on_disconnect = Arc::clone(&rooms);
        bus.subscribe(kind::DISCONNECT, move |_envelope, conn| {
            let rooms = Arc::clone(&rooms_on_disconnect);
            async move {
                rooms.remove_client_from_all_rooms(conn.id).await;
            }
        });

        let heartbeat = HeartbeatMonitor::new(
            Arc::clone(&registry),
            config.heartbeat_interval(),
            config.heartbeat_timeout(),
        );

        Arc::new(Self {
            codec: MessageCodec::with_validator(config.validator.clone()),
            bus,
            registry,
            rooms,
            heartbeat,
            connection_factory: config.connection_factory,
            accept_handle: Mutex::new(None),
        })
    }

    pub fn bus(&self) -> &Arc<DispatchBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Subscribe a handler to a message kind. Convenience passthrough to
    /// the dispatch bus.
    pub fn subscribe<F, Fut>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(Envelope, Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bus.subscribe(kind, handler);
    }

    /// Bind a listener, start the heartbeat and spawn the accept loop.
    /// Returns the bound address.
    pub async fn start(self: &Arc<Self>, addr: SocketAddr) -> SocketResult<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "websocket server listening");

        self.heartbeat.start().await;

        let server = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&server);
                        tokio::spawn(async move {
                            server.handle_socket(stream, peer).await;
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to accept connection");
                    }
                }
            }
        });
        *self.accept_handle.lock().await = Some(handle);

        Ok(local_addr)
    }

    /// Stop accepting, stop the heartbeat and tear down every connection.
    /// Mirrors the registry's silent clear: no disconnect events are
    /// emitted for connections torn down by shutdown.
    pub async fn stop(&self) {
        if let Some(handle) = self.accept_handle.lock().await.take() {
            handle.abort();
        }
        self.heartbeat.stop().await;
        self.registry.clear().await;
        info!("websocket server stopped");
    }

    /// Register an externally-built transport as a new connection: runs the
    /// configured connection factory, emits `connect` and applies room
    /// auto-assignment. The accept loop uses this same path.
    pub async fn attach(&self, transport: Arc<dyn Transport>) -> Arc<Connection> {
        let conn = match &self.connection_factory {
            Some(factory) => factory(transport),
            None => Connection::new(transport),
        };
        let conn = self.registry.register(conn).await;
        self.rooms.auto_assign(&conn).await;
        conn
    }

    /// Decode a raw frame and publish it, or report the decode failure back
    /// to the sender. Decode failures never close the connection.
    pub async fn handle_frame(&self, conn: &Arc<Connection>, payload: &[u8]) {
        match self.codec.decode(payload) {
            Ok(envelope) => self.bus.publish(envelope, Arc::clone(conn)).await,
            Err(err) => {
                debug!(connection = %conn.id, error = %err, "frame rejected");
                self.send(conn, &Envelope::error(err.to_string())).await;
            }
        }
    }

    /// Send an envelope to one connection. A transport that reports closed
    /// is skipped; a send failure evicts the connection.
    pub async fn send(&self, conn: &Arc<Connection>, envelope: &Envelope) {
        if !conn.transport().is_open() {
            return;
        }
        if let Err(err) = conn.transport().send(&envelope.to_wire()).await {
            warn!(connection = %conn.id, error = %err, "send failed, evicting");
            self.registry.evict(conn).await;
        }
    }

    /// Broadcast an envelope to every registered connection whose transport
    /// reports open, skipping `exclude`. Per-member failures evict only
    /// that member.
    pub async fn broadcast_all(&self, envelope: &Envelope, exclude: Option<&Connection>) {
        let wire = envelope.to_wire();
        for conn in self.registry.list().await {
            if let Some(excluded) = exclude {
                if excluded.id == conn.id {
                    continue;
                }
            }
            if !conn.transport().is_open() {
                continue;
            }
            if let Err(err) = conn.transport().send(&wire).await {
                warn!(connection = %conn.id, error = %err, "broadcast send failed, evicting");
                self.registry.evict(&conn).await;
            }
        }
    }

    /// Drive one accepted socket: tungstenite handshake, writer task, read
    /// loop, then the disconnection path.
    async fn handle_socket(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws_stream) => ws_stream,
            Err(err) => {
                warn!(peer = %peer, error = %err, "websocket handshake failed");
                return;
            }
        };
        debug!(peer = %peer, "websocket connection established");

        let (mut sink, mut reader) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let open = Arc::new(AtomicBool::new(true));

        let writer_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
            writer_open.store(false, Ordering::SeqCst);
            let _ = sink.close().await;
        });

        let transport = Arc::new(WsTransport::new(outbound.clone(), Arc::clone(&open)));
        let conn = self.attach(transport).await;

        while let Some(frame) = reader.next().await {
            match frame {
                Ok(Message::Text(text)) => self.handle_frame(&conn, text.as_bytes()).await,
                Ok(Message::Binary(data)) => self.handle_frame(&conn, &data).await,
                Ok(Message::Pong(_)) => conn.record_pong().await,
                Ok(Message::Ping(data)) => {
                    let _ = outbound.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(connection = %conn.id, error = %err, "socket error");
                    break;
                }
            }
        }

        open.store(false, Ordering::SeqCst);
        self.registry.unregister(conn.id).await;
        debug!(peer = %peer, connection = %conn.id, "websocket connection finished");
    }
}

impl Drop for WebSocketServer {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.accept_handle.try_lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::types::RoomId;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn quiet_server() -> Arc<WebSocketServer> {
        WebSocketServer::new(ServerConfig::builder().no_heartbeat().build())
    }

    #[tokio::test]
    async fn valid_frame_reaches_subscriber_with_connection() {
        let server = quiet_server();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        server.subscribe("chat", move |envelope, conn| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push((envelope.kind, conn.id));
            }
        });

        let transport = MockTransport::open();
        let conn = server.attach(transport.clone() as _).await;
        server
            .handle_frame(&conn, br#"{"type":"chat","body":"hi"}"#)
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ("chat".to_owned(), conn.id));
        assert!(transport.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_gets_error_envelope_and_stays_connected() {
        let server = quiet_server();
        let transport = MockTransport::open();
        let conn = server.attach(transport.clone() as _).await;

        server.handle_frame(&conn, b"not json").await;

        let frames = transport.sent_frames();
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Invalid JSON format");
        assert!(server.registry().get(conn.id).await.is_some());
    }

    #[tokio::test]
    async fn kindless_frame_reports_missing_type() {
        let server = quiet_server();
        let transport = MockTransport::open();
        let conn = server.attach(transport.clone() as _).await;

        server.handle_frame(&conn, b"{}").await;

        let frames = transport.sent_frames();
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["message"], "Missing message type");
    }

    #[tokio::test]
    async fn rejected_frame_reports_invalid_message() {
        let server = WebSocketServer::new(
            ServerConfig::builder()
                .no_heartbeat()
                .validator(Arc::new(|value| value.get("body").is_some()))
                .build(),
        );
        let transport = MockTransport::open();
        let conn = server.attach(transport.clone() as _).await;

        server.handle_frame(&conn, br#"{"type":"chat"}"#).await;

        let frames = transport.sent_frames();
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["message"], "Invalid message");
        assert!(server.registry().get(conn.id).await.is_some());
    }

    #[tokio::test]
    async fn attach_emits_connect_and_auto_assigns() {
        let server = WebSocketServer::new(
            ServerConfig::builder()
                .no_heartbeat()
                .room_selector(Arc::new(|_conn| Some(RoomId::from("waiting"))))
                .build(),
        );
        let connects = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&connects);
        server.subscribe(kind::CONNECT, move |_envelope, _conn| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let conn = server.attach(MockTransport::open() as _).await;

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        let room = server.rooms().get_room(&"waiting".into()).await.unwrap();
        assert!(room.contains(conn.id).await);
    }

    #[tokio::test]
    async fn disconnect_prunes_room_membership() {
        let server = quiet_server();
        let conn = server.attach(MockTransport::open() as _).await;
        server.rooms().create_room(Some("lobby".into())).await;
        server.rooms().add_client(conn.id, &"lobby".into()).await;

        server.registry().unregister(conn.id).await;

        let room = server.rooms().get_room(&"lobby".into()).await.unwrap();
        assert!(!room.contains(conn.id).await);
    }

    #[tokio::test]
    async fn broadcast_all_skips_excluded_connection() {
        let server = quiet_server();
        let ta = MockTransport::open();
        let tb = MockTransport::open();
        let a = server.attach(ta.clone() as _).await;
        let _b = server.attach(tb.clone() as _).await;

        server
            .broadcast_all(&Envelope::new("notice"), Some(&a))
            .await;

        assert!(ta.sent_frames().is_empty());
        assert_eq!(tb.sent_frames().len(), 1);
    }

    #[tokio::test]
    async fn send_failure_evicts_connection() {
        let server = quiet_server();
        let transport = MockTransport::open();
        transport.fail_sends();
        let conn = server.attach(transport.clone() as _).await;

        server.send(&conn, &Envelope::new("notice")).await;

        assert!(transport.was_terminated());
        assert!(server.registry().get(conn.id).await.is_none());
    }

    #[tokio::test]
    async fn connection_factory_override_is_used() {
        let marker = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&marker);
        let server = WebSocketServer::new(
            ServerConfig::builder()
                .no_heartbeat()
                .connection_factory(Arc::new(move |transport| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Connection::new(transport)
                }))
                .build(),
        );

        server.attach(MockTransport::open() as _).await;

        assert_eq!(marker.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_clears_registry_silently() {
        let server = quiet_server();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disconnects);
        server.subscribe(kind::DISCONNECT, move |_envelope, _conn| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let transport = MockTransport::open();
        server.attach(transport.clone() as _).await;
        server.stop().await;

        assert_eq!(server.registry().count().await, 0);
        assert!(transport.was_terminated());
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    }
}

//! Room-aware convenience layer over a WebSocket transport
//!
//! Framing, TLS and the upgrade handshake are delegated to
//! tokio-tungstenite; this crate layers connection lifecycle tracking,
//! heartbeat-based liveness detection, typed JSON envelope dispatch and
//! room-scoped broadcast on top.
//!
//! ## Architecture
//!
//! - [`ConnectionRegistry`]: live connections by identity; registering and
//!   unregistering synthesize `connect` / `disconnect` envelopes.
//! - [`HeartbeatMonitor`]: periodic ping sweep that evicts peers missing
//!   the liveness timeout.
//! - [`MessageCodec`]: raw frames into [`Envelope`]s, with an optional
//!   caller-supplied validator.
//! - [`DispatchBus`]: kind-keyed publish/subscribe routing.
//! - [`RoomRegistry`]: named groups of connection identities with scoped
//!   broadcast and optional auto-eviction of empty rooms.
//! - [`WebSocketServer`]: accept loop and wiring.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use roomsock::{ServerConfig, WebSocketServer};
//!
//! #[tokio::main]
//! async fn main() -> roomsock::SocketResult<()> {
//!     let server = WebSocketServer::new(ServerConfig::default());
//!
//!     server.subscribe("chat", |envelope, conn| async move {
//!         println!("{} says {:?}", conn.id, envelope.fields.get("body"));
//!     });
//!
//!     server.start(([127, 0, 0, 1], 9000).into()).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod registry;
pub mod room;
pub mod server;
pub mod transport;
pub mod types;

pub use codec::{kind, Envelope, MessageCodec, Validator};
pub use connection::{Connection, ConnectionFactory};
pub use dispatch::DispatchBus;
pub use error::{DecodeError, SocketError, SocketResult, TransportError};
pub use heartbeat::HeartbeatMonitor;
pub use registry::ConnectionRegistry;
pub use room::{Room, RoomFactory, RoomRegistry, RoomSelector};
pub use server::WebSocketServer;
pub use types::{ConnectionId, RoomId, ServerConfig, ServerConfigBuilder};

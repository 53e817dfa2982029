//! Identifiers and server configuration

use crate::codec::Validator;
use crate::connection::ConnectionFactory;
use crate::room::{RoomFactory, RoomSelector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Default heartbeat probe interval (10s).
pub const HEARTBEAT_DEFAULT_INTERVAL: Duration = Duration::from_millis(10_000);
/// Default liveness timeout before a silent peer is evicted (15s).
pub const HEARTBEAT_DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Unique identifier for a connection, generated at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a room. Caller-supplied names are used as-is; generated
/// ids are random uuid strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server configuration. All knobs are optional; defaults match the
/// heartbeat constants above with room auto-eviction disabled.
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Interval between heartbeat sweeps. `Duration::ZERO` disables the
    /// monitor entirely, which test harnesses rely on.
    pub heartbeat_interval: Option<Duration>,
    /// How long a connection may go without a pong before eviction.
    pub heartbeat_timeout: Option<Duration>,
    /// Message validator run after structural decode.
    pub validator: Option<Validator>,
    /// Override for constructing connections from accepted transports.
    pub connection_factory: Option<ConnectionFactory>,
    /// Override for constructing rooms.
    pub room_factory: Option<RoomFactory>,
    /// Maps a newly connected client to a target room, if any.
    pub room_selector: Option<RoomSelector>,
    /// Delete a room from the registry once its last member leaves.
    pub evict_empty_rooms: bool,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    pub(crate) fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval.unwrap_or(HEARTBEAT_DEFAULT_INTERVAL)
    }

    pub(crate) fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout.unwrap_or(HEARTBEAT_DEFAULT_TIMEOUT)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the heartbeat sweep interval. Zero disables the monitor.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = Some(interval);
        self
    }

    /// Set the liveness timeout.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.config.heartbeat_timeout = Some(timeout);
        self
    }

    /// Disable the heartbeat monitor.
    pub fn no_heartbeat(mut self) -> Self {
        self.config.heartbeat_interval = Some(Duration::ZERO);
        self
    }

    /// Install a message validator predicate.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.config.validator = Some(validator);
        self
    }

    /// Override connection construction.
    pub fn connection_factory(mut self, factory: ConnectionFactory) -> Self {
        self.config.connection_factory = Some(factory);
        self
    }

    /// Override room construction.
    pub fn room_factory(mut self, factory: RoomFactory) -> Self {
        self.config.room_factory = Some(factory);
        self
    }

    /// Install a room auto-assignment selector.
    pub fn room_selector(mut self, selector: RoomSelector) -> Self {
        self.config.room_selector = Some(selector);
        self
    }

    /// Delete rooms from the registry as soon as they become empty.
    pub fn evict_empty_rooms(mut self, enabled: bool) -> Self {
        self.config.evict_empty_rooms = enabled;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

//! Room registry: lifecycle, membership and scoped broadcast

use super::room::Room;
use crate::codec::Envelope;
use crate::connection::Connection;
use crate::registry::ConnectionRegistry;
use crate::types::{ConnectionId, RoomId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Pluggable room constructor.
pub type RoomFactory = Arc<dyn Fn(Option<RoomId>) -> Room + Send + Sync>;

/// Maps a newly connected client to a target room id; `None` means no
/// assignment.
pub type RoomSelector = Arc<dyn Fn(&Connection) -> Option<RoomId> + Send + Sync>;

/// Named groups of connection identities with scoped broadcast and optional
/// auto-eviction of empty rooms.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    connections: Arc<ConnectionRegistry>,
    factory: RoomFactory,
    selector: Option<RoomSelector>,
    evict_empty: bool,
}

impl RoomRegistry {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        factory: Option<RoomFactory>,
        selector: Option<RoomSelector>,
        evict_empty: bool,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            connections,
            factory: factory.unwrap_or_else(|| Arc::new(Room::new)),
            selector,
            evict_empty,
        }
    }

    /// Create a room, or return the existing one for an already-known id.
    pub async fn create_room(&self, id: Option<RoomId>) -> Arc<Room> {
        if let Some(id) = &id {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(id) {
                return Arc::clone(room);
            }
        }

        let room = Arc::new((self.factory)(id));
        let mut rooms = self.rooms.write().await;
        // A racing creator may have won; keep the stored room canonical.
        if let Some(existing) = rooms.get(&room.id) {
            return Arc::clone(existing);
        }
        info!(room = %room.id, "room created");
        rooms.insert(room.id.clone(), Arc::clone(&room));
        room
    }

    pub async fn get_room(&self, id: &RoomId) -> Option<Arc<Room>> {
        let rooms = self.rooms.read().await;
        rooms.get(id).cloned()
    }

    /// Snapshot of all rooms.
    pub async fn rooms(&self) -> Vec<Arc<Room>> {
        let rooms = self.rooms.read().await;
        rooms.values().cloned().collect()
    }

    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }

    /// Add a connection to a room. Returns false if the room is absent, the
    /// connection is not currently registered, or it is already a member.
    pub async fn add_client(&self, id: ConnectionId, room_id: &RoomId) -> bool {
        let Some(room) = self.get_room(room_id).await else {
            return false;
        };
        if !self.connections.contains(id).await {
            warn!(connection = %id, room = %room_id, "rejected room add for unregistered connection");
            return false;
        }

        let added = room.add(id).await;
        if added {
            info!(connection = %id, room = %room_id, "client joined room");
        }
        added
    }

    /// Remove a connection from a room. Returns false if the room is absent
    /// or it was not a member. Deletes the room when it empties and
    /// auto-eviction is enabled.
    pub async fn remove_client(&self, id: ConnectionId, room_id: &RoomId) -> bool {
        let Some(room) = self.get_room(room_id).await else {
            return false;
        };

        if !room.remove(id).await {
            return false;
        }
        info!(connection = %id, room = %room_id, "client left room");

        if self.evict_empty && room.is_empty().await {
            let mut rooms = self.rooms.write().await;
            // Re-check under the write lock; a new member may have joined.
            if room.is_empty().await && rooms.remove(room_id).is_some() {
                info!(room = %room_id, "evicted empty room");
            }
        }
        true
    }

    /// Remove a connection from every room. Bound to the dispatch bus's
    /// `disconnect` kind so a disconnecting client is pruned everywhere.
    pub async fn remove_client_from_all_rooms(&self, id: ConnectionId) {
        let room_ids: Vec<RoomId> = {
            let rooms = self.rooms.read().await;
            rooms.keys().cloned().collect()
        };

        for room_id in room_ids {
            self.remove_client(id, &room_id).await;
        }
    }

    /// Broadcast an envelope to every member of a room whose transport
    /// reports open, skipping `exclude`. A send failure evicts only the
    /// failing member; the broadcast continues.
    pub async fn broadcast(&self, room_id: &RoomId, envelope: &Envelope, exclude: Option<ConnectionId>) {
        let Some(room) = self.get_room(room_id).await else {
            debug!(room = %room_id, "broadcast to unknown room");
            return;
        };

        let wire = envelope.to_wire();
        for member in room.member_ids().await {
            if Some(member) == exclude {
                continue;
            }
            // Stale membership: the connection may have left the registry
            // without a disconnect event reaching us yet.
            let Some(conn) = self.connections.get(member).await else {
                continue;
            };
            if !conn.transport().is_open() {
                continue;
            }
            if let Err(err) = conn.transport().send(&wire).await {
                warn!(connection = %member, room = %room_id, error = %err, "broadcast send failed, evicting member");
                self.connections.evict(&conn).await;
            }
        }
    }

    /// Run the configured selector for a new connection, creating the
    /// target room if needed. No selector or a `None` verdict means no
    /// assignment.
    pub async fn auto_assign(&self, conn: &Arc<Connection>) {
        let Some(selector) = &self.selector else {
            return;
        };
        let Some(room_id) = selector(conn) else {
            return;
        };

        self.create_room(Some(room_id.clone())).await;
        self.add_client(conn.id, &room_id).await;
    }

    /// Linear scan for the first room containing the connection. Typical
    /// usage keeps a connection in at most one room, but that is a
    /// convention, not an enforced invariant.
    pub async fn find_room_of(&self, id: ConnectionId) -> Option<Arc<Room>> {
        for room in self.rooms().await {
            if room.contains(id).await {
                return Some(room);
            }
        }
        None
    }

    /// Resolve a room's members through the connection registry.
    pub async fn clients_in_room(&self, room_id: &RoomId) -> Vec<Arc<Connection>> {
        let Some(room) = self.get_room(room_id).await else {
            return Vec::new();
        };

        let mut clients = Vec::new();
        for member in room.member_ids().await {
            if let Some(conn) = self.connections.get(member).await {
                clients.push(conn);
            }
        }
        clients
    }
}

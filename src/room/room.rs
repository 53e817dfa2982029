//! Core Room implementation

use crate::types::{ConnectionId, RoomId};
use std::collections::HashSet;
use tokio::sync::RwLock;

/// A named, mutable set of connection identities used for scoped broadcast.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    members: RwLock<HashSet<ConnectionId>>,
}

impl Room {
    /// Create a room with the given id, or a generated one.
    pub fn new(id: Option<RoomId>) -> Self {
        Self {
            id: id.unwrap_or_else(RoomId::generate),
            members: RwLock::new(HashSet::new()),
        }
    }

    /// Add a member. Returns false (no-op) if already present.
    pub async fn add(&self, id: ConnectionId) -> bool {
        let mut members = self.members.write().await;
        members.insert(id)
    }

    /// Remove a member. Returns false if it was not a member.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let mut members = self.members.write().await;
        members.remove(&id)
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        let members = self.members.read().await;
        members.contains(&id)
    }

    /// Snapshot of the current member identities.
    pub async fn member_ids(&self) -> Vec<ConnectionId> {
        let members = self.members.read().await;
        members.iter().copied().collect()
    }

    pub async fn member_count(&self) -> usize {
        let members = self.members.read().await;
        members.len()
    }

    pub async fn is_empty(&self) -> bool {
        let members = self.members.read().await;
        members.is_empty()
    }
}

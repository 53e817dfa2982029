//! Room system: named groups of connection identities with scoped broadcast
//!
//! Rooms reference connections by id only; ownership stays with the
//! [`ConnectionRegistry`](crate::ConnectionRegistry). The registry here is
//! wired to the dispatch bus's `disconnect` kind so a disconnecting client
//! is pruned from every room exactly once.

pub mod registry;
#[allow(clippy::module_inception)]
pub mod room;


pub use registry::{RoomFactory, RoomRegistry, RoomSelector};
pub use room::Room;

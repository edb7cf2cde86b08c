//! Room membership registry.
//!
//! The registry maps rooms to their members and connections to their room.
//! Both tables live behind one lock so join, leave and target snapshots are
//! atomic with respect to each other. No I/O ever happens under the lock.

use crate::connection::ConnectionId;
use crate::room::{Room, RoomId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Outcome of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection entered the room.
    Joined,
    /// The connection was already a member of the room.
    AlreadyMember,
    /// The connection left another room to enter this one.
    Moved {
        /// Room the connection left.
        from: RoomId,
    },
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of non-empty rooms.
    pub room_count: usize,
    /// Number of connections that are in a room.
    pub connection_count: usize,
}

#[derive(Debug, Default)]
struct Tables {
    /// Rooms indexed by name.
    rooms: HashMap<RoomId, Room>,
    /// Membership index (connection_id -> room name).
    membership: HashMap<ConnectionId, RoomId>,
}

impl Tables {
    /// Remove `connection_id` from `room_name`, dropping the room once empty.
    fn remove_member(&mut self, connection_id: &ConnectionId, room_name: &str) {
        if let Some(room) = self.rooms.get_mut(room_name) {
            room.remove(connection_id);
            if room.is_empty() {
                self.rooms.remove(room_name);
                debug!(room = %room_name, "Removed empty room");
            }
        }
    }
}

/// Room membership registry.
#[derive(Debug, Default)]
pub struct Registry {
    tables: Mutex<Tables>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation completes before the guard drops, so a poisoned lock
    // still guards consistent tables.
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a connection into a room, creating the room if needed.
    ///
    /// A connection is in at most one room; joining a different room moves it.
    pub fn join(&self, connection_id: &ConnectionId, room_name: &str) -> JoinOutcome {
        let mut tables = self.lock();

        let previous = tables.membership.get(connection_id).cloned();
        let outcome = match previous {
            Some(current) if current == room_name => JoinOutcome::AlreadyMember,
            Some(current) => {
                tables.remove_member(connection_id, &current);
                JoinOutcome::Moved { from: current }
            }
            None => JoinOutcome::Joined,
        };

        if outcome != JoinOutcome::AlreadyMember {
            tables
                .rooms
                .entry(room_name.to_string())
                .or_insert_with(|| {
                    debug!(room = %room_name, "Creating new room");
                    Room::new()
                })
                .insert(connection_id.clone());
            tables
                .membership
                .insert(connection_id.clone(), room_name.to_string());
        }

        debug!(
            room = %room_name,
            connection = %connection_id,
            outcome = ?outcome,
            "Joined"
        );

        outcome
    }

    /// Remove a connection from whatever room it is in.
    ///
    /// Returns the room the connection left. Unknown connections are a no-op.
    pub fn leave(&self, connection_id: &ConnectionId) -> Option<RoomId> {
        let mut tables = self.lock();

        let room_name = tables.membership.remove(connection_id)?;
        tables.remove_member(connection_id, &room_name);

        debug!(room = %room_name, connection = %connection_id, "Left");
        Some(room_name)
    }

    /// Every other member of the connection's room, in join order.
    ///
    /// Returns an empty list if the connection is not in a room.
    #[must_use]
    pub fn broadcast_targets(&self, connection_id: &ConnectionId) -> Vec<ConnectionId> {
        let tables = self.lock();

        let targets = tables
            .membership
            .get(connection_id)
            .and_then(|room_name| tables.rooms.get(room_name))
            .map(|room| room.others(connection_id))
            .unwrap_or_default();

        trace!(connection = %connection_id, targets = targets.len(), "Broadcast targets");
        targets
    }

    /// Get the room a connection is in.
    #[must_use]
    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<RoomId> {
        self.lock().membership.get(connection_id).cloned()
    }

    /// Get the members of a room, in join order.
    #[must_use]
    pub fn members(&self, room_name: &str) -> Vec<ConnectionId> {
        self.lock()
            .rooms
            .get(room_name)
            .map(|room| room.members().to_vec())
            .unwrap_or_default()
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, room_name: &str) -> bool {
        self.lock().rooms.contains_key(room_name)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let tables = self.lock();
        RegistryStats {
            room_count: tables.rooms.len(),
            connection_count: tables.membership.len(),
        }
    }
}

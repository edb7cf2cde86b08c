//! Room abstraction for the relay.
//!
//! A room is a named group of connections that exchange negotiation
//! messages with each other.

use crate::connection::ConnectionId;

/// A room identifier.
pub type RoomId = String;

/// A room and its members.
///
/// Members keep their join order so fan-out is deterministic, but nothing
/// relies on that order for correctness.
#[derive(Debug, Clone, Default)]
pub struct Room {
    /// Member connection IDs.
    members: Vec<ConnectionId>,
}

impl Room {
    /// Create a new, empty room.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains(connection_id)
    }

    /// Add a member.
    ///
    /// Returns `false` if the connection was already a member.
    pub fn insert(&mut self, connection_id: ConnectionId) -> bool {
        if self.contains(&connection_id) {
            return false;
        }
        self.members.push(connection_id);
        true
    }

    /// Remove a member.
    ///
    /// Returns `true` if the connection was a member.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != connection_id);
        self.members.len() != before
    }

    /// All members except `connection_id`, in join order.
    #[must_use]
    pub fn others(&self, connection_id: &ConnectionId) -> Vec<ConnectionId> {
        self.members
            .iter()
            .filter(|member| *member != connection_id)
            .cloned()
            .collect()
    }

    /// All members, in join order.
    #[must_use]
    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_creation() {
        let room = Room::new();
        assert_eq!(room.len(), 0);
        assert!(room.is_empty());
    }

    #[test]
    fn test_room_insert_remove() {
        let mut room = Room::new();
        let a = ConnectionId::from("a");
        let b = ConnectionId::from("b");

        assert!(room.insert(a.clone()));
        assert!(!room.insert(a.clone()));
        assert!(room.insert(b.clone()));
        assert_eq!(room.len(), 2);

        assert!(room.remove(&a));
        assert!(!room.contains(&a));
        assert!(!room.remove(&a));
        assert_eq!(room.members(), &[b]);
    }

    #[test]
    fn test_room_others_excludes_self() {
        let mut room = Room::new();
        for id in ["a", "b", "c"] {
            room.insert(id.into());
        }

        let others = room.others(&"b".into());
        assert_eq!(others, vec![ConnectionId::from("a"), ConnectionId::from("c")]);

        let outsider = room.others(&"z".into());
        assert_eq!(outsider.len(), 3);
    }
}

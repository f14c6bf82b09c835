use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Identifies one live WebSocket connection for the lifetime of the process
pub type ConnectionId = u64;

/// Outbound half of a connection: frames pushed here are written to its socket
pub type Outbound = mpsc::UnboundedSender<String>;

/// In-memory room membership, keyed by room name (a user id).
///
/// Nothing here is persisted; rooms are rebuilt as clients reconnect.
#[derive(Default)]
pub struct RoomRegistry {
    /// room -> live connections (a user may have several tabs open)
    rooms: DashMap<String, Vec<(ConnectionId, Outbound)>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add a connection to a room. Joining twice with the same connection is a no-op.
    pub fn join(&self, room: &str, conn: ConnectionId, tx: Outbound) {
        let mut members = self.rooms.entry(room.to_string()).or_default();
        if !members.iter().any(|(id, _)| *id == conn) {
            members.push((conn, tx));
        }
    }

    /// Remove a connection from a room, dropping the room once it is empty
    pub fn leave(&self, room: &str, conn: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.retain(|(id, _)| *id != conn);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    /// Send a frame to every connection in the room. Returns how many accepted it.
    ///
    /// Connections whose channel has closed are pruned on the way.
    pub fn emit(&self, room: &str, payload: &str) -> usize {
        let delivered = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.retain(|(_, tx)| tx.send(payload.to_string()).is_ok());
                members.len()
            }
            None => 0,
        };

        if delivered == 0 {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
        debug!(room, delivered, "emitted");
        delivered
    }

    /// Number of live connections in a room
    pub fn members(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Names of all non-empty rooms
    pub fn rooms(&self) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_empty() {
        let rooms = RoomRegistry::new();
        assert!(rooms.is_empty());
        assert!(rooms.rooms().is_empty());
        assert_eq!(rooms.members("1"), 0);
    }

    #[test]
    fn test_join_and_leave() {
        let rooms = RoomRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        rooms.join("1", 10, tx);
        assert_eq!(rooms.members("1"), 1);
        assert_eq!(rooms.rooms(), vec!["1".to_string()]);

        rooms.leave("1", 10);
        assert_eq!(rooms.members("1"), 0);
        assert!(rooms.is_empty());
    }

    #[test]
    fn test_rejoin_does_not_duplicate_delivery() {
        let rooms = RoomRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        rooms.join("1", 10, tx.clone());
        rooms.join("1", 10, tx);

        assert_eq!(rooms.emit("1", "hello"), 1);
        assert_eq!(rx.try_recv().unwrap(), "hello");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_reaches_every_connection_in_room() {
        let rooms = RoomRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        // Two tabs of user 42, one connection of user 7
        rooms.join("42", 1, tx1);
        rooms.join("42", 2, tx2);
        rooms.join("7", 3, tx3);

        assert_eq!(rooms.emit("42", "for 42"), 2);
        assert_eq!(rx1.try_recv().unwrap(), "for 42");
        assert_eq!(rx2.try_recv().unwrap(), "for 42");
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_emit_to_unknown_room_is_noop() {
        let rooms = RoomRegistry::new();
        assert_eq!(rooms.emit("nobody", "hello"), 0);
        assert!(rooms.is_empty());
    }

    #[test]
    fn test_leave_keeps_other_connections() {
        let rooms = RoomRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        rooms.join("1", 1, tx1);
        rooms.join("1", 2, tx2);
        rooms.leave("1", 1);

        assert_eq!(rooms.members("1"), 1);
        assert_eq!(rooms.emit("1", "still here"), 1);
        assert_eq!(rx2.try_recv().unwrap(), "still here");
    }

    #[test]
    fn test_emit_prunes_closed_connections() {
        let rooms = RoomRegistry::new();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        rooms.join("1", 1, tx1);
        rooms.join("1", 2, tx2);
        drop(rx1);

        assert_eq!(rooms.emit("1", "hello"), 1);
        assert_eq!(rooms.members("1"), 1);
        assert_eq!(rx2.try_recv().unwrap(), "hello");

        drop(rx2);
        assert_eq!(rooms.emit("1", "gone"), 0);
        assert!(rooms.is_empty());
    }
}

use std::collections::HashSet;

use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::events::ServerEvent;

/// Connection registry and fan-out for realtime events.
///
/// Three maps: connection id -> outbound channel, user id -> that user's
/// connection ids, chat id -> connection ids subscribed to the chat. Events
/// are serialized once and sent as strings; a failed send means the receiver
/// hung up and the connection is being torn down, so it is ignored.
pub struct Hub {
    connections: DashMap<String, UnboundedSender<String>>,
    users: DashMap<String, DashSet<String>>,
    rooms: DashMap<String, DashSet<String>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            users: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    pub fn register(&self, conn_id: String, sender: UnboundedSender<String>) {
        self.connections.insert(conn_id, sender);
    }

    /// Binds an authenticated connection to its user. A user may hold several
    /// connections at once (multiple devices).
    pub fn bind_user(&self, user_id: &str, conn_id: &str) {
        self.users
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    pub fn join_room(&self, chat_id: &str, conn_id: &str) {
        self.rooms
            .entry(chat_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    pub fn leave_room(&self, chat_id: &str, conn_id: &str) {
        if let Some(room) = self.rooms.get(chat_id) {
            room.remove(conn_id);
        }
        self.rooms.remove_if(chat_id, |_, room| room.is_empty());
    }

    /// Removes a connection from every map. Called once when the socket
    /// closes; user and room entries that become empty are dropped.
    pub fn disconnect(&self, conn_id: &str) {
        self.connections.remove(conn_id);
        for entry in self.users.iter() {
            entry.value().remove(conn_id);
        }
        self.users.retain(|_, conns| !conns.is_empty());
        for entry in self.rooms.iter() {
            entry.value().remove(conn_id);
        }
        self.rooms.retain(|_, conns| !conns.is_empty());
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users
            .get(user_id)
            .map(|conns| !conns.is_empty())
            .unwrap_or(false)
    }

    fn serialize(event: &ServerEvent) -> Option<String> {
        match serde_json::to_string(event) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("failed to serialize event: {}", e);
                None
            }
        }
    }

    fn send_raw(&self, conn_id: &str, payload: &str) {
        if let Some(sender) = self.connections.get(conn_id) {
            let _ = sender.send(payload.to_string());
        }
    }

    pub fn send_to_conn(&self, conn_id: &str, event: &ServerEvent) {
        if let Some(payload) = Self::serialize(event) {
            self.send_raw(conn_id, &payload);
        }
    }

    /// Sends to every connection the user currently holds.
    pub fn publish_to_user(&self, user_id: &str, event: &ServerEvent) {
        let Some(payload) = Self::serialize(event) else {
            return;
        };
        if let Some(conns) = self.users.get(user_id) {
            for conn_id in conns.iter() {
                self.send_raw(&conn_id, &payload);
            }
        }
    }

    pub fn publish_to_users(&self, user_ids: &[String], event: &ServerEvent) {
        let Some(payload) = Self::serialize(event) else {
            return;
        };
        for user_id in user_ids {
            if let Some(conns) = self.users.get(user_id) {
                for conn_id in conns.iter() {
                    self.send_raw(&conn_id, &payload);
                }
            }
        }
    }

    /// Relays to the chat room only, leaving out one connection. Used for
    /// typing indicators so the typist does not hear their own echo.
    pub fn publish_to_room_except(
        &self,
        chat_id: &str,
        except_conn_id: &str,
        event: &ServerEvent,
    ) {
        let Some(payload) = Self::serialize(event) else {
            return;
        };
        if let Some(room) = self.rooms.get(chat_id) {
            for conn_id in room.iter() {
                if conn_id.as_str() != except_conn_id {
                    self.send_raw(&conn_id, &payload);
                }
            }
        }
    }

    /// Fans an event out to a chat: the union of connections subscribed to
    /// the chat room and connections of the listed participants. Each
    /// connection receives the event exactly once.
    pub fn publish_to_chat(&self, chat_id: &str, participants: &[String], event: &ServerEvent) {
        let Some(payload) = Self::serialize(event) else {
            return;
        };
        let mut targets: HashSet<String> = HashSet::new();
        if let Some(room) = self.rooms.get(chat_id) {
            for conn_id in room.iter() {
                targets.insert(conn_id.key().clone());
            }
        }
        for user_id in participants {
            if let Some(conns) = self.users.get(user_id) {
                for conn_id in conns.iter() {
                    targets.insert(conn_id.key().clone());
                }
            }
        }
        debug!(
            "fan-out to chat {}: {} connections",
            chat_id,
            targets.len()
        );
        for conn_id in &targets {
            self.send_raw(conn_id, &payload);
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn typing_event() -> ServerEvent {
        ServerEvent::Typing {
            chat_id: "chat1".to_string(),
            user_id: "user1".to_string(),
            is_typing: true,
        }
    }

    #[tokio::test]
    async fn test_publish_to_user_reaches_all_connections() {
        let hub = Hub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        hub.register("conn1".to_string(), tx1);
        hub.register("conn2".to_string(), tx2);
        hub.bind_user("user1", "conn1");
        hub.bind_user("user1", "conn2");

        hub.publish_to_user("user1", &typing_event());

        let payload = rx1.recv().await.unwrap();
        assert!(payload.contains("\"type\":\"typing\""));
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_chat_fanout_deduplicates_connections() {
        let hub = Hub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // One connection that is both in the room and bound to a participant.
        hub.register("conn1".to_string(), tx);
        hub.bind_user("user1", "conn1");
        hub.join_room("chat1", "conn1");

        hub.publish_to_chat("chat1", &["user1".to_string()], &typing_event());

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err(), "event delivered twice");
    }

    #[tokio::test]
    async fn test_chat_fanout_reaches_offline_room_and_online_users() {
        let hub = Hub::new();
        let (tx_room, mut rx_room) = mpsc::unbounded_channel();
        let (tx_user, mut rx_user) = mpsc::unbounded_channel();

        // conn_room joined the room without being a participant; conn_user is
        // a participant who never joined the room.
        hub.register("conn_room".to_string(), tx_room);
        hub.register("conn_user".to_string(), tx_user);
        hub.join_room("chat1", "conn_room");
        hub.bind_user("user2", "conn_user");

        hub.publish_to_chat("chat1", &["user2".to_string()], &typing_event());

        assert!(rx_room.recv().await.is_some());
        assert!(rx_user.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_room_relay_excludes_one_connection() {
        let hub = Hub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        hub.register("conn1".to_string(), tx1);
        hub.register("conn2".to_string(), tx2);
        hub.join_room("chat1", "conn1");
        hub.join_room("chat1", "conn2");

        hub.publish_to_room_except("chat1", "conn1", &typing_event());

        assert!(rx2.recv().await.is_some());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_removes_everywhere() {
        let hub = Hub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        hub.register("conn1".to_string(), tx);
        hub.bind_user("user1", "conn1");
        hub.join_room("chat1", "conn1");
        assert!(hub.is_online("user1"));

        hub.disconnect("conn1");

        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.is_online("user1"));
        hub.publish_to_chat("chat1", &["user1".to_string()], &typing_event());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_dead_connection_is_ignored() {
        let hub = Hub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        hub.register("conn1".to_string(), tx);
        hub.bind_user("user1", "conn1");

        // Receiver is gone; publish must not panic.
        hub.publish_to_user("user1", &typing_event());
    }
}

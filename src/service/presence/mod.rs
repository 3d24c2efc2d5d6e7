// =============================================================================
// FitPulse Social Fitness Backend - Presence Store
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Process-local registry of authenticated connections and their room
//   membership. Presence is scoped to one server instance; cross-instance
//   visibility is achieved by mirroring join/leave events over the bus.
//
// =============================================================================

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Connection {
    user_id: i64,
    rooms: HashSet<String>,
}

/// What a disconnect left behind: the rooms are reported before the
/// connection is removed from the index so callers can broadcast the
/// synthesized leaves.
#[derive(Debug, Clone)]
pub struct Departure {
    pub user_id: i64,
    pub rooms: Vec<String>,
    pub went_offline: bool,
}

#[derive(Debug, Default)]
pub struct Service {
    connections: RwLock<HashMap<Uuid, Connection>>,
    by_user: RwLock<HashMap<i64, HashSet<Uuid>>>,
}

impl Service {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection.
    pub async fn on_connect(&self, connection_id: Uuid, user_id: i64) {
        self.connections.write().await.insert(
            connection_id,
            Connection {
                user_id,
                rooms: HashSet::new(),
            },
        );
        self.by_user
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(connection_id);
    }

    /// Idempotent set add. Returns false for unknown connections or repeat
    /// joins.
    pub async fn join_room(&self, connection_id: Uuid, room: &str) -> bool {
        match self.connections.write().await.get_mut(&connection_id) {
            Some(conn) => conn.rooms.insert(room.to_owned()),
            None => false,
        }
    }

    /// Idempotent set remove.
    pub async fn leave_room(&self, connection_id: Uuid, room: &str) -> bool {
        match self.connections.write().await.get_mut(&connection_id) {
            Some(conn) => conn.rooms.remove(room),
            None => false,
        }
    }

    /// Remove a connection, synthesizing a leave for every room it had
    /// joined. The user goes offline when this was their last connection.
    pub async fn on_disconnect(&self, connection_id: Uuid) -> Option<Departure> {
        let conn = self.connections.write().await.remove(&connection_id)?;
        let mut by_user = self.by_user.write().await;
        let went_offline = match by_user.get_mut(&conn.user_id) {
            Some(set) => {
                set.remove(&connection_id);
                if set.is_empty() {
                    by_user.remove(&conn.user_id);
                    true
                } else {
                    false
                }
            }
            None => true,
        };
        let mut rooms: Vec<String> = conn.rooms.into_iter().collect();
        rooms.sort();
        Some(Departure {
            user_id: conn.user_id,
            rooms,
            went_offline,
        })
    }

    /// A user is online iff at least one authenticated connection exists.
    pub async fn is_online(&self, user_id: i64) -> bool {
        self.by_user.read().await.contains_key(&user_id)
    }

    /// Distinct user ids with at least one connection joined to `room`.
    pub async fn online_users_in(&self, room: &str) -> Vec<i64> {
        let connections = self.connections.read().await;
        let mut users: Vec<i64> = connections
            .values()
            .filter(|c| c.rooms.contains(room))
            .map(|c| c.user_id)
            .collect();
        users.sort_unstable();
        users.dedup();
        users
    }

    pub async fn rooms_of(&self, connection_id: Uuid) -> HashSet<String> {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .map(|c| c.rooms.clone())
            .unwrap_or_default()
    }

    pub async fn is_joined(&self, connection_id: Uuid, room: &str) -> bool {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .map(|c| c.rooms.contains(room))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_join_and_query() {
        let presence = Service::new();
        let conn = Uuid::new_v4();
        presence.on_connect(conn, 7).await;
        assert!(presence.is_online(7).await);

        assert!(presence.join_room(conn, "room:1").await);
        // second join is an idempotent no-op
        assert!(!presence.join_room(conn, "room:1").await);
        assert_eq!(presence.online_users_in("room:1").await, vec![7]);
    }

    #[tokio::test]
    async fn test_disconnect_synthesizes_leaves() {
        let presence = Service::new();
        let conn = Uuid::new_v4();
        presence.on_connect(conn, 3).await;
        presence.join_room(conn, "room:1").await;
        presence.join_room(conn, "room:2").await;

        let departure = presence.on_disconnect(conn).await.expect("was connected");
        assert_eq!(departure.user_id, 3);
        assert_eq!(departure.rooms, vec!["room:1", "room:2"]);
        assert!(departure.went_offline);
        assert!(!presence.is_online(3).await);
        assert!(presence.online_users_in("room:1").await.is_empty());
    }

    #[tokio::test]
    async fn test_user_stays_online_with_second_connection() {
        let presence = Service::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        presence.on_connect(a, 9).await;
        presence.on_connect(b, 9).await;

        let departure = presence.on_disconnect(a).await.expect("was connected");
        assert!(!departure.went_offline);
        assert!(presence.is_online(9).await);
    }

    #[tokio::test]
    async fn test_duplicate_connections_report_one_online_user() {
        let presence = Service::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        presence.on_connect(a, 5).await;
        presence.on_connect(b, 5).await;
        presence.join_room(a, "room:8").await;
        presence.join_room(b, "room:8").await;
        assert_eq!(presence.online_users_in("room:8").await, vec![5]);
    }

    #[tokio::test]
    async fn test_disconnect_unknown_connection_is_none() {
        let presence = Service::new();
        assert!(presence.on_disconnect(Uuid::new_v4()).await.is_none());
    }
}

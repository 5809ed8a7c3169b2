//! Room membership index.
//!
//! Rooms are subscription topics: one per owning tenant (auto-joined, not
//! client-leavable) and one per monitored video stream (joined and left by
//! client request). Both directions of the membership relation live behind a
//! single lock so a reader can never observe them inconsistent.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Typed room identifier. Wire form is `tenant:<id>` or `stream:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Tenant(String),
    Stream(String),
}

impl RoomKey {
    pub fn tenant(id: impl Into<String>) -> Self {
        Self::Tenant(id.into())
    }

    pub fn stream(id: impl Into<String>) -> Self {
        Self::Stream(id.into())
    }

    pub fn is_tenant(&self) -> bool {
        matches!(self, Self::Tenant(_))
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant(id) => write!(f, "tenant:{}", id),
            Self::Stream(id) => write!(f, "stream:{}", id),
        }
    }
}

#[derive(Error, Debug)]
#[error("Unrecognized room key: {0}")]
pub struct InvalidRoomKey(String);

impl FromStr for RoomKey {
    type Err = InvalidRoomKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("tenant", id)) if !id.is_empty() => Ok(Self::Tenant(id.to_string())),
            Some(("stream", id)) if !id.is_empty() => Ok(Self::Stream(id.to_string())),
            _ => Err(InvalidRoomKey(s.to_string())),
        }
    }
}

impl Serialize for RoomKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[derive(Default)]
struct RoomMaps {
    /// room -> member connection ids
    rooms: HashMap<RoomKey, HashSet<Uuid>>,
    /// connection id -> subscribed rooms
    joined: HashMap<Uuid, HashSet<RoomKey>>,
}

/// Bidirectional membership structure: room -> members and connection ->
/// rooms, mutated together under one lock. Rooms exist only while they have
/// members.
pub struct RoomIndex {
    inner: RwLock<RoomMaps>,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RoomMaps::default()),
        }
    }

    /// Add a connection to a room. Returns false if it was already a member.
    pub async fn join(&self, connection_id: Uuid, room: RoomKey) -> bool {
        let mut maps = self.inner.write().await;
        let newly_joined = maps.rooms.entry(room.clone()).or_default().insert(connection_id);
        if newly_joined {
            maps.joined.entry(connection_id).or_default().insert(room.clone());
            tracing::debug!(connection_id = %connection_id, room = %room, "Joined room");
        }
        newly_joined
    }

    /// Remove a connection from a room. No-op for non-members. The room
    /// entry is dropped when its membership becomes empty.
    pub async fn leave(&self, connection_id: Uuid, room: &RoomKey) -> bool {
        let mut maps = self.inner.write().await;
        let was_member = match maps.rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(&connection_id);
                if members.is_empty() {
                    maps.rooms.remove(room);
                }
                removed
            }
            None => false,
        };

        if was_member {
            if let Some(subscribed) = maps.joined.get_mut(&connection_id) {
                subscribed.remove(room);
                if subscribed.is_empty() {
                    maps.joined.remove(&connection_id);
                }
            }
            tracing::debug!(connection_id = %connection_id, room = %room, "Left room");
        }
        was_member
    }

    /// Remove a connection from every room it belongs to, dropping rooms
    /// that become empty. Used on disconnect. Returns the rooms left.
    pub async fn leave_all(&self, connection_id: Uuid) -> Vec<RoomKey> {
        let mut maps = self.inner.write().await;
        let Some(subscribed) = maps.joined.remove(&connection_id) else {
            return Vec::new();
        };

        let mut left = Vec::with_capacity(subscribed.len());
        for room in subscribed {
            if let Some(members) = maps.rooms.get_mut(&room) {
                members.remove(&connection_id);
                if members.is_empty() {
                    maps.rooms.remove(&room);
                }
            }
            left.push(room);
        }

        tracing::debug!(connection_id = %connection_id, rooms = left.len(), "Left all rooms");
        left
    }

    /// Snapshot of a room's current members.
    pub async fn members(&self, room: &RoomKey) -> Vec<Uuid> {
        let maps = self.inner.read().await;
        maps.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the rooms a connection is subscribed to.
    pub async fn rooms_of(&self, connection_id: Uuid) -> Vec<RoomKey> {
        let maps = self.inner.read().await;
        maps.joined
            .get(&connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_member(&self, connection_id: Uuid, room: &RoomKey) -> bool {
        let maps = self.inner.read().await;
        maps.rooms
            .get(room)
            .is_some_and(|members| members.contains(&connection_id))
    }

    pub async fn subscriber_count(&self, room: &RoomKey) -> usize {
        let maps = self.inner.read().await;
        maps.rooms.get(room).map(HashSet::len).unwrap_or(0)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    /// Per-room member counts, keyed by the room's wire form.
    pub async fn stats(&self) -> HashMap<String, usize> {
        let maps = self.inner.read().await;
        maps.rooms
            .iter()
            .map(|(room, members)| (room.to_string(), members.len()))
            .collect()
    }
}

impl Default for RoomIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Both membership directions must always agree.
    async fn assert_consistent(index: &RoomIndex) {
        let maps = index.inner.read().await;
        for (room, members) in &maps.rooms {
            assert!(!members.is_empty(), "room {} kept with no members", room);
            for conn in members {
                assert!(
                    maps.joined.get(conn).is_some_and(|r| r.contains(room)),
                    "room {} lists {} but reverse index does not",
                    room,
                    conn
                );
            }
        }
        for (conn, rooms) in &maps.joined {
            assert!(!rooms.is_empty(), "connection {} kept with no rooms", conn);
            for room in rooms {
                assert!(
                    maps.rooms.get(room).is_some_and(|m| m.contains(conn)),
                    "{} claims {} but room does not list it",
                    conn,
                    room
                );
            }
        }
    }

    #[test]
    fn test_room_key_wire_form() {
        assert_eq!(RoomKey::tenant("farm-1").to_string(), "tenant:farm-1");
        assert_eq!(RoomKey::stream("cam-3").to_string(), "stream:cam-3");

        assert_eq!("tenant:farm-1".parse::<RoomKey>().unwrap(), RoomKey::tenant("farm-1"));
        assert_eq!("stream:cam-3".parse::<RoomKey>().unwrap(), RoomKey::stream("cam-3"));

        assert!("tenant:".parse::<RoomKey>().is_err());
        assert!("lobby:x".parse::<RoomKey>().is_err());
        assert!("no-prefix".parse::<RoomKey>().is_err());
    }

    #[test]
    fn test_room_key_serde_roundtrip() {
        let key = RoomKey::stream("cam-3");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"stream:cam-3\"");
        assert_eq!(serde_json::from_str::<RoomKey>(&json).unwrap(), key);
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let index = RoomIndex::new();
        let conn = Uuid::new_v4();
        let room = RoomKey::stream("cam-1");

        assert!(index.join(conn, room.clone()).await);
        assert!(!index.join(conn, room.clone()).await);

        assert_eq!(index.members(&room).await.len(), 1);
        assert_consistent(&index).await;
    }

    #[tokio::test]
    async fn test_leave_non_member_is_noop() {
        let index = RoomIndex::new();
        let conn = Uuid::new_v4();
        let room = RoomKey::stream("cam-1");

        assert!(!index.leave(conn, &room).await);
        assert_eq!(index.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_room_is_dropped() {
        let index = RoomIndex::new();
        let conn = Uuid::new_v4();
        let room = RoomKey::stream("cam-1");

        index.join(conn, room.clone()).await;
        assert_eq!(index.room_count().await, 1);

        index.leave(conn, &room).await;
        assert_eq!(index.room_count().await, 0);
        assert!(index.rooms_of(conn).await.is_empty());
        assert_consistent(&index).await;
    }

    #[tokio::test]
    async fn test_leave_all_cleans_every_room() {
        let index = RoomIndex::new();
        let conn = Uuid::new_v4();
        let other = Uuid::new_v4();

        index.join(conn, RoomKey::tenant("farm-1")).await;
        index.join(conn, RoomKey::stream("cam-1")).await;
        index.join(conn, RoomKey::stream("cam-2")).await;
        index.join(other, RoomKey::stream("cam-2")).await;

        let left = index.leave_all(conn).await;
        assert_eq!(left.len(), 3);

        // cam-2 survives with the other member, the rest are gone
        assert_eq!(index.room_count().await, 1);
        assert_eq!(index.members(&RoomKey::stream("cam-2")).await, vec![other]);
        assert!(index.rooms_of(conn).await.is_empty());
        assert_consistent(&index).await;

        // second leave_all is a no-op
        assert!(index.leave_all(conn).await.is_empty());
    }

    #[tokio::test]
    async fn test_consistency_after_interleaved_operations() {
        let index = RoomIndex::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        index.join(a, RoomKey::tenant("farm-1")).await;
        index.join(b, RoomKey::tenant("farm-1")).await;
        index.join(c, RoomKey::tenant("farm-2")).await;
        index.join(a, RoomKey::stream("cam-1")).await;
        index.join(b, RoomKey::stream("cam-1")).await;
        index.leave(a, &RoomKey::stream("cam-1")).await;
        index.join(a, RoomKey::stream("cam-1")).await;
        index.leave_all(b).await;
        index.join(c, RoomKey::stream("cam-1")).await;

        assert_consistent(&index).await;
        assert_eq!(index.subscriber_count(&RoomKey::stream("cam-1")).await, 2);
        assert_eq!(index.subscriber_count(&RoomKey::tenant("farm-1")).await, 1);
    }
}

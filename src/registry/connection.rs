use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::websocket::{OutboundMessage, ServerMessage};

use super::RoomKey;

/// Connection lifecycle. A connection that fails authentication never
/// materializes as a handle, so tracked phases begin at `Authenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[repr(u8)]
pub enum Phase {
    /// Registered, initial acknowledgment not yet sent
    Authenticated = 0,
    /// Processing client control messages
    Active = 1,
    /// Close requested; cleanup pending
    Closing = 2,
    /// Cleanup done (terminal)
    Closed = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Authenticated,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Handle for a single WebSocket connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: String,
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last inbound activity (Unix seconds), lock-free
    last_activity: AtomicI64,
    phase: AtomicU8,
    close: Notify,
}

impl ConnectionHandle {
    pub fn new(user_id: String, tenant_id: String, sender: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            tenant_id,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            phase: AtomicU8::new(Phase::Authenticated as u8),
            close: Notify::new(),
        }
    }

    /// The tenant room every connection of this tenant auto-joins.
    pub fn tenant_room(&self) -> RoomKey {
        RoomKey::tenant(self.tenant_id.clone())
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    #[cfg(test)]
    pub fn force_last_activity(&self, timestamp: i64) {
        self.last_activity.store(timestamp, Ordering::Relaxed);
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.phase() < Phase::Closing
    }

    /// Initial acknowledgment sent, connection is live.
    pub fn mark_active(&self) {
        let _ = self.phase.compare_exchange(
            Phase::Authenticated as u8,
            Phase::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Request this connection be closed. Idempotent: returns true only for
    /// the call that performed the transition. Wakes the socket task, which
    /// owns the actual cleanup.
    pub fn begin_close(&self) -> bool {
        let mut current = self.phase.load(Ordering::Acquire);
        loop {
            if current >= Phase::Closing as u8 {
                return false;
            }
            match self.phase.compare_exchange(
                current,
                Phase::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.close.notify_one();
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn mark_closed(&self) {
        self.phase.store(Phase::Closed as u8, Ordering::Release);
    }

    /// Resolves once a close has been requested for this connection.
    pub async fn closed(&self) {
        if !self.is_open() {
            return;
        }
        self.close.notified().await;
    }

    /// Send with backpressure; used by the connection's own control path.
    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(OutboundMessage::Raw(message)).await
    }

    /// Non-blocking send for fan-out paths. A full buffer means the peer is
    /// not draining; callers treat failure as a disconnect signal.
    pub fn try_send(
        &self,
        message: OutboundMessage,
    ) -> Result<(), mpsc::error::TrySendError<OutboundMessage>> {
        self.sender.try_send(message)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub sessions: usize,
}

/// Owns the canonical set of live connections and the per-user session
/// grouping (one user may hold several simultaneous connections).
pub struct ConnectionRegistry {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// user_id -> Set<connection_id>
    sessions: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Register a new authenticated connection. Creates the user's session
    /// on their first connection.
    pub fn register(
        &self,
        user_id: String,
        tenant_id: String,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(user_id.clone(), tenant_id, sender));
        let conn_id = handle.id;

        self.connections.insert(conn_id, handle.clone());
        self.sessions.entry(user_id).or_default().insert(conn_id);

        tracing::info!(
            connection_id = %conn_id,
            user_id = %handle.user_id,
            tenant_id = %handle.tenant_id,
            "Connection registered"
        );

        handle
    }

    /// Remove a connection. Idempotent: a second call for the same id is a
    /// no-op. Deletes the user's session when its last connection goes.
    pub fn unregister(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.connections.remove(&connection_id)?;

        if let Some(mut user_conns) = self.sessions.get_mut(&handle.user_id) {
            user_conns.remove(&connection_id);
            if user_conns.is_empty() {
                drop(user_conns);
                self.sessions.remove(&handle.user_id);
            }
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = %handle.user_id,
            "Connection unregistered"
        );

        Some(handle)
    }

    pub fn get(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// All connections in one user's session.
    pub fn connections_for_user(&self, user_id: &str) -> Vec<Arc<ConnectionHandle>> {
        self.sessions
            .get(user_id)
            .map(|conn_ids| {
                conn_ids
                    .iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_connections: self.connections.len(),
            sessions: self.sessions.len(),
        }
    }

    /// Connections with no inbound activity for longer than the timeout.
    pub fn find_stale(&self, timeout_secs: u64) -> Vec<Uuid> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| *entry.key())
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

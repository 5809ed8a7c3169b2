//! Graceful shutdown handling.
//!
//! Coordinated teardown:
//! 1. Notify every connected client about the impending shutdown
//! 2. Signal background tasks to stop
//! 3. Request close on every connection and wait a bounded grace period
//!    for socket tasks to run their own cleanup
//! 4. Force-clean any connection that did not close voluntarily, leaving
//!    the registry, room index, and session maps empty

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::ShutdownConfig;
use crate::registry::{ConnectionRegistry, RoomIndex};
use crate::websocket::{OutboundMessage, ServerMessage};

pub struct ShutdownCoordinator {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomIndex>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

/// Result of a graceful shutdown run
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Clients that received the shutdown notice
    pub clients_notified: usize,
    /// Connections that closed on their own within the grace period
    pub closed_gracefully: usize,
    /// Connections torn down forcibly after the grace period
    pub forced: usize,
    pub duration: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomIndex>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            registry,
            rooms,
            shutdown_tx,
            config,
        }
    }

    /// Execute the shutdown sequence.
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.registry.connection_count())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownReport {
        let start = std::time::Instant::now();
        let initial = self.registry.connection_count();
        let mut report = ShutdownReport::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - notifying clients");
        report.clients_notified = self.notify_clients(reason);

        tracing::info!("Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Requesting close on all connections");
        for handle in self.registry.all() {
            handle.begin_close();
        }

        self.wait_for_connections_to_close().await;
        let remaining = self.registry.connection_count();
        report.closed_gracefully = initial.saturating_sub(remaining);

        // Stragglers: socket task never observed the close request (hung
        // transport, test harness without socket tasks). Tear them down
        // directly; cleanup is idempotent against a late socket task.
        for handle in self.registry.all() {
            self.rooms.leave_all(handle.id).await;
            self.registry.unregister(handle.id);
            handle.mark_closed();
            report.forced += 1;
        }

        report.duration = start.elapsed();

        tracing::info!(
            clients_notified = report.clients_notified,
            closed_gracefully = report.closed_gracefully,
            forced = report.forced,
            duration_ms = report.duration.as_millis(),
            "Graceful shutdown completed"
        );

        report
    }

    /// Push the shutdown notice to every connection's outbound buffer.
    /// A member that cannot take the notice is about to be torn down anyway.
    fn notify_clients(&self, reason: &str) -> usize {
        let connections = self.registry.all();
        if connections.is_empty() {
            return 0;
        }

        let message = ServerMessage::shutdown(reason, self.config.reconnect_after);
        let mut notified = 0;

        for conn in &connections {
            match conn.try_send(OutboundMessage::Raw(message.clone())) {
                Ok(()) => notified += 1,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn.id,
                        error = %e,
                        "Failed to queue shutdown notification"
                    );
                }
            }
        }

        tracing::info!(
            notified = notified,
            total = connections.len(),
            "Shutdown notifications sent"
        );

        notified
    }

    /// Wait for socket tasks to finish their own cleanup, bounded by the
    /// configured grace period.
    async fn wait_for_connections_to_close(&self) {
        if self.registry.connection_count() == 0 {
            return;
        }

        let registry = self.registry.clone();
        let wait_future = async move {
            loop {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if registry.connection_count() == 0 {
                    break;
                }
            }
        };

        let grace = Duration::from_secs(self.config.grace_period);
        if timeout(grace, wait_future).await.is_err() {
            tracing::warn!(
                remaining_connections = self.registry.connection_count(),
                grace_period_secs = self.config.grace_period,
                "Some connections did not close within the grace period"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn create_coordinator() -> (Arc<ConnectionRegistry>, Arc<RoomIndex>, ShutdownCoordinator) {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomIndex::new());
        let (tx, _) = broadcast::channel(1);
        let config = ShutdownConfig {
            grace_period: 0,
            reconnect_after: 5,
        };
        let coordinator =
            ShutdownCoordinator::new(registry.clone(), rooms.clone(), tx, config);
        (registry, rooms, coordinator)
    }

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let (_registry, _rooms, coordinator) = create_coordinator();

        let report = coordinator.execute("test shutdown").await;

        assert_eq!(report.clients_notified, 0);
        assert_eq!(report.forced, 0);
    }

    #[tokio::test]
    async fn test_shutdown_signals_background_tasks() {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomIndex::new());
        let (tx, mut rx) = broadcast::channel(1);
        let config = ShutdownConfig {
            grace_period: 0,
            reconnect_after: 5,
        };
        let coordinator = ShutdownCoordinator::new(registry, rooms, tx, config);

        coordinator.execute("test").await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_drains_all_maps() {
        let (registry, rooms, coordinator) = create_coordinator();

        let (tx, mut rx) = mpsc::channel(8);
        let handle = registry.register("alice".into(), "farm-1".into(), tx);
        rooms.join(handle.id, handle.tenant_room()).await;

        let report = coordinator.execute("maintenance").await;

        assert_eq!(report.clients_notified, 1);
        assert_eq!(report.forced, 1);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.session_count(), 0);
        assert_eq!(rooms.room_count().await, 0);

        // Client got the shutdown notice first
        let msg = rx.try_recv().unwrap();
        let text = msg.to_json().unwrap();
        assert!(text.contains("\"shutdown\""));
        assert!(text.contains("maintenance"));
    }
}

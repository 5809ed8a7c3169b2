use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::MetricsConfig;
use crate::metrics;
use crate::registry::{ConnectionRegistry, RoomIndex};

/// Periodic observability census: snapshots registry and room sizes into
/// Prometheus gauges. Read-only; runs until shutdown.
pub struct MetricsReporter {
    config: MetricsConfig,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomIndex>,
    shutdown: broadcast::Receiver<()>,
}

impl MetricsReporter {
    pub fn new(
        config: MetricsConfig,
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomIndex>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            rooms,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(Duration::from_secs(self.config.report_interval));

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            report_interval_secs = self.config.report_interval,
            "Metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Metrics reporter received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.report().await;
                }
            }
        }

        tracing::info!("Metrics reporter stopped");
    }

    async fn report(&self) {
        let registry_stats = self.registry.stats();
        let rooms = self.rooms.stats().await;

        metrics::CONNECTIONS_TOTAL.set(registry_stats.total_connections as i64);
        metrics::SESSIONS_CONNECTED.set(registry_stats.sessions as i64);
        metrics::ROOMS_ACTIVE.set(rooms.len() as i64);

        metrics::ROOM_MEMBERS.reset();
        for (room, count) in &rooms {
            metrics::ROOM_MEMBERS
                .with_label_values(&[room])
                .set(*count as i64);
        }

        tracing::debug!(
            connections = registry_stats.total_connections,
            sessions = registry_stats.sessions,
            rooms = rooms.len(),
            "Census reported"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_reporter_shutdown() {
        let config = MetricsConfig { report_interval: 1 };
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomIndex::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let reporter = MetricsReporter::new(config, registry, rooms, shutdown_rx);
        let handle = tokio::spawn(async move {
            reporter.run().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_report_sets_gauges() {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomIndex::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, _rx) = mpsc::channel(8);
        let handle = registry.register("alice".into(), "farm-1".into(), tx);
        rooms.join(handle.id, handle.tenant_room()).await;

        let reporter = MetricsReporter::new(
            MetricsConfig { report_interval: 60 },
            registry,
            rooms,
            shutdown_rx,
        );
        reporter.report().await;

        assert_eq!(metrics::CONNECTIONS_TOTAL.get(), 1);
        assert_eq!(metrics::SESSIONS_CONNECTED.get(), 1);
        assert_eq!(metrics::ROOMS_ACTIVE.get(), 1);
    }
}

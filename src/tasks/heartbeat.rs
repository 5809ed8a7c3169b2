use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::registry::ConnectionRegistry;
use crate::websocket::{OutboundMessage, ServerMessage};

/// Background task for heartbeat and idle-connection cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    registry: Arc<ConnectionRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<ConnectionRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup timers until shutdown
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval);
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval);
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats();
                }
                _ = cleanup_timer.tick() => {
                    self.close_idle_connections(connection_timeout);
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a heartbeat frame on every connection. A connection that cannot
    /// take a single frame is not draining its buffer and is scheduled for
    /// disconnect, same policy as event fan-out.
    fn send_heartbeats(&self) {
        let connections = self.registry.all();
        if connections.is_empty() {
            return;
        }

        let mut sent = 0;
        let mut failed = 0;

        for handle in &connections {
            match handle.try_send(OutboundMessage::Raw(ServerMessage::Heartbeat)) {
                Ok(()) => sent += 1,
                Err(_) => {
                    failed += 1;
                    tracing::debug!(
                        connection_id = %handle.id,
                        "Failed to queue heartbeat, scheduling disconnect"
                    );
                    handle.begin_close();
                }
            }
        }

        tracing::debug!(
            total = connections.len(),
            sent = sent,
            failed = failed,
            "Heartbeat round completed"
        );
    }

    /// Request close for connections idle past the timeout. The socket task
    /// owns the actual cleanup.
    fn close_idle_connections(&self, timeout_secs: u64) {
        let stale = self.registry.find_stale(timeout_secs);
        let count = stale.len();

        for conn_id in stale {
            if let Some(handle) = self.registry.get(conn_id) {
                tracing::info!(
                    connection_id = %conn_id,
                    timeout_secs = timeout_secs,
                    "Closing idle connection"
                );
                handle.begin_close();
            }
        }

        if count > 0 {
            tracing::info!(closed = count, "Idle connection sweep completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let config = WebSocketConfig::default();
        let registry = Arc::new(ConnectionRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(config, registry, shutdown_rx);

        let handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_sends_to_connections() {
        let config = WebSocketConfig {
            heartbeat_interval: 1,
            connection_timeout: 60,
            cleanup_interval: 60,
            send_buffer: 8,
        };
        let registry = Arc::new(ConnectionRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(8);
        let _handle = registry.register("alice".to_string(), "farm-1".to_string(), tx);

        let task = HeartbeatTask::new(config, registry, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive heartbeat")
            .expect("Channel should not be closed");

        assert!(matches!(msg, OutboundMessage::Raw(ServerMessage::Heartbeat)));

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[tokio::test]
    async fn test_idle_sweep_requests_close() {
        use crate::registry::Phase;
        use chrono::Utc;

        let registry = Arc::new(ConnectionRegistry::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (tx, _rx) = mpsc::channel(8);
        let handle = registry.register("alice".to_string(), "farm-1".to_string(), tx);

        let task = HeartbeatTask::new(WebSocketConfig::default(), registry.clone(), shutdown_rx);

        // Fresh connection is left alone
        task.close_idle_connections(60);
        assert_eq!(handle.phase(), Phase::Authenticated);

        // Backdated connection gets a close request
        handle.force_last_activity(Utc::now().timestamp() - 120);
        task.close_idle_connections(60);
        assert_eq!(handle.phase(), Phase::Closing);
    }
}

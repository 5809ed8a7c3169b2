//! Prometheus metrics for the event broadcasting service:
//! - Connection metrics (active connections, sessions, rooms)
//! - Event metrics (emitted, delivered, failed)
//! - WebSocket control-message counters

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "vigil";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Total number of active WebSocket connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Total number of active WebSocket connections"
    ).unwrap();

    /// Number of distinct user sessions
    pub static ref SESSIONS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_sessions_connected", METRIC_PREFIX),
        "Number of distinct user sessions"
    ).unwrap();

    /// Rooms with at least one member
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Total number of rooms with at least one member"
    ).unwrap();

    /// Members per room
    pub static ref ROOM_MEMBERS: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_room_members", METRIC_PREFIX),
        "Number of member connections per room",
        &["room"]
    ).unwrap();

    /// Connections opened since start
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "WebSocket connections opened since start"
    ).unwrap();

    /// Connections closed since start
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "WebSocket connections closed since start"
    ).unwrap();

    // ============================================================================
    // Event Metrics
    // ============================================================================

    /// Events emitted, by kind
    pub static ref EVENTS_EMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_emitted_total", METRIC_PREFIX),
        "Events emitted to rooms",
        &["event"]
    ).unwrap();

    /// Envelopes handed to member connections
    pub static ref EVENTS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_delivered_total", METRIC_PREFIX),
        "Envelopes successfully handed to member connections"
    ).unwrap();

    /// Per-member delivery failures
    pub static ref EVENTS_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_failed_total", METRIC_PREFIX),
        "Per-member delivery failures"
    ).unwrap();

    // ============================================================================
    // WebSocket Control Messages
    // ============================================================================

    /// Client control frames, by type
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Client control frames received",
        &["type"]
    ).unwrap();
}

/// Helpers for event routing metrics
pub struct EventMetrics;

impl EventMetrics {
    pub fn record_emitted(event: &str) {
        EVENTS_EMITTED_TOTAL.with_label_values(&[event]).inc();
    }

    pub fn record_delivered(count: u64) {
        if count > 0 {
            EVENTS_DELIVERED_TOTAL.inc_by(count);
        }
    }

    pub fn record_failed(count: u64) {
        if count > 0 {
            EVENTS_FAILED_TOTAL.inc_by(count);
        }
    }
}

/// Helpers for client control-frame metrics
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_subscribe() {
        WS_MESSAGES_RECEIVED.with_label_values(&["subscribe"]).inc();
    }

    pub fn record_unsubscribe() {
        WS_MESSAGES_RECEIVED.with_label_values(&["unsubscribe"]).inc();
    }

    pub fn record_ping() {
        WS_MESSAGES_RECEIVED.with_label_values(&["ping"]).inc();
    }
}

/// Encode all registered metrics in Prometheus text format
pub fn encode_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

//! Event kinds delivered over the broadcast layer.
//!
//! The union is closed: every kind carries a fixed payload shape, so a frame
//! that deserializes is already schema-valid. Producers (webhook handlers,
//! the processing pipeline) hand the router a variant, never a raw JSON bag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-originated event, tagged with its wire name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum StreamEvent {
    #[serde(rename = "detection:update")]
    DetectionUpdate(DetectionUpdate),
    #[serde(rename = "chunk:processed")]
    ChunkProcessed(ChunkProcessed),
    #[serde(rename = "stream:status")]
    StreamStatusChange(StreamStatusChange),
    #[serde(rename = "tenant:metrics")]
    TenantMetrics(TenantMetrics),
    #[serde(rename = "scan:started")]
    ScanStarted(ScanStarted),
    #[serde(rename = "scan:position")]
    ScanPosition(ScanPosition),
    #[serde(rename = "scan:detection")]
    ScanDetection(ScanDetection),
    #[serde(rename = "scan:phase")]
    ScanPhaseChange(ScanPhaseChange),
    #[serde(rename = "scan:recording")]
    ScanRecording(ScanRecording),
    #[serde(rename = "scan:complete")]
    ScanComplete(ScanComplete),
    #[serde(rename = "scan:stopped")]
    ScanStopped(ScanStopped),
    #[serde(rename = "scan:error")]
    ScanError(ScanError),
}

impl StreamEvent {
    /// Wire name of the event kind, for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DetectionUpdate(_) => "detection:update",
            Self::ChunkProcessed(_) => "chunk:processed",
            Self::StreamStatusChange(_) => "stream:status",
            Self::TenantMetrics(_) => "tenant:metrics",
            Self::ScanStarted(_) => "scan:started",
            Self::ScanPosition(_) => "scan:position",
            Self::ScanDetection(_) => "scan:detection",
            Self::ScanPhaseChange(_) => "scan:phase",
            Self::ScanRecording(_) => "scan:recording",
            Self::ScanComplete(_) => "scan:complete",
            Self::ScanStopped(_) => "scan:stopped",
            Self::ScanError(_) => "scan:error",
        }
    }
}

/// A single object detected in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Normalized frame coordinates (0.0..=1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionUpdate {
    pub stream_id: String,
    pub frame_at: DateTime<Utc>,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkProcessed {
    pub stream_id: String,
    pub chunk_id: Uuid,
    pub duration_ms: u64,
    pub detection_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Online,
    Offline,
    Degraded,
    Processing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatusChange {
    pub stream_id: String,
    pub status: StreamStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Tenant-scoped dashboard counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantMetrics {
    pub active_streams: usize,
    pub detections_last_hour: u64,
    pub alerts_open: u32,
}

/// Phase of a multi-phase camera scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Sweep,
    Inspect,
    Record,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStarted {
    pub scan_id: Uuid,
    pub stream_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPosition {
    pub scan_id: Uuid,
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDetection {
    pub scan_id: Uuid,
    pub detection: Detection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPhaseChange {
    pub scan_id: Uuid,
    pub phase: ScanPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecording {
    pub scan_id: Uuid,
    pub clip_id: Uuid,
    pub recording: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanComplete {
    pub scan_id: Uuid,
    pub detections_total: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStopped {
    pub scan_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanError {
    pub scan_id: Uuid,
    pub message: String,
}

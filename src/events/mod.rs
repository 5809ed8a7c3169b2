mod envelope;
mod router;
mod types;

pub use envelope::EventEnvelope;
pub use router::{DeliveryResult, EventRouter, RouterStatsSnapshot};
pub use types::{
    BoundingBox, ChunkProcessed, Detection, DetectionUpdate, ScanComplete, ScanDetection,
    ScanError, ScanPhase, ScanPhaseChange, ScanPosition, ScanRecording, ScanStarted, ScanStopped,
    StreamEvent, StreamStatus, StreamStatusChange, TenantMetrics,
};

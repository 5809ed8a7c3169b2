use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::RoomKey;

use super::StreamEvent;

/// Wire structure wrapping one event for delivery to room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Room the event was emitted to
    pub room: RoomKey,
    /// Timestamp taken at emission time
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl EventEnvelope {
    pub fn new(room: RoomKey, event: StreamEvent) -> Self {
        Self {
            room,
            emitted_at: Utc::now(),
            event,
        }
    }
}

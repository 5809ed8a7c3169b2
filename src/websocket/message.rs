use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::EventEnvelope;
use crate::registry::RoomKey;

/// Control messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { stream_id: String },
    Unsubscribe { stream_id: String },
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Handshake acknowledgment: connection accepted and auto-joined to the
    /// tenant room
    #[serde(rename = "connected")]
    Connected {
        connection_id: Uuid,
        tenant_room: RoomKey,
    },
    #[serde(rename = "subscribed")]
    Subscribed { stream_id: String },
    #[serde(rename = "unsubscribed")]
    Unsubscribed { stream_id: String },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "event")]
    Event {
        #[serde(flatten)]
        envelope: EventEnvelope,
    },
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "shutdown")]
    Shutdown {
        reason: String,
        reconnect_after_seconds: u64,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn subscribed(stream_id: impl Into<String>) -> Self {
        Self::Subscribed {
            stream_id: stream_id.into(),
        }
    }

    pub fn unsubscribed(stream_id: impl Into<String>) -> Self {
        Self::Unsubscribed {
            stream_id: stream_id.into(),
        }
    }

    pub fn shutdown(reason: impl Into<String>, reconnect_after_seconds: u64) -> Self {
        Self::Shutdown {
            reason: reason.into(),
            reconnect_after_seconds,
        }
    }
}

/// Outbound message, optionally pre-serialized so wide fan-outs pay the
/// serialization cost once.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Raw(ServerMessage),
    Serialized(Arc<str>),
}

impl OutboundMessage {
    pub fn preserialized(message: &ServerMessage) -> serde_json::Result<Self> {
        Ok(Self::Serialized(serde_json::to_string(message)?.into()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Raw(message) => serde_json::to_string(message),
            Self::Serialized(text) => Ok(text.as_ref().to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{StreamEvent, TenantMetrics};

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","payload":{"stream_id":"cam-1"}}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { stream_id } if stream_id == "cam-1"));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_connected_ack_wire_format() {
        let msg = ServerMessage::Connected {
            connection_id: Uuid::nil(),
            tenant_room: RoomKey::tenant("farm-1"),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "connected");
        assert_eq!(value["tenant_room"], "tenant:farm-1");
    }

    #[test]
    fn test_event_frame_flattens_envelope() {
        let envelope = EventEnvelope::new(
            RoomKey::tenant("farm-1"),
            StreamEvent::TenantMetrics(TenantMetrics {
                active_streams: 2,
                detections_last_hour: 7,
                alerts_open: 0,
            }),
        );
        let value = serde_json::to_value(ServerMessage::Event { envelope }).unwrap();

        assert_eq!(value["type"], "event");
        assert_eq!(value["room"], "tenant:farm-1");
        assert_eq!(value["event"], "tenant:metrics");
        assert_eq!(value["payload"]["active_streams"], 2);
    }

    #[test]
    fn test_preserialized_matches_raw() {
        let msg = ServerMessage::subscribed("cam-9");
        let raw = OutboundMessage::Raw(msg.clone()).to_json().unwrap();
        let pre = OutboundMessage::preserialized(&msg).unwrap().to_json().unwrap();
        assert_eq!(raw, pre);
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::WireMessage;

/// Event name used in both directions on the live channel.
pub const MESSAGE_EVENT: &str = "message";

/// Khung JSON trao đổi trên WebSocket: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub event: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn message(data: T) -> Self {
        Self {
            event: MESSAGE_EVENT.to_string(),
            data,
        }
    }
}

/// Payload sent to the server when the user submits a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "chatRoomUUID")]
    pub chat_room_uuid: String,
    pub username: String,
    pub nickname: String,
    pub message: String,
    #[serde(rename = "clientId")]
    pub client_id: Uuid,
}

/// Decodes one text frame. Frames carrying another event name yield `Ok(None)`.
pub fn decode_inbound(text: &str) -> Result<Option<WireMessage>, serde_json::Error> {
    let envelope: Envelope<serde_json::Value> = serde_json::from_str(text)?;
    if envelope.event != MESSAGE_EVENT {
        return Ok(None);
    }
    serde_json::from_value(envelope.data).map(Some)
}

pub fn encode_outbound(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope::message(message))
}

use uuid::Uuid;

use crate::network::ChannelState;

use super::types::{ChatMessage, Room};

/// Sự kiện từ tầng mạng gửi lên UI.
///
/// Everything scoped to a room carries its uuid so the front-end can drop
/// results that arrive after it left that room.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    RoomsLoaded(Vec<Room>),
    RoomsFailed(String),
    HistoryLoaded {
        room_uuid: String,
        messages: Vec<ChatMessage>,
    },
    HistoryFailed {
        room_uuid: String,
        reason: String,
    },
    /// History re-fetched after a reconnect, to recover what was missed.
    GapFilled {
        room_uuid: String,
        messages: Vec<ChatMessage>,
    },
    MessageReceived {
        room_uuid: String,
        message: ChatMessage,
    },
    ChannelStateChanged {
        room_uuid: String,
        state: ChannelState,
    },
    /// The optimistic entry with this `client_id` was never sent.
    SendRejected {
        room_uuid: String,
        client_id: Uuid,
        reason: String,
    },
}

impl ChatEvent {
    pub fn room_uuid(&self) -> Option<&str> {
        match self {
            Self::RoomsLoaded(_) | Self::RoomsFailed(_) => None,
            Self::HistoryLoaded { room_uuid, .. }
            | Self::HistoryFailed { room_uuid, .. }
            | Self::GapFilled { room_uuid, .. }
            | Self::MessageReceived { room_uuid, .. }
            | Self::ChannelStateChanged { room_uuid, .. }
            | Self::SendRejected { room_uuid, .. } => Some(room_uuid),
        }
    }
}

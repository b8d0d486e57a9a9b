use super::types::Room;
use super::wire::OutboundMessage;

/// Lệnh UI gửi xuống tầng mạng.
#[derive(Debug, Clone)]
pub enum ChatCommand {
    RefreshRooms,
    /// Leaves the current room (if any) and starts history + live channel for `room`.
    EnterRoom(Room),
    LeaveRoom,
    /// Fire-and-forget send; the UI has already rendered the optimistic copy.
    SendMessage(OutboundMessage),
}

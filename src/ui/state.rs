use crate::common::{ChatEvent, OutboundMessage, Room, Session};
use crate::room::RoomView;

/// Trạng thái cục bộ của UI.
pub struct AppState {
    pub session: Session,
    pub rooms: Vec<Room>,
    pub rooms_error: Option<String>,
    pub room: Option<RoomView>,
    pub input_text: String,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            rooms: Vec::new(),
            rooms_error: None,
            room: None,
            input_text: String::new(),
        }
    }

    pub fn handle_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::RoomsLoaded(rooms) => {
                self.rooms = rooms;
                self.rooms_error = None;
            }
            ChatEvent::RoomsFailed(reason) => {
                self.rooms_error = Some(reason);
            }
            event => {
                let Some(room) = self.room.as_mut() else {
                    return;
                };
                room.apply(event);
                // Trả lại nội dung chưa gửi được cho ô nhập.
                if let Some(unsent) = room.take_unsent() {
                    if self.input_text.trim().is_empty() {
                        self.input_text = unsent;
                    } else {
                        self.input_text = format!("{unsent} {}", self.input_text);
                    }
                }
            }
        }
    }

    /// Opens a fresh view for `room`, closing the previous one.
    /// Returns `false` when `room` is already open.
    pub fn enter_room(&mut self, room: Room) -> bool {
        if self
            .room
            .as_ref()
            .is_some_and(|current| current.room().uuid == room.uuid)
        {
            return false;
        }
        self.leave_room();
        self.input_text.clear();
        self.room = Some(RoomView::new(room, self.session.clone()));
        true
    }

    /// Closes the open view. Returns `false` when no room was open.
    pub fn leave_room(&mut self) -> bool {
        let Some(mut room) = self.room.take() else {
            return false;
        };
        room.close();
        self.input_text.clear();
        true
    }

    /// Turns the input box into an outbound message, rendering it optimistically.
    /// The input is kept when the send is rejected so nothing typed is lost.
    pub fn take_input(&mut self) -> Option<OutboundMessage> {
        let room = self.room.as_mut()?;
        match room.compose(&self.input_text) {
            Ok(outbound) => {
                self.input_text.clear();
                outbound
            }
            Err(err) => {
                log::warn!("Cannot send in room {}: {err}", room.room().uuid);
                None
            }
        }
    }

    pub fn is_active(&self, room: &Room) -> bool {
        self.room
            .as_ref()
            .is_some_and(|current| current.room().uuid == room.uuid)
    }
}

use uuid::Uuid;

use crate::common::{ChatEvent, ChatMessage, OutboundMessage, Room, Session};
use crate::error::ChannelError;
use crate::network::ChannelState;

use super::reconciler::{MessageReconciler, Reconciled};

/// How far the initial history load has got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryStatus {
    Loading,
    Loaded,
    Failed(String),
}

/// View model of one open chat room.
///
/// Lives from room entry to room exit. After [`RoomView::close`] every input
/// is ignored, so results that were still in flight never show up.
#[derive(Debug)]
pub struct RoomView {
    room: Room,
    session: Session,
    reconciler: MessageReconciler,
    channel_state: ChannelState,
    history: HistoryStatus,
    last_error: Option<String>,
    unsent: Option<String>,
    closed: bool,
}

impl RoomView {
    pub fn new(room: Room, session: Session) -> Self {
        Self {
            room,
            session,
            reconciler: MessageReconciler::new(),
            channel_state: ChannelState::Disconnected,
            history: HistoryStatus::Loading,
            last_error: None,
            unsent: None,
            closed: false,
        }
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.reconciler.messages()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel_state
    }

    pub fn history(&self) -> &HistoryStatus {
        &self.history
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Text of the last optimistic send the network refused, handed back once.
    pub fn take_unsent(&mut self) -> Option<String> {
        self.unsent.take()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.channel_state = ChannelState::Disconnected;
    }

    /// Applies a network event. Returns `false` when the event was ignored
    /// because it belongs to another room or the view is closed.
    pub fn apply(&mut self, event: ChatEvent) -> bool {
        if self.closed || event.room_uuid() != Some(self.room.uuid.as_str()) {
            return false;
        }

        match event {
            ChatEvent::HistoryLoaded { messages, .. } => {
                let added = self.reconciler.load_history(messages);
                log::debug!("Loaded {added} history messages into {}", self.room.uuid);
                self.history = HistoryStatus::Loaded;
            }
            ChatEvent::HistoryFailed { reason, .. } => {
                self.history = HistoryStatus::Failed(reason);
            }
            ChatEvent::GapFilled { messages, .. } => {
                let added = self.reconciler.merge_gap(messages);
                if added > 0 {
                    log::info!("Recovered {added} missed messages in {}", self.room.uuid);
                }
            }
            ChatEvent::MessageReceived { message, .. } => {
                if self.reconciler.push_live(message) == Reconciled::Confirmed {
                    log::debug!("Optimistic message confirmed in {}", self.room.uuid);
                }
            }
            ChatEvent::ChannelStateChanged { state, .. } => {
                self.channel_state = state;
            }
            ChatEvent::SendRejected {
                client_id, reason, ..
            } => {
                if let Some(discarded) = self.reconciler.discard_pending(client_id) {
                    self.unsent = Some(discarded.body);
                }
                self.last_error = Some(format!("Message not sent: {reason}"));
            }
            ChatEvent::RoomsLoaded(_) | ChatEvent::RoomsFailed(_) => return false,
        }
        true
    }

    /// Renders `text` optimistically and returns the payload to send.
    ///
    /// Blank input yields `Ok(None)`. Sending is only allowed while the live
    /// channel is connected.
    pub fn compose(&mut self, text: &str) -> Result<Option<OutboundMessage>, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        if self.channel_state != ChannelState::Connected {
            let err = ChannelError::SendRejected(self.channel_state.to_string());
            self.last_error = Some(err.to_string());
            return Err(err);
        }

        let client_id = Uuid::new_v4();
        self.reconciler
            .push_optimistic(ChatMessage::optimistic(&self.session, text, client_id));
        self.last_error = None;

        Ok(Some(OutboundMessage {
            chat_room_uuid: self.room.uuid.clone(),
            username: self.session.username.clone(),
            nickname: self.session.nickname.clone(),
            message: text.to_string(),
            client_id,
        }))
    }
}

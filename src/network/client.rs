use std::time::Duration;

use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::{
    ChatCommand, ChatEvent, ChatMessage, MessageOrigin, OutboundMessage, Room, Session, WireMessage,
};
use crate::config::AppConfig;
use crate::error::{ChannelError, ConfigError, FetchError};

use super::backoff::Backoff;
use super::channel::LiveChannel;
use super::history::HistoryFetcher;
use super::supervisor::{ChannelSupervisor, Reconnected};

const INBOUND_BUFFER: usize = 100;

/// Everything the network task needs besides its channels.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub session: Session,
    pub channel_endpoint: Url,
    pub page_size: u32,
    pub handshake_timeout: Duration,
    pub reconnect: Backoff,
}

impl ClientSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            session: config.session()?,
            channel_endpoint: config.channel_endpoint()?,
            page_size: config.page_size,
            handshake_timeout: config.handshake_timeout(),
            reconnect: config.reconnect.backoff(),
        })
    }
}

struct ActiveRoom {
    room: Room,
    channel: LiveChannel,
    tasks: Vec<JoinHandle<()>>,
}

impl ActiveRoom {
    /// Closes the channel synchronously and drops whatever is still in flight
    /// for this room, including a history fetch that has not resolved yet.
    fn leave(self) {
        self.channel.close();
        for task in self.tasks {
            task.abort();
        }
        log::info!("Left room {}", self.room.uuid);
    }
}

/// Tầng mạng: nhận lệnh từ UI, gọi REST và giữ kênh realtime cho phòng đang mở.
pub struct ChatClient {
    event_sender: mpsc::Sender<ChatEvent>,
    command_receiver: mpsc::Receiver<ChatCommand>,
    fetcher: HistoryFetcher,
    settings: ClientSettings,
    active: Option<ActiveRoom>,
}

impl ChatClient {
    pub fn new(
        event_sender: mpsc::Sender<ChatEvent>,
        command_receiver: mpsc::Receiver<ChatCommand>,
        fetcher: HistoryFetcher,
        settings: ClientSettings,
    ) -> Self {
        Self {
            event_sender,
            command_receiver,
            fetcher,
            settings,
            active: None,
        }
    }

    pub async fn run(mut self) {
        log::info!(
            "Chat client started as {} (channel endpoint {})",
            self.settings.session.username,
            self.settings.channel_endpoint
        );

        while let Some(command) = self.command_receiver.recv().await {
            self.handle_command(command).await;
        }

        if let Some(active) = self.active.take() {
            active.leave();
        }
        log::info!("Chat client stopped");
    }

    async fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::RefreshRooms => self.refresh_rooms(),
            ChatCommand::EnterRoom(room) => self.enter_room(room),
            ChatCommand::LeaveRoom => {
                if let Some(active) = self.active.take() {
                    active.leave();
                }
            }
            ChatCommand::SendMessage(message) => self.send_message(message).await,
        }
    }

    fn refresh_rooms(&self) {
        let fetcher = self.fetcher.clone();
        let events = self.event_sender.clone();
        tokio::spawn(async move {
            let event = match fetcher.fetch_rooms().await {
                Ok(rooms) => ChatEvent::RoomsLoaded(rooms),
                Err(err) => ChatEvent::RoomsFailed(err.to_string()),
            };
            emit(&events, event).await;
        });
    }

    fn enter_room(&mut self, room: Room) {
        if let Some(active) = self.active.take() {
            active.leave();
        }

        log::info!("Entering room {} ({})", room.label(), room.uuid);
        let channel = LiveChannel::new(
            &self.settings.channel_endpoint,
            room.uuid.clone(),
            self.settings.handshake_timeout,
        );

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        channel.on_message(inbound_tx);
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            self.spawn_history(&room.uuid),
            self.spawn_state_watch(&channel),
            self.spawn_inbound(&room.uuid, inbound_rx),
            self.spawn_gap_fill(&room.uuid, reconnect_rx),
            ChannelSupervisor::new(channel.clone(), self.settings.reconnect)
                .on_reconnect(reconnect_tx)
                .spawn(),
        ];

        self.active = Some(ActiveRoom {
            room,
            channel,
            tasks,
        });
    }

    async fn send_message(&self, message: OutboundMessage) {
        let result = match &self.active {
            Some(active) if active.room.uuid == message.chat_room_uuid => {
                active.channel.send(&message)
            }
            _ => Err(ChannelError::Closed),
        };

        if let Err(err) = result {
            log::warn!(
                "Message to room {} not sent: {err}",
                message.chat_room_uuid
            );
            emit(
                &self.event_sender,
                ChatEvent::SendRejected {
                    room_uuid: message.chat_room_uuid,
                    client_id: message.client_id,
                    reason: err.to_string(),
                },
            )
            .await;
        }
    }

    fn spawn_history(&self, room_uuid: &str) -> JoinHandle<()> {
        let fetcher = self.fetcher.clone();
        let events = self.event_sender.clone();
        let session = self.settings.session.clone();
        let page_size = self.settings.page_size;
        let room_uuid = room_uuid.to_string();

        tokio::spawn(async move {
            let result = fetcher.fetch(&room_uuid, 0, page_size, &session).await;
            let event = match result {
                Ok(messages) => ChatEvent::HistoryLoaded {
                    room_uuid,
                    messages,
                },
                Err(err) => ChatEvent::HistoryFailed {
                    room_uuid,
                    reason: describe_fetch_error(&err),
                },
            };
            emit(&events, event).await;
        })
    }

    fn spawn_state_watch(&self, channel: &LiveChannel) -> JoinHandle<()> {
        let events = self.event_sender.clone();
        let room_uuid = channel.room_uuid().to_string();
        let mut state_rx = channel.subscribe();

        tokio::spawn(async move {
            loop {
                let state = *state_rx.borrow_and_update();
                emit(
                    &events,
                    ChatEvent::ChannelStateChanged {
                        room_uuid: room_uuid.clone(),
                        state,
                    },
                )
                .await;
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn spawn_inbound(
        &self,
        room_uuid: &str,
        mut inbound: mpsc::Receiver<WireMessage>,
    ) -> JoinHandle<()> {
        let events = self.event_sender.clone();
        let session = self.settings.session.clone();
        let room_uuid = room_uuid.to_string();

        tokio::spawn(async move {
            while let Some(wire) = inbound.recv().await {
                log::debug!("Live message for room {room_uuid} from {}", wire.username);
                let message = ChatMessage::from_wire(wire, MessageOrigin::Live, &session);
                emit(
                    &events,
                    ChatEvent::MessageReceived {
                        room_uuid: room_uuid.clone(),
                        message,
                    },
                )
                .await;
            }
        })
    }

    /// After every reconnect the first page is fetched again; the reconciler
    /// keeps only the messages it has not seen.
    fn spawn_gap_fill(
        &self,
        room_uuid: &str,
        mut reconnected: mpsc::UnboundedReceiver<Reconnected>,
    ) -> JoinHandle<()> {
        let fetcher = self.fetcher.clone();
        let events = self.event_sender.clone();
        let session = self.settings.session.clone();
        let page_size = self.settings.page_size;
        let room_uuid = room_uuid.to_string();

        tokio::spawn(async move {
            while let Some(notice) = reconnected.recv().await {
                log::info!(
                    "Refetching history for room {room_uuid} after reconnect ({} failed attempts)",
                    notice.attempts
                );
                match fetcher.fetch(&room_uuid, 0, page_size, &session).await {
                    Ok(messages) => {
                        emit(
                            &events,
                            ChatEvent::GapFilled {
                                room_uuid: room_uuid.clone(),
                                messages,
                            },
                        )
                        .await;
                    }
                    Err(err) => log::warn!("Gap-fill for room {room_uuid} failed: {err}"),
                }
            }
        })
    }
}

async fn emit(events: &mpsc::Sender<ChatEvent>, event: ChatEvent) {
    if let Err(err) = events.send(event).await {
        log::warn!("Failed to notify UI: {err}");
    }
}

fn describe_fetch_error(err: &FetchError) -> String {
    match err {
        FetchError::Server { status } => format!("server error ({status})"),
        other => other.to_string(),
    }
}
